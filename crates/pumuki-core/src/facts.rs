//! Facts supplied by external collaborators (VCS layer, detectors, file readers).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SkillsError, SkillsResult};
use crate::model::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// Which kind of fact satisfied a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FactKind {
    FileChange,
    Heuristic,
    FileContent,
    Dependency,
}

/// One observation about the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Fact {
    /// A changed file.
    #[serde(rename_all = "camelCase")]
    FileChange {
        path: String,
        change_type: ChangeType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    /// A detector finding.
    #[serde(rename_all = "camelCase")]
    Heuristic {
        rule_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        severity: Option<Severity>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    /// Text of an inspected file.
    #[serde(rename_all = "camelCase")]
    FileContent {
        path: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    /// A dependency edge between two modules.
    #[serde(rename_all = "camelCase")]
    Dependency {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
}

impl Fact {
    pub fn kind(&self) -> FactKind {
        match self {
            Fact::FileChange { .. } => FactKind::FileChange,
            Fact::Heuristic { .. } => FactKind::Heuristic,
            Fact::FileContent { .. } => FactKind::FileContent,
            Fact::Dependency { .. } => FactKind::Dependency,
        }
    }

    /// File the fact is about. Dependency edges report their origin.
    pub fn path(&self) -> Option<&str> {
        match self {
            Fact::FileChange { path, .. } | Fact::FileContent { path, .. } => Some(path.as_str()),
            Fact::Heuristic { file_path, .. } => file_path.as_deref(),
            Fact::Dependency { from, .. } => Some(from.as_str()),
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Fact::FileChange { source, .. }
            | Fact::Heuristic { source, .. }
            | Fact::FileContent { source, .. }
            | Fact::Dependency { source, .. } => source.as_deref(),
        }
    }
}

/// Everything a condition can be evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactContext {
    #[serde(default)]
    pub facts: Vec<Fact>,
}

impl FactContext {
    pub fn new(facts: Vec<Fact>) -> Self {
        Self { facts }
    }

    pub fn with_changed_file(mut self, path: impl Into<String>, change_type: ChangeType) -> Self {
        self.facts.push(Fact::FileChange {
            path: path.into(),
            change_type,
            source: None,
        });
        self
    }

    pub fn with_heuristic(mut self, rule_id: impl Into<String>, file_path: impl Into<String>) -> Self {
        self.facts.push(Fact::Heuristic {
            rule_id: rule_id.into(),
            code: None,
            severity: None,
            message: None,
            file_path: Some(file_path.into()),
            line: None,
            source: None,
        });
        self
    }

    pub fn with_file_content(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.facts.push(Fact::FileContent {
            path: path.into(),
            content: content.into(),
            source: None,
        });
        self
    }

    pub fn with_dependency(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.facts.push(Fact::Dependency {
            from: from.into(),
            to: to.into(),
            source: None,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn has_heuristic_facts(&self) -> bool {
        self.facts.iter().any(|f| f.kind() == FactKind::Heuristic)
    }

    /// Context restricted to the facts `keep` accepts.
    pub fn filtered(&self, keep: impl Fn(&Fact) -> bool) -> FactContext {
        FactContext {
            facts: self.facts.iter().filter(|f| keep(f)).cloned().collect(),
        }
    }
}

/// Read a fact context from a JSON file: either `{"facts": [...]}` or a bare array.
pub fn load_facts(path: &Path) -> SkillsResult<FactContext> {
    let content =
        std::fs::read_to_string(path).map_err(|e| SkillsError::io("read", path, e))?;
    let parse_error = |e: serde_json::Error| SkillsError::Parse {
        what: format!("fact context {}", path.display()),
        message: e.to_string(),
    };
    let value: serde_json::Value = serde_json::from_str(&content).map_err(parse_error)?;
    if value.is_array() {
        let facts: Vec<Fact> = serde_json::from_value(value).map_err(parse_error)?;
        Ok(FactContext::new(facts))
    } else {
        serde_json::from_value(value).map_err(parse_error)
    }
}
