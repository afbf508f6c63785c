//! Operator-imported custom rules (`.pumuki/custom-rules.json`).
//!
//! Rules are mined from `SKILL.md`-style documents the operator points at, or
//! that the repository's profile documents reference, and persisted so later
//! runs can fold them in as the highest-priority lock layer.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{rehash_bundle, write_atomic, Lock, LockBundle};
use crate::config::{CUSTOM_RULES_FILE, CUSTOM_RULES_FILE_CANDIDATES, PROFILE_FILES};
use crate::error::{SchemaError, SkillsError, SkillsResult};
use crate::extract::{extract_rules, MarkdownSource};
use crate::model::{
    sort_rules, CompiledRule, Confidence, EvaluationMode, Origin, Platform, Severity, Stage,
};
use crate::schema::{require_non_empty, require_version, SCHEMA_VERSION};

/// Bundle that carries imported rules in the effective lock.
pub const CUSTOM_BUNDLE_NAME: &str = "custom-guidelines";
pub const CUSTOM_BUNDLE_VERSION: &str = "1.0.0";

static SKILL_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(/[^\s`'"]*SKILL\.md|(?:\.{1,2}/)?[A-Za-z0-9_./-]*SKILL\.md)"#)
        .expect("static regex")
});

/// One persisted custom rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_mode: Option<EvaluationMode>,
}

impl From<&CompiledRule> for CustomRule {
    fn from(rule: &CompiledRule) -> Self {
        Self {
            id: rule.id.clone(),
            description: rule.description.clone(),
            severity: rule.severity,
            platform: rule.platform,
            stage: rule.stage,
            confidence: rule.confidence,
            locked: Some(rule.locked.unwrap_or(false)),
            evaluation_mode: Some(rule.evaluation_mode()),
        }
    }
}

impl CustomRule {
    fn into_compiled(self) -> CompiledRule {
        CompiledRule {
            id: self.id,
            description: self.description,
            severity: self.severity,
            platform: self.platform,
            source_bundle_name: CUSTOM_BUNDLE_NAME.to_string(),
            source_path: CUSTOM_RULES_FILE.to_string(),
            stage: self.stage,
            confidence: self.confidence,
            locked: self.locked,
            evaluation_mode: Some(self.evaluation_mode.unwrap_or_default()),
            origin: Origin::Custom,
        }
    }
}

/// The custom rules document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRulesFile {
    pub version: String,
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,
    pub source_files: Vec<String>,
    pub rules: Vec<CustomRule>,
}

impl CustomRulesFile {
    pub fn validate(&self) -> Result<(), SchemaError> {
        require_version(&self.version)?;
        for file in &self.source_files {
            require_non_empty("source_files[]", file)?;
        }
        for rule in &self.rules {
            require_non_empty("rules[].id", &rule.id)?;
            require_non_empty("rules[].description", &rule.description)?;
        }
        Ok(())
    }

    /// Synthesize the single-bundle lock layer for these rules.
    ///
    /// `None` when there are no rules.
    pub fn to_lock(&self) -> SkillsResult<Option<Lock>> {
        if self.rules.is_empty() {
            return Ok(None);
        }
        let mut bundle = LockBundle {
            name: CUSTOM_BUNDLE_NAME.to_string(),
            version: CUSTOM_BUNDLE_VERSION.to_string(),
            provenance: format!("file:{}", CUSTOM_RULES_FILE),
            content_hash: String::new(),
            rules: self.rules.iter().cloned().map(CustomRule::into_compiled).collect(),
        };
        rehash_bundle(&mut bundle)?;
        Ok(Some(Lock::new(self.generated_at, vec![bundle])))
    }
}

/// Outcome of [`import_custom_rules`].
#[derive(Debug, Clone)]
pub struct ImportedRules {
    /// Absolute paths of the documents that were read.
    pub source_files: Vec<PathBuf>,
    /// Imported rules, sorted by id.
    pub rules: Vec<CompiledRule>,
    pub output_path: PathBuf,
}

/// Lexically normalize: drop `.` components and fold `..`.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn resolve_in_repo(repo_root: &Path, raw: &Path) -> PathBuf {
    if raw.is_absolute() {
        normalize_path(raw)
    } else {
        normalize_path(&repo_root.join(raw))
    }
}

/// Display path relative to the repository, `/`-separated, or the absolute
/// path when the file lives outside it.
fn repo_relative(repo_root: &Path, path: &Path) -> String {
    let root = normalize_path(repo_root);
    let shown = path.strip_prefix(&root).unwrap_or(path);
    shown
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
        .replace("//", "/")
}

/// Bundle name for an imported document: its parent directory, else its stem.
fn bundle_name_for(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "custom".to_string())
}

/// Documents to import.
///
/// Explicit paths (relative to `repo_root` unless absolute) are used when
/// given; otherwise `SKILL.md` references are scraped from the profile
/// documents. Only existing files are returned, deduplicated and sorted.
pub fn resolve_import_sources(repo_root: &Path, explicit: &[PathBuf]) -> Vec<PathBuf> {
    let mut resolved = BTreeSet::new();
    let mut push_if_exists = |raw: &Path| {
        let path = resolve_in_repo(repo_root, raw);
        if path.is_file() {
            resolved.insert(path);
        } else {
            debug!(path = %path.display(), "skipping missing import source");
        }
    };

    if !explicit.is_empty() {
        for raw in explicit {
            push_if_exists(raw);
        }
        return resolved.into_iter().collect();
    }

    for profile in PROFILE_FILES {
        let Ok(content) = std::fs::read_to_string(repo_root.join(profile)) else {
            continue;
        };
        for reference in SKILL_REFERENCE.find_iter(&content) {
            push_if_exists(Path::new(reference.as_str()));
        }
    }
    resolved.into_iter().collect()
}

/// Import rules from `explicit` (or discovered) documents and write
/// `.pumuki/custom-rules.json`.
///
/// Ids claimed by an earlier document are avoided by later ones, so every
/// imported rule keeps a distinct identity.
pub fn import_custom_rules(repo_root: &Path, explicit: &[PathBuf]) -> SkillsResult<ImportedRules> {
    let source_files = resolve_import_sources(repo_root, explicit);

    let mut used_ids: BTreeSet<String> = BTreeSet::new();
    let mut rules: Vec<CompiledRule> = Vec::new();
    for file in &source_files {
        let content =
            std::fs::read_to_string(file).map_err(|e| SkillsError::io("read", file, e))?;
        let bundle_name = bundle_name_for(file);
        let source_path = repo_relative(repo_root, file);

        let extracted = extract_rules(
            &MarkdownSource {
                bundle_name: &bundle_name,
                source_path: &source_path,
                content: &content,
            },
            &used_ids,
            Origin::Custom,
        );
        debug!(source = %source_path, rules = extracted.len(), "extracted custom rules");
        used_ids.extend(extracted.iter().map(|r| r.id.clone()));
        rules.extend(extracted);
    }
    sort_rules(&mut rules);

    let relative_sources: BTreeSet<String> = source_files
        .iter()
        .map(|f| repo_relative(repo_root, f))
        .collect();
    let payload = CustomRulesFile {
        version: SCHEMA_VERSION.to_string(),
        generated_at: Utc::now(),
        source_files: relative_sources.into_iter().collect(),
        rules: rules.iter().map(CustomRule::from).collect(),
    };

    let output_path = repo_root.join(CUSTOM_RULES_FILE);
    let mut content =
        serde_json::to_string_pretty(&payload).map_err(|e| SkillsError::Serialize {
            what: "custom rules".to_string(),
            message: e.to_string(),
        })?;
    content.push('\n');
    write_atomic(&output_path, &content)?;

    info!(
        path = %output_path.display(),
        sources = source_files.len(),
        rules = rules.len(),
        "imported custom skills rules"
    );
    Ok(ImportedRules {
        source_files,
        rules,
        output_path,
    })
}

/// Load the first custom rules file that exists under `repo_root`.
pub fn load_custom_rules_file(repo_root: &Path) -> Option<CustomRulesFile> {
    let path = CUSTOM_RULES_FILE_CANDIDATES
        .iter()
        .map(|candidate| repo_root.join(candidate))
        .find(|path| path.exists())?;

    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "custom rules file not readable");
            return None;
        }
    };
    let file: CustomRulesFile = match serde_json::from_str(&content) {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring invalid custom rules file");
            return None;
        }
    };
    if let Err(e) = file.validate() {
        warn!(path = %path.display(), error = %e, "custom rules file rejected");
        return None;
    }
    Some(file)
}

/// Custom rules as a lock layer, or `None` when absent, invalid or empty.
pub fn load_custom_lock(repo_root: &Path) -> Option<Lock> {
    let file = load_custom_rules_file(repo_root)?;
    match file.to_lock() {
        Ok(lock) => lock,
        Err(e) => {
            warn!(error = %e, "failed to build custom rules lock");
            None
        }
    }
}
