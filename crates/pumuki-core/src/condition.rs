//! Rule trigger conditions and their evaluation against a [`FactContext`].
//!
//! Leaves test one kind of fact; `All`, `Any` and `Not` combine them.
//! Evaluation is total: a pattern that fails to compile simply never matches.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SkillsError, SkillsResult};
use crate::facts::{ChangeType, Fact, FactContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Condition {
    /// A changed file under `pathPrefix` with the given change type.
    #[serde(rename_all = "camelCase")]
    FileChange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path_prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        change_type: Option<ChangeType>,
    },

    /// A detector finding.
    #[serde(rename_all = "camelCase")]
    Heuristic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rule_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_path_prefix: Option<String>,
    },

    /// A file whose text contains any substring or matches any pattern.
    #[serde(rename_all = "camelCase")]
    FileContent {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        contains: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        regex: Vec<String>,
    },

    /// A dependency edge; either endpoint may be left open.
    #[serde(rename_all = "camelCase")]
    Dependency {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
    },

    All { conditions: Vec<Condition> },

    Any { conditions: Vec<Condition> },

    Not { condition: Box<Condition> },
}

impl Condition {
    pub fn heuristic(rule_id: impl Into<String>, file_path_prefix: Option<String>) -> Self {
        Condition::Heuristic {
            rule_id: Some(rule_id.into()),
            code: None,
            file_path_prefix,
        }
    }

    pub fn path_prefix(prefix: impl Into<String>) -> Self {
        Condition::FileChange {
            path_prefix: Some(prefix.into()),
            change_type: None,
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::All { conditions }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Any { conditions }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Condition::Not {
            condition: Box::new(condition),
        }
    }

    /// A condition that can never hold: an empty `Any`.
    pub fn never() -> Self {
        Condition::Any {
            conditions: Vec::new(),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Condition::Any { conditions } if conditions.is_empty())
    }

    /// Reject conditions that cannot be evaluated meaningfully.
    pub fn validate(&self) -> SkillsResult<()> {
        match self {
            Condition::FileContent { contains, regex } => {
                if contains.iter().any(|s| s.is_empty()) {
                    return Err(SkillsError::InvalidCondition {
                        reason: "FileContent.contains entries must not be empty".to_string(),
                    });
                }
                for pattern in regex {
                    Regex::new(pattern).map_err(|e| SkillsError::InvalidCondition {
                        reason: format!("invalid FileContent.regex \"{}\": {}", pattern, e),
                    })?;
                }
                Ok(())
            }
            Condition::All { conditions } | Condition::Any { conditions } => {
                conditions.iter().try_for_each(Condition::validate)
            }
            Condition::Not { condition } => condition.validate(),
            Condition::FileChange { .. }
            | Condition::Heuristic { .. }
            | Condition::Dependency { .. } => Ok(()),
        }
    }

    /// Whether the condition holds for `context`.
    pub fn evaluate(&self, context: &FactContext) -> bool {
        self.witnesses(context).is_some()
    }

    /// Facts that make the condition hold, or `None` when it does not.
    ///
    /// A satisfied `Not` contributes no witnesses.
    pub fn witnesses<'a>(&self, context: &'a FactContext) -> Option<Vec<&'a Fact>> {
        match self {
            Condition::All { conditions } => {
                let mut found = Vec::new();
                for condition in conditions {
                    found.extend(condition.witnesses(context)?);
                }
                Some(found)
            }
            Condition::Any { conditions } => {
                let mut matched = false;
                let mut found = Vec::new();
                for condition in conditions {
                    if let Some(w) = condition.witnesses(context) {
                        matched = true;
                        found.extend(w);
                    }
                }
                matched.then_some(found)
            }
            Condition::Not { condition } => match condition.witnesses(context) {
                Some(_) => None,
                None => Some(Vec::new()),
            },
            leaf => {
                let found: Vec<&Fact> =
                    context.facts.iter().filter(|f| leaf.leaf_matches(f)).collect();
                (!found.is_empty()).then_some(found)
            }
        }
    }

    fn leaf_matches(&self, fact: &Fact) -> bool {
        match (self, fact) {
            (
                Condition::FileChange {
                    path_prefix,
                    change_type,
                },
                Fact::FileChange {
                    path,
                    change_type: actual,
                    ..
                },
            ) => {
                path_prefix.as_deref().map_or(true, |p| path.starts_with(p))
                    && change_type.map_or(true, |c| c == *actual)
            }
            (
                Condition::Heuristic {
                    rule_id,
                    code,
                    file_path_prefix,
                },
                Fact::Heuristic {
                    rule_id: actual_rule,
                    code: actual_code,
                    file_path,
                    ..
                },
            ) => {
                rule_id.as_deref().map_or(true, |r| r == actual_rule)
                    && code
                        .as_deref()
                        .map_or(true, |c| actual_code.as_deref() == Some(c))
                    && file_path_prefix.as_deref().map_or(true, |p| {
                        file_path.as_deref().is_some_and(|f| f.starts_with(p))
                    })
            }
            (Condition::FileContent { contains, regex }, Fact::FileContent { content, .. }) => {
                contains.iter().any(|needle| content.contains(needle.as_str()))
                    || regex.iter().any(|pattern| {
                        Regex::new(pattern)
                            .map(|re| re.is_match(content))
                            .unwrap_or(false)
                    })
            }
            (Condition::Dependency { from, to }, Fact::Dependency { from: f, to: t, .. }) => {
                from.as_deref().map_or(true, |x| x == f) && to.as_deref().map_or(true, |x| x == t)
            }
            _ => false,
        }
    }
}

/// Evaluate `condition` against `context`.
pub fn evaluate(condition: &Condition, context: &FactContext) -> bool {
    condition.evaluate(context)
}
