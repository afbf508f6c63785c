//! Shared vocabulary for compiled rules.
//!
//! Every artifact (manifest, lock, policy, custom-rules file) speaks in these
//! types. Enum wire names match the persisted JSON exactly.

use serde::{Deserialize, Serialize};

/// Rule severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// True when `self` is at least as severe as `threshold`.
    pub fn is_at_least(&self, threshold: Severity) -> bool {
        *self >= threshold
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Target platform of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Backend,
    Frontend,
    Text,
    Generic,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Ios,
        Platform::Android,
        Platform::Backend,
        Platform::Frontend,
        Platform::Text,
        Platform::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Backend => "backend",
            Platform::Frontend => "frontend",
            Platform::Text => "text",
            Platform::Generic => "generic",
        }
    }

    /// Generic and text rules apply regardless of platform detection.
    pub fn is_specific(&self) -> bool {
        !matches!(self, Platform::Generic | Platform::Text)
    }

    /// Infer the platform from a bundle name by substring match.
    pub fn from_bundle_name(bundle_name: &str) -> Platform {
        let normalized = bundle_name.to_lowercase();
        if normalized.contains("ios") {
            Platform::Ios
        } else if normalized.contains("android") {
            Platform::Android
        } else if normalized.contains("backend") {
            Platform::Backend
        } else if normalized.contains("frontend") {
            Platform::Frontend
        } else {
            Platform::Generic
        }
    }

    /// Source-tree prefixes where a platform's code conventionally lives.
    pub fn source_prefixes(&self) -> &'static [&'static str] {
        match self {
            Platform::Ios => &["apps/ios/", "ios/"],
            Platform::Android => &["apps/android/"],
            Platform::Backend => &["apps/backend/"],
            Platform::Frontend => &["apps/frontend/", "apps/web/"],
            Platform::Text | Platform::Generic => &[],
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| format!("unknown platform '{}'", s.trim()))
    }
}

/// Pipeline checkpoint. Ordering follows the pipeline: commit, push, CI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    PreCommit,
    PrePush,
    Ci,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::PreCommit, Stage::PrePush, Stage::Ci];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PreCommit => "PRE_COMMIT",
            Stage::PrePush => "PRE_PUSH",
            Stage::Ci => "CI",
        }
    }

    /// A rule declared for `rule_stage` applies at that stage and every later one.
    /// No declared stage means every stage.
    pub fn admits(&self, rule_stage: Option<Stage>) -> bool {
        match rule_stage {
            Some(declared) => *self >= declared,
            None => true,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PRE_COMMIT" => Ok(Stage::PreCommit),
            "PRE_PUSH" => Ok(Stage::PrePush),
            "CI" => Ok(Stage::Ci),
            other => Err(format!(
                "unknown stage '{}', expected PRE_COMMIT, PRE_PUSH or CI",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// How a rule is meant to be evaluated at gate time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvaluationMode {
    /// Backed by a deterministic detector when one is bound.
    #[default]
    Auto,
    /// Tracked only; never fires on its own.
    Declarative,
}

/// Which layer authored a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    #[default]
    Core,
    Custom,
}

/// A rule as recorded in the lock.
///
/// Identity is `id`: two rules with the same id describe the same guideline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledRule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    pub platform: Platform,
    pub source_bundle_name: String,
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_mode: Option<EvaluationMode>,
    pub origin: Origin,
}

impl CompiledRule {
    pub fn is_locked(&self) -> bool {
        self.locked.unwrap_or(true)
    }

    pub fn evaluation_mode(&self) -> EvaluationMode {
        self.evaluation_mode.unwrap_or_default()
    }
}

/// Sort rules by id, the canonical order used everywhere a rule list is persisted or hashed.
pub fn sort_rules(rules: &mut [CompiledRule]) {
    rules.sort_by(|a, b| a.id.cmp(&b.id));
}
