//! Operator policy (`skills.policy.json`).
//!
//! ```json
//! {
//!   "schemaVersion": "1.0",
//!   "defaultBundleEnabled": true,
//!   "perStage": {
//!     "PRE_COMMIT": { "blockOnOrAbove": "CRITICAL", "warnOnOrAbove": "WARN" },
//!     "PRE_PUSH":   { "blockOnOrAbove": "ERROR",    "warnOnOrAbove": "WARN" },
//!     "CI":         { "blockOnOrAbove": "ERROR",    "warnOnOrAbove": "WARN" }
//!   },
//!   "perBundle": {
//!     "ios-guidelines": { "enabled": true, "promoteToErrorRuleIds": ["skills.ios.no-task-detached"] }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::POLICY_FILE;
use crate::digest::canonical_digest;
use crate::error::{SchemaError, SkillsResult};
use crate::model::{Severity, Stage};
use crate::schema::{require_non_empty, require_version, SCHEMA_VERSION};

/// Blocking and warning thresholds for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePolicy {
    pub block_on_or_above: Severity,
    pub warn_on_or_above: Severity,
}

/// Thresholds for every stage. All three are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePolicies {
    #[serde(rename = "PRE_COMMIT")]
    pub pre_commit: StagePolicy,
    #[serde(rename = "PRE_PUSH")]
    pub pre_push: StagePolicy,
    #[serde(rename = "CI")]
    pub ci: StagePolicy,
}

impl StagePolicies {
    pub fn for_stage(&self, stage: Stage) -> &StagePolicy {
        match stage {
            Stage::PreCommit => &self.pre_commit,
            Stage::PrePush => &self.pre_push,
            Stage::Ci => &self.ci,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePolicy {
    pub enabled: bool,

    /// Rules raised to at least ERROR at PRE_PUSH and CI.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub promote_to_error_rule_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub schema_version: String,
    pub default_bundle_enabled: bool,
    pub per_stage: StagePolicies,
    #[serde(default)]
    pub per_bundle: BTreeMap<String, BundlePolicy>,
}

impl Default for Policy {
    /// Every bundle enabled; only CRITICAL blocks a commit, ERROR blocks push and CI.
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            default_bundle_enabled: true,
            per_stage: StagePolicies {
                pre_commit: StagePolicy {
                    block_on_or_above: Severity::Critical,
                    warn_on_or_above: Severity::Warn,
                },
                pre_push: StagePolicy {
                    block_on_or_above: Severity::Error,
                    warn_on_or_above: Severity::Warn,
                },
                ci: StagePolicy {
                    block_on_or_above: Severity::Error,
                    warn_on_or_above: Severity::Warn,
                },
            },
            per_bundle: BTreeMap::new(),
        }
    }
}

impl Policy {
    pub fn validate(&self) -> Result<(), SchemaError> {
        require_version(&self.schema_version)?;
        for (name, bundle) in &self.per_bundle {
            require_non_empty("perBundle key", name)?;
            for id in &bundle.promote_to_error_rule_ids {
                require_non_empty("perBundle[].promoteToErrorRuleIds[]", id)?;
            }
        }
        Ok(())
    }

    pub fn bundle(&self, name: &str) -> Option<&BundlePolicy> {
        self.per_bundle.get(name)
    }

    /// Per-bundle setting, else the default.
    pub fn bundle_enabled(&self, name: &str) -> bool {
        self.bundle(name)
            .map(|b| b.enabled)
            .unwrap_or(self.default_bundle_enabled)
    }

    pub fn stage(&self, stage: Stage) -> &StagePolicy {
        self.per_stage.for_stage(stage)
    }

    /// True when `bundle` lists `rule_id` for promotion.
    pub fn promotes(&self, bundle: &str, rule_id: &str) -> bool {
        self.bundle(bundle)
            .map(|b| b.promote_to_error_rule_ids.iter().any(|id| id == rule_id))
            .unwrap_or(false)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedBundlePolicy<'a> {
    name: &'a str,
    enabled: bool,
    promote_to_error_rule_ids: Vec<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedPolicy<'a> {
    schema_version: &'a str,
    default_bundle_enabled: bool,
    per_stage: &'a StagePolicies,
    per_bundle: Vec<HashedBundlePolicy<'a>>,
}

/// Deterministic policy hash; bundle order and promotion list order never matter.
pub fn policy_hash(policy: &Policy) -> SkillsResult<String> {
    let per_bundle = policy
        .per_bundle
        .iter()
        .map(|(name, bundle)| {
            let mut ids: Vec<&str> = bundle
                .promote_to_error_rule_ids
                .iter()
                .map(String::as_str)
                .collect();
            ids.sort_unstable();
            HashedBundlePolicy {
                name,
                enabled: bundle.enabled,
                promote_to_error_rule_ids: ids,
            }
        })
        .collect();

    canonical_digest(
        "skills policy",
        &HashedPolicy {
            schema_version: &policy.schema_version,
            default_bundle_enabled: policy.default_bundle_enabled,
            per_stage: &policy.per_stage,
            per_bundle,
        },
    )
}

/// Parse and validate a policy document. Any structural problem yields `None`.
pub fn parse_policy(value: &serde_json::Value) -> Option<Policy> {
    let policy: Policy = match serde_json::from_value(value.clone()) {
        Ok(policy) => policy,
        Err(e) => {
            debug!(error = %e, "skills policy does not match the policy schema");
            return None;
        }
    };
    if let Err(e) = policy.validate() {
        warn!(error = %e, "skills policy rejected");
        return None;
    }
    Some(policy)
}

/// Load `skills.policy.json` from `repo_root`.
pub fn load_policy(repo_root: &Path) -> Option<Policy> {
    let path = repo_root.join(POLICY_FILE);
    let content = std::fs::read_to_string(&path).ok()?;
    let policy = serde_json::from_str::<serde_json::Value>(&content)
        .ok()
        .and_then(|value| parse_policy(&value));
    if policy.is_none() {
        warn!(path = %path.display(), "ignoring invalid skills policy");
    }
    policy
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> serde_json::Value {
        json!({
            "schemaVersion": "1.0",
            "defaultBundleEnabled": false,
            "perStage": {
                "PRE_COMMIT": { "blockOnOrAbove": "CRITICAL", "warnOnOrAbove": "ERROR" },
                "PRE_PUSH": { "blockOnOrAbove": "ERROR", "warnOnOrAbove": "WARN" },
                "CI": { "blockOnOrAbove": "ERROR", "warnOnOrAbove": "INFO" }
            },
            "perBundle": {
                "ios-guidelines": {
                    "enabled": true,
                    "promoteToErrorRuleIds": ["skills.ios.b", "skills.ios.a"]
                },
                "android-guidelines": { "enabled": false }
            }
        })
    }

    #[test]
    fn test_parse_and_query() {
        let policy = parse_policy(&sample()).unwrap();
        assert!(policy.bundle_enabled("ios-guidelines"));
        assert!(!policy.bundle_enabled("android-guidelines"));
        assert!(!policy.bundle_enabled("backend-guidelines"));
        assert!(policy.promotes("ios-guidelines", "skills.ios.a"));
        assert!(!policy.promotes("android-guidelines", "skills.ios.a"));
        assert_eq!(policy.stage(Stage::Ci).warn_on_or_above, Severity::Info);
    }

    #[test]
    fn test_rejects_missing_stage_and_bad_values() {
        let mut missing = sample();
        missing["perStage"].as_object_mut().unwrap().remove("CI");
        assert!(parse_policy(&missing).is_none());

        let mut bad_severity = sample();
        bad_severity["perStage"]["CI"]["blockOnOrAbove"] = json!("HIGH");
        assert!(parse_policy(&bad_severity).is_none());

        let mut bad_enabled = sample();
        bad_enabled["perBundle"]["android-guidelines"]["enabled"] = json!("no");
        assert!(parse_policy(&bad_enabled).is_none());

        let mut bad_version = sample();
        bad_version["schemaVersion"] = json!("0.9");
        assert!(parse_policy(&bad_version).is_none());
    }

    #[test]
    fn test_policy_hash_is_order_independent() {
        let a = parse_policy(&sample()).unwrap();
        let mut b = a.clone();
        b.per_bundle
            .get_mut("ios-guidelines")
            .unwrap()
            .promote_to_error_rule_ids
            .reverse();
        assert_eq!(policy_hash(&a).unwrap(), policy_hash(&b).unwrap());

        b.default_bundle_enabled = true;
        assert_ne!(policy_hash(&a).unwrap(), policy_hash(&b).unwrap());
    }

    #[test]
    fn test_load_policy() {
        let dir = TempDir::new().unwrap();
        assert!(load_policy(dir.path()).is_none());

        std::fs::write(dir.path().join(POLICY_FILE), sample().to_string()).unwrap();
        assert!(load_policy(dir.path()).is_some());

        std::fs::write(dir.path().join(POLICY_FILE), "[]").unwrap();
        assert!(load_policy(dir.path()).is_none());
    }

    #[test]
    fn test_default_policy_is_valid() {
        let policy = Policy::default();
        policy.validate().unwrap();
        assert!(policy.bundle_enabled("anything"));
        assert_eq!(policy.stage(Stage::PreCommit).block_on_or_above, Severity::Critical);
    }
}
