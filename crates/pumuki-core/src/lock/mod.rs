//! The compiled skills lock (`skills.lock.json`).
//!
//! # Lock Format
//!
//! ```json
//! {
//!   "schemaVersion": "1.0",
//!   "compilerVersion": "1.0.0",
//!   "generatedAt": "2026-01-29T10:00:00Z",
//!   "bundles": [
//!     {
//!       "name": "ios-guidelines",
//!       "version": "1.0.0",
//!       "provenance": "file:docs/ios.md",
//!       "contentHash": "3f1c...",
//!       "rules": [ { "id": "skills.ios.no-anyview", ... } ]
//!     }
//!   ]
//! }
//! ```
//!
//! `contentHash` and the whole-lock hash are canonical digests and never depend
//! on `generatedAt` or on the order of bundles or rules.

mod builtin;
mod compile;
mod custom;
mod merge;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LOCK_FILE;
use crate::digest::{canonical_digest, is_sha256_hex};
use crate::error::{SchemaError, SkillsError, SkillsResult};
use crate::model::{CompiledRule, Confidence, EvaluationMode, Origin, Platform, Severity, Stage};
use crate::schema::{require_non_empty, require_semver, require_version, SCHEMA_VERSION};

pub use self::builtin::{
    builtin_sources, core_lock, load_effective_lock, reset_core_lock_cache_for_tests,
    CoreLockCache,
};
pub use self::compile::{
    check_lock_status, compile_lock, compile_lock_from, CompileOptions, LockCheck, LockStatus,
};
pub use self::custom::{
    import_custom_rules, load_custom_lock, load_custom_rules_file, resolve_import_sources,
    CustomRulesFile, ImportedRules, CUSTOM_BUNDLE_NAME, CUSTOM_BUNDLE_VERSION,
};
pub use self::merge::{merge_locks, rehash_bundle};

/// A compiled skills lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    /// Schema version, always `1.0`.
    pub schema_version: String,

    /// Version of the compiler that produced the lock.
    pub compiler_version: String,

    /// When the lock was generated. Excluded from every hash.
    pub generated_at: DateTime<Utc>,

    /// Compiled bundles, sorted by (name, version).
    pub bundles: Vec<LockBundle>,
}

/// One compiled bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockBundle {
    pub name: String,
    pub version: String,

    /// Where the bundle came from (`file:<path>` by default).
    pub provenance: String,

    /// SHA-256 hex over the bundle identity and its sorted rules.
    pub content_hash: String,

    /// Rules sorted by id.
    pub rules: Vec<CompiledRule>,
}

impl LockBundle {
    pub fn validate(&self) -> Result<(), SchemaError> {
        require_non_empty("bundles[].name", &self.name)?;
        require_semver("bundles[].version", &self.version)?;
        require_non_empty("bundles[].provenance", &self.provenance)?;
        if !is_sha256_hex(&self.content_hash) {
            return Err(SchemaError::InvalidHash {
                bundle: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            require_non_empty("rules[].id", &rule.id)?;
            require_non_empty("rules[].description", &rule.description)?;
            require_non_empty("rules[].sourceBundleName", &rule.source_bundle_name)?;
            require_non_empty("rules[].sourcePath", &rule.source_path)?;
            if !seen.insert(rule.id.as_str()) {
                return Err(SchemaError::DuplicateRuleId {
                    bundle: self.name.clone(),
                    rule_id: rule.id.clone(),
                });
            }
        }
        Ok(())
    }
}

impl Lock {
    /// Build a lock stamped with this compiler's version.
    pub fn new(generated_at: DateTime<Utc>, bundles: Vec<LockBundle>) -> Self {
        let mut lock = Self {
            schema_version: SCHEMA_VERSION.to_string(),
            compiler_version: crate::templates::COMPILER_VERSION.to_string(),
            generated_at,
            bundles,
        };
        lock.sort_bundles();
        lock
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        require_version(&self.schema_version)?;
        require_semver("compilerVersion", &self.compiler_version)?;
        for bundle in &self.bundles {
            bundle.validate()?;
        }
        Ok(())
    }

    /// Sort bundles by (name, version).
    pub fn sort_bundles(&mut self) {
        self.bundles
            .sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
    }

    /// Canonical hash of the whole lock. See [`lock_hash`].
    pub fn deterministic_hash(&self) -> SkillsResult<String> {
        lock_hash(self)
    }

    pub fn rule_count(&self) -> usize {
        self.bundles.iter().map(|b| b.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn find_rule(&self, rule_id: &str) -> Option<&CompiledRule> {
        self.bundles
            .iter()
            .flat_map(|b| b.rules.iter())
            .find(|r| r.id == rule_id)
    }

    /// Pretty JSON, newline-terminated.
    pub fn to_json(&self) -> SkillsResult<String> {
        let mut content =
            serde_json::to_string_pretty(self).map_err(|e| SkillsError::Serialize {
                what: "skills lock".to_string(),
                message: e.to_string(),
            })?;
        content.push('\n');
        Ok(content)
    }
}

/// A rule as it participates in hashes: every optional field present, absent
/// values as `null`, `locked` defaulting to `false`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HashedRule<'a> {
    id: &'a str,
    description: &'a str,
    severity: Severity,
    platform: Platform,
    source_bundle_name: &'a str,
    source_path: &'a str,
    stage: Option<Stage>,
    confidence: Option<Confidence>,
    locked: bool,
    evaluation_mode: Option<EvaluationMode>,
    origin: Origin,
}

impl<'a> From<&'a CompiledRule> for HashedRule<'a> {
    fn from(rule: &'a CompiledRule) -> Self {
        Self {
            id: &rule.id,
            description: &rule.description,
            severity: rule.severity,
            platform: rule.platform,
            source_bundle_name: &rule.source_bundle_name,
            source_path: &rule.source_path,
            stage: rule.stage,
            confidence: rule.confidence,
            locked: rule.locked.unwrap_or(false),
            evaluation_mode: rule.evaluation_mode,
            origin: rule.origin,
        }
    }
}

/// Project rules into their hashed form, sorted by id.
pub(crate) fn hashed_rules(rules: &[CompiledRule]) -> Vec<HashedRule<'_>> {
    let mut sorted: Vec<&CompiledRule> = rules.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted.into_iter().map(HashedRule::from).collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedBundle<'a> {
    name: &'a str,
    version: &'a str,
    provenance: &'a str,
    content_hash: &'a str,
    rules: Vec<HashedRule<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashedLock<'a> {
    schema_version: &'a str,
    compiler_version: &'a str,
    bundles: Vec<HashedBundle<'a>>,
}

/// Deterministic hash of a lock.
///
/// Covers schema and compiler versions plus every bundle (sorted by name then
/// version) with its rules sorted by id. `generatedAt` is excluded, so two
/// locks with the same content hash equal regardless of when or in what order
/// they were assembled.
pub fn lock_hash(lock: &Lock) -> SkillsResult<String> {
    let mut bundles: Vec<&LockBundle> = lock.bundles.iter().collect();
    bundles.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));

    let normalized = HashedLock {
        schema_version: &lock.schema_version,
        compiler_version: &lock.compiler_version,
        bundles: bundles
            .into_iter()
            .map(|bundle| HashedBundle {
                name: &bundle.name,
                version: &bundle.version,
                provenance: &bundle.provenance,
                content_hash: &bundle.content_hash,
                rules: hashed_rules(&bundle.rules),
            })
            .collect(),
    };
    canonical_digest("skills lock", &normalized)
}

/// Parse and validate a lock document. Any structural problem yields `None`.
pub fn parse_lock(value: &serde_json::Value) -> Option<Lock> {
    let lock: Lock = match serde_json::from_value(value.clone()) {
        Ok(lock) => lock,
        Err(e) => {
            debug!(error = %e, "skills lock does not match the lock schema");
            return None;
        }
    };
    if let Err(e) = lock.validate() {
        warn!(error = %e, "skills lock rejected");
        return None;
    }
    Some(lock)
}

/// Parse a lock from JSON text.
pub fn parse_lock_str(content: &str) -> Option<Lock> {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => parse_lock(&value),
        Err(e) => {
            debug!(error = %e, "skills lock is not valid JSON");
            None
        }
    }
}

/// Load `skills.lock.json` from `repo_root`.
pub fn load_lock(repo_root: &Path) -> Option<Lock> {
    load_lock_file(&repo_root.join(LOCK_FILE))
}

/// Load a lock from an explicit path.
pub fn load_lock_file(path: &Path) -> Option<Lock> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skills lock not readable");
            return None;
        }
    };
    let lock = parse_lock_str(&content);
    if lock.is_none() {
        warn!(path = %path.display(), "ignoring invalid skills lock");
    }
    lock
}

/// Write `lock` to `path` as pretty JSON with a trailing newline.
///
/// Content goes to a sibling temporary file first and is then renamed into
/// place, so readers never observe a partial lock.
pub fn write_lock(lock: &Lock, path: &Path) -> SkillsResult<PathBuf> {
    let content = lock.to_json()?;
    write_atomic(path, &content)?;
    info!(
        path = %path.display(),
        bundles = lock.bundles.len(),
        rules = lock.rule_count(),
        "wrote skills lock"
    );
    Ok(path.to_path_buf())
}

pub(crate) fn write_atomic(path: &Path, content: &str) -> SkillsResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| SkillsError::io("create directory", parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, content).map_err(|e| SkillsError::io("write", &tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| SkillsError::io("rename", path, e))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    pub(crate) fn rule(id: &str, severity: Severity) -> CompiledRule {
        CompiledRule {
            id: id.to_string(),
            description: format!("Rule {}", id),
            severity,
            platform: Platform::Ios,
            source_bundle_name: "ios-guidelines".to_string(),
            source_path: "docs/ios.md".to_string(),
            stage: None,
            confidence: Some(Confidence::High),
            locked: Some(true),
            evaluation_mode: Some(EvaluationMode::Auto),
            origin: Origin::Core,
        }
    }

    pub(crate) fn bundle(name: &str, rules: Vec<CompiledRule>) -> LockBundle {
        LockBundle {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            provenance: format!("file:docs/{}.md", name),
            content_hash: "a".repeat(64),
            rules,
        }
    }

    pub(crate) fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 29, 10, 0, 0).unwrap()
    }

    fn sample_lock() -> Lock {
        Lock::new(
            fixed_time(),
            vec![
                bundle(
                    "ios-guidelines",
                    vec![
                        rule("skills.ios.no-force-unwrap", Severity::Error),
                        rule("skills.ios.no-anyview", Severity::Warn),
                    ],
                ),
                bundle("android-guidelines", vec![rule("skills.android.no-runblocking", Severity::Warn)]),
            ],
        )
    }

    #[test]
    fn test_new_sorts_bundles() {
        let lock = sample_lock();
        let names: Vec<_> = lock.bundles.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["android-guidelines", "ios-guidelines"]);
        assert_eq!(lock.rule_count(), 3);
        assert!(lock.find_rule("skills.ios.no-anyview").is_some());
    }

    #[test]
    fn test_hash_ignores_order_and_timestamp() {
        let lock = sample_lock();
        let mut permuted = lock.clone();
        permuted.bundles.reverse();
        for bundle in &mut permuted.bundles {
            bundle.rules.reverse();
        }
        permuted.generated_at = Utc::now();
        assert_eq!(lock_hash(&lock).unwrap(), lock_hash(&permuted).unwrap());
    }

    #[test]
    fn test_hash_changes_with_severity_and_compiler() {
        let lock = sample_lock();
        let base = lock_hash(&lock).unwrap();

        let mut severity = lock.clone();
        severity.bundles[1].rules[0].severity = Severity::Critical;
        assert_ne!(base, lock_hash(&severity).unwrap());

        let mut compiler = lock.clone();
        compiler.compiler_version = "9.9.9".to_string();
        assert_ne!(base, lock_hash(&compiler).unwrap());
    }

    #[test]
    fn test_unset_locked_hashes_like_false() {
        let lock = sample_lock();
        let mut a = lock.clone();
        a.bundles[0].rules[0].locked = None;
        let mut b = lock;
        b.bundles[0].rules[0].locked = Some(false);
        assert_eq!(lock_hash(&a).unwrap(), lock_hash(&b).unwrap());
    }

    #[test]
    fn test_parse_rejects_invalid_documents() {
        let lock = sample_lock();
        let value = serde_json::to_value(&lock).unwrap();
        assert_eq!(parse_lock(&value), Some(lock.clone()));

        let mut bad_hash = value.clone();
        bad_hash["bundles"][0]["contentHash"] = "xyz".into();
        assert!(parse_lock(&bad_hash).is_none());

        let mut bad_version = value.clone();
        bad_version["schemaVersion"] = "2.0".into();
        assert!(parse_lock(&bad_version).is_none());

        let mut bad_severity = value.clone();
        bad_severity["bundles"][0]["rules"][0]["severity"] = "FATAL".into();
        assert!(parse_lock(&bad_severity).is_none());

        let mut bad_time = value.clone();
        bad_time["generatedAt"] = "yesterday".into();
        assert!(parse_lock(&bad_time).is_none());

        let mut dup = value;
        let first = dup["bundles"][1]["rules"][0].clone();
        dup["bundles"][1]["rules"][1] = first;
        assert!(parse_lock(&dup).is_none());
    }

    #[test]
    fn test_write_and_load_lock() {
        let dir = TempDir::new().unwrap();
        assert!(load_lock(dir.path()).is_none());

        let lock = sample_lock();
        let path = write_lock(&lock, &dir.path().join(LOCK_FILE)).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("}\n"));
        assert!(content.contains("\"schemaVersion\": \"1.0\""));
        assert!(!dir.path().join("skills.lock.json.tmp").exists());

        assert_eq!(load_lock(dir.path()), Some(lock));

        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_lock(dir.path()).is_none());
    }
}
