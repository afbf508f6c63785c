//! Compile a sources manifest into a lock, and check an on-disk lock for staleness.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{hashed_rules, load_lock_file, lock_hash, HashedRule, Lock, LockBundle};
use crate::config::{LOCK_FILE, SOURCES_MANIFEST_FILE};
use crate::digest::{canonical_digest, sha256_hex};
use crate::error::{SkillsError, SkillsResult};
use crate::extract::{extract_rules, MarkdownSource};
use crate::model::{CompiledRule, Origin};
use crate::sources::{load_sources_from, FsSourceProvider, SourceBundleSpec, SourceProvider};
use crate::templates::TemplateRegistry;

/// Inputs for compiling and checking a lock.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Manifest path relative to the source root.
    pub manifest_file: String,

    /// Lock path relative to the repository root.
    pub lock_file: String,

    /// Timestamp to stamp; `None` means now.
    pub generated_at: Option<DateTime<Utc>>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            manifest_file: SOURCES_MANIFEST_FILE.to_string(),
            lock_file: LOCK_FILE.to_string(),
            generated_at: None,
        }
    }
}

/// Freshness of an on-disk lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    Fresh,
    Stale,
    Missing,
    Invalid,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Fresh => "fresh",
            LockStatus::Stale => "stale",
            LockStatus::Missing => "missing",
            LockStatus::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`check_lock_status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockCheck {
    pub status: LockStatus,
    pub details: String,
}

/// What the bundle content hash covers.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BundleHashInput<'a> {
    name: &'a str,
    version: &'a str,
    template_id: &'a str,
    source_path: &'a str,
    source_content_sha256: String,
    rules: Vec<HashedRule<'a>>,
}

/// Compile the manifest found under `repo_root`.
pub fn compile_lock(repo_root: &Path, options: &CompileOptions) -> SkillsResult<Lock> {
    let templates = TemplateRegistry::builtin()?;
    compile_lock_from(&FsSourceProvider::new(repo_root), &templates, options)
}

/// Compile a manifest read through `provider`.
///
/// # Errors
///
/// - [`SkillsError::ManifestUnavailable`] when the manifest is missing or invalid
/// - [`SkillsError::UnknownTemplate`] when a bundle names an unregistered template
/// - [`SkillsError::SourceMissing`] when a bundle's guideline document is absent
pub fn compile_lock_from(
    provider: &dyn SourceProvider,
    templates: &TemplateRegistry,
    options: &CompileOptions,
) -> SkillsResult<Lock> {
    let manifest = load_sources_from(provider, &options.manifest_file).ok_or_else(|| {
        SkillsError::ManifestUnavailable {
            path: provider.describe(&options.manifest_file),
        }
    })?;

    let bundles = manifest
        .enabled_bundles()
        .map(|spec| compile_bundle(spec, provider, templates))
        .collect::<SkillsResult<Vec<_>>>()?;

    let lock = Lock::new(options.generated_at.unwrap_or_else(Utc::now), bundles);
    info!(
        bundles = lock.bundles.len(),
        rules = lock.rule_count(),
        "compiled skills lock"
    );
    Ok(lock)
}

fn compile_bundle(
    spec: &SourceBundleSpec,
    provider: &dyn SourceProvider,
    templates: &TemplateRegistry,
) -> SkillsResult<LockBundle> {
    let template = templates
        .get(&spec.template_id)
        .ok_or_else(|| SkillsError::UnknownTemplate {
            template: spec.template_id.clone(),
            bundle: spec.name.clone(),
        })?;

    let content = provider
        .read(&spec.source_path)
        .ok_or_else(|| SkillsError::SourceMissing {
            bundle: spec.name.clone(),
            path: spec.source_path.clone(),
        })?;

    let template_rules: Vec<CompiledRule> =
        template.rules.iter().map(|r| r.compile_for(spec)).collect();
    let template_ids: BTreeSet<String> = template_rules.iter().map(|r| r.id.clone()).collect();

    let extracted = extract_rules(
        &MarkdownSource {
            bundle_name: &spec.name,
            source_path: &spec.source_path,
            content: &content,
        },
        &template_ids,
        Origin::Core,
    );

    // Template rules are curated and win on id collision.
    let mut by_id: BTreeMap<String, CompiledRule> = BTreeMap::new();
    for rule in extracted.into_iter().chain(template_rules) {
        by_id.insert(rule.id.clone(), rule);
    }
    let rules: Vec<CompiledRule> = by_id.into_values().collect();

    let content_hash = canonical_digest(
        "bundle content",
        &BundleHashInput {
            name: &spec.name,
            version: &spec.version,
            template_id: &spec.template_id,
            source_path: &spec.source_path,
            source_content_sha256: sha256_hex(content.as_bytes()),
            rules: hashed_rules(&rules),
        },
    )?;

    debug!(
        bundle = %spec.name,
        template = %spec.template_id,
        rules = rules.len(),
        "compiled bundle"
    );

    Ok(LockBundle {
        name: spec.name.clone(),
        version: spec.version.clone(),
        provenance: spec.provenance(),
        content_hash,
        rules,
    })
}

/// Compare the on-disk lock with a fresh compilation.
///
/// The fresh lock is stamped with the persisted `generatedAt`, so only content
/// differences count. Compilation failures surface as [`LockStatus::Invalid`].
pub fn check_lock_status(repo_root: &Path, options: &CompileOptions) -> LockCheck {
    let lock_path = repo_root.join(&options.lock_file);
    if !lock_path.exists() {
        return LockCheck {
            status: LockStatus::Missing,
            details: format!("{} is missing. Run skills compile.", options.lock_file),
        };
    }

    let Some(existing) = load_lock_file(&lock_path) else {
        return LockCheck {
            status: LockStatus::Invalid,
            details: format!("{} is not a valid skills lock.", options.lock_file),
        };
    };

    let recompile = CompileOptions {
        generated_at: Some(existing.generated_at),
        ..options.clone()
    };
    let hashes = compile_lock(repo_root, &recompile)
        .and_then(|fresh| Ok((lock_hash(&existing)?, lock_hash(&fresh)?)));

    match hashes {
        Ok((existing_hash, fresh_hash)) if existing_hash == fresh_hash => LockCheck {
            status: LockStatus::Fresh,
            details: format!("{} is fresh.", options.lock_file),
        },
        Ok(_) => {
            warn!(path = %lock_path.display(), "skills lock is stale");
            LockCheck {
                status: LockStatus::Stale,
                details: format!("{} is stale. Re-run skills compile.", options.lock_file),
            }
        }
        Err(e) => LockCheck {
            status: LockStatus::Invalid,
            details: e.to_string(),
        },
    }
}
