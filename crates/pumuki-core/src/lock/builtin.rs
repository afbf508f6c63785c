//! The built-in core lock and effective-lock assembly.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use tracing::debug;

use super::{compile_lock_from, load_custom_lock, load_lock, merge_locks, CompileOptions, Lock};
use crate::config::{LayerOptions, SOURCES_MANIFEST_FILE};
use crate::error::SkillsResult;
use crate::sources::MemorySourceProvider;
use crate::templates::TemplateRegistry;

/// Built-in manifest and guideline documents.
///
/// Format: (path relative to the built-in source root, content)
pub static BUILTIN_SOURCES: &[(&str, &str)] = &[
    (SOURCES_MANIFEST_FILE, include_str!("../../skills/skills.sources.json")),
    ("docs/ios-guidelines.md", include_str!("../../skills/docs/ios-guidelines.md")),
    ("docs/android-guidelines.md", include_str!("../../skills/docs/android-guidelines.md")),
    ("docs/backend-guidelines.md", include_str!("../../skills/docs/backend-guidelines.md")),
    ("docs/frontend-guidelines.md", include_str!("../../skills/docs/frontend-guidelines.md")),
];

/// The embedded sources as a provider.
pub fn builtin_sources() -> MemorySourceProvider {
    BUILTIN_SOURCES
        .iter()
        .fold(MemorySourceProvider::new("builtin"), |provider, (path, content)| {
            provider.with_file(*path, *content)
        })
}

fn compile_core_lock() -> SkillsResult<Lock> {
    let templates = TemplateRegistry::builtin()?;
    let options = CompileOptions {
        // Epoch: the core layer carries no wall-clock time.
        generated_at: Some(DateTime::<Utc>::default()),
        ..CompileOptions::default()
    };
    compile_lock_from(&builtin_sources(), &templates, &options)
}

/// Memoized core lock. Compiled on first use and kept until [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct CoreLockCache {
    cell: Mutex<Option<Arc<Lock>>>,
}

impl CoreLockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> SkillsResult<Arc<Lock>> {
        let mut cell = self.cell.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = cell.as_ref() {
            return Ok(Arc::clone(lock));
        }
        let lock = Arc::new(compile_core_lock()?);
        debug!(rules = lock.rule_count(), "compiled built-in skills lock");
        *cell = Some(Arc::clone(&lock));
        Ok(lock)
    }

    pub fn reset(&self) {
        *self.cell.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cell.lock().map(|c| c.is_some()).unwrap_or(false)
    }
}

static CORE_LOCK_CACHE: Lazy<CoreLockCache> = Lazy::new(CoreLockCache::new);

/// Process-wide core lock.
pub fn core_lock() -> SkillsResult<Arc<Lock>> {
    CORE_LOCK_CACHE.get()
}

/// Drop the process-wide core lock so the next [`core_lock`] recompiles.
pub fn reset_core_lock_cache_for_tests() {
    CORE_LOCK_CACHE.reset();
}

/// Effective lock for `repo_root`: built-in, then repository, then custom.
///
/// `Ok(None)` when no layer is available.
pub fn load_effective_lock(
    repo_root: &Path,
    cache: &CoreLockCache,
    options: LayerOptions,
) -> SkillsResult<Option<Lock>> {
    let mut layers = Vec::with_capacity(3);
    if options.include_core {
        layers.push(cache.get()?.as_ref().clone());
    }
    if let Some(repo) = load_lock(repo_root) {
        layers.push(repo);
    }
    if let Some(custom) = load_custom_lock(repo_root) {
        layers.push(custom);
    }
    debug!(
        layers = layers.len(),
        include_core = options.include_core,
        "loading effective skills lock"
    );
    merge_locks(layers)
}
