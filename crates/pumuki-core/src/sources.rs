//! Source manifest (`skills.sources.json`) and guideline source access.
//!
//! The manifest lists named rule bundles, each backed by a built-in template and
//! a guideline document. Loading fails closed: a structurally invalid manifest
//! yields `None`, never a partially filtered bundle list.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SchemaError;
use crate::schema::{require_non_empty, require_semver, require_version};

/// One rule bundle declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBundleSpec {
    pub name: String,
    pub version: String,
    pub source_path: String,
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl SourceBundleSpec {
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }

    /// Provenance recorded in the lock, defaulting to the source path.
    pub fn provenance(&self) -> String {
        self.provenance
            .clone()
            .unwrap_or_else(|| format!("file:{}", self.source_path))
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        require_non_empty("bundles[].name", &self.name)?;
        require_semver("bundles[].version", &self.version)?;
        require_non_empty("bundles[].sourcePath", &self.source_path)?;
        require_non_empty("bundles[].templateId", &self.template_id)?;
        if let Some(provenance) = &self.provenance {
            require_non_empty("bundles[].provenance", provenance)?;
        }
        Ok(())
    }
}

/// The `skills.sources.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesManifest {
    pub version: String,
    pub bundles: Vec<SourceBundleSpec>,
}

impl SourcesManifest {
    pub fn validate(&self) -> Result<(), SchemaError> {
        require_version(&self.version)?;
        for bundle in &self.bundles {
            bundle.validate()?;
        }
        Ok(())
    }

    pub fn enabled_bundles(&self) -> impl Iterator<Item = &SourceBundleSpec> {
        self.bundles.iter().filter(|b| b.is_enabled())
    }
}

/// Parse and validate manifest JSON. Any structural problem yields `None`.
pub fn parse_sources(content: &str) -> Option<SourcesManifest> {
    let manifest: SourcesManifest = match serde_json::from_str(content) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "skills sources manifest is not valid JSON for the schema");
            return None;
        }
    };
    if let Err(e) = manifest.validate() {
        warn!(error = %e, "skills sources manifest rejected");
        return None;
    }
    Some(manifest)
}

/// Read guideline documents and manifests by repository-relative path.
pub trait SourceProvider {
    /// Return the file content, or `None` when the path does not exist.
    fn read(&self, relative_path: &str) -> Option<String>;

    /// Human-readable location of `relative_path`, used in diagnostics.
    fn describe(&self, relative_path: &str) -> PathBuf;
}

/// Reads sources from a repository checkout.
#[derive(Debug, Clone)]
pub struct FsSourceProvider {
    root: PathBuf,
}

impl FsSourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceProvider for FsSourceProvider {
    fn read(&self, relative_path: &str) -> Option<String> {
        let path = self.root.join(relative_path);
        match std::fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "source not readable");
                None
            }
        }
    }

    fn describe(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }
}

/// In-memory sources, used for the embedded built-in bundles and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySourceProvider {
    label: String,
    files: BTreeMap<String, String>,
}

impl MemorySourceProvider {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl SourceProvider for MemorySourceProvider {
    fn read(&self, relative_path: &str) -> Option<String> {
        self.files.get(relative_path).cloned()
    }

    fn describe(&self, relative_path: &str) -> PathBuf {
        PathBuf::from(format!("{}:{}", self.label, relative_path))
    }
}

/// Load the manifest through a provider.
pub fn load_sources_from(provider: &dyn SourceProvider, manifest_file: &str) -> Option<SourcesManifest> {
    let content = provider.read(manifest_file)?;
    parse_sources(&content)
}

/// Load `manifest_file` relative to `repo_root`.
pub fn load_sources(repo_root: &Path, manifest_file: &str) -> Option<SourcesManifest> {
    load_sources_from(&FsSourceProvider::new(repo_root), manifest_file)
}
