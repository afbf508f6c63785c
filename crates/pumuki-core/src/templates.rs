//! Curated rule templates.
//!
//! A template is a reviewed rule list that a manifest bundle opts into via
//! `templateId`. Template rules win over rules mined from the guideline text
//! when ids collide.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{SkillsError, SkillsResult};
use crate::model::{CompiledRule, Confidence, EvaluationMode, Origin, Platform, Severity, Stage};
use crate::sources::SourceBundleSpec;

/// Version of this compiler, recorded in every lock it produces.
pub const COMPILER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Built-in templates embedded at compile time.
///
/// Format: (template_id, template_yaml_content)
pub static BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("markdown", include_str!("../templates/markdown.yaml")),
    ("ios-guidelines", include_str!("../templates/ios-guidelines.yaml")),
    ("android-guidelines", include_str!("../templates/android-guidelines.yaml")),
    ("backend-guidelines", include_str!("../templates/backend-guidelines.yaml")),
    ("frontend-guidelines", include_str!("../templates/frontend-guidelines.yaml")),
];

/// One curated rule inside a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct TemplateRule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    pub platform: Platform,
    #[serde(default)]
    pub stage: Option<Stage>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub locked: Option<bool>,
    #[serde(default)]
    pub evaluation_mode: Option<EvaluationMode>,
    #[serde(default)]
    pub origin: Option<Origin>,
}

impl TemplateRule {
    /// Bind the template rule to the bundle that uses it.
    pub fn compile_for(&self, bundle: &SourceBundleSpec) -> CompiledRule {
        CompiledRule {
            id: self.id.clone(),
            description: self.description.clone(),
            severity: self.severity,
            platform: self.platform,
            source_bundle_name: bundle.name.clone(),
            source_path: bundle.source_path.clone(),
            stage: self.stage,
            confidence: self.confidence,
            locked: self.locked,
            evaluation_mode: Some(self.evaluation_mode.unwrap_or(EvaluationMode::Auto)),
            origin: self.origin.unwrap_or(Origin::Core),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleTemplate {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<TemplateRule>,
}

impl RuleTemplate {
    fn validate(&self) -> SkillsResult<()> {
        let mut seen = std::collections::HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() || rule.description.trim().is_empty() {
                return Err(SkillsError::InvalidTemplate {
                    template: self.id.clone(),
                    reason: "rule id and description must not be empty".to_string(),
                });
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(SkillsError::InvalidTemplate {
                    template: self.id.clone(),
                    reason: format!("duplicate rule id {}", rule.id),
                });
            }
        }
        Ok(())
    }
}

/// Templates addressable by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, RuleTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every embedded template.
    pub fn builtin() -> SkillsResult<Self> {
        let mut registry = Self::new();
        for (id, content) in BUILTIN_TEMPLATES {
            let template: RuleTemplate =
                serde_yaml::from_str(content).map_err(|e| SkillsError::Parse {
                    what: format!("built-in template {}", id),
                    message: e.to_string(),
                })?;
            if template.id != *id {
                return Err(SkillsError::InvalidTemplate {
                    template: (*id).to_string(),
                    reason: format!("declares id {}", template.id),
                });
            }
            registry.register(template)?;
        }
        Ok(registry)
    }

    /// Add or replace a template.
    pub fn register(&mut self, template: RuleTemplate) -> SkillsResult<()> {
        template.validate()?;
        self.templates.insert(template.id.clone(), template);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&RuleTemplate> {
        self.templates.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }
}
