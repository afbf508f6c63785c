//! Resolve the effective lock into the rules active at one stage.
//!
//! Bundle enablement and severity promotion come from the policy, platform
//! eligibility from the detection result, and each rule's trigger from the
//! detector registry. Rules without a usable detector stay visible as
//! declarative placeholders that never fire.

mod detectors;

pub use detectors::{detector_bindings, resolve_detector_binding, DetectorBinding, DetectorKind};

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::Condition;
use crate::lock::Lock;
use crate::model::{CompiledRule, Confidence, EvaluationMode, Platform, Severity, Stage};
use crate::platform::DetectedPlatforms;
use crate::policy::Policy;

static NON_ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("static regex"));

pub const DECLARATIVE_CODE_SUFFIX: &str = "_DECLARATIVE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FindingKind {
    Finding,
}

/// What a satisfied rule reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingTemplate {
    pub kind: FindingKind,
    pub message: String,
    pub code: String,
}

/// Path filters applied to facts before a rule's condition is evaluated.
///
/// Entries are globs (`apps/backend/**`) or plain path prefixes (`apps/backend/`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// A compiled rule projected for evaluation at one stage. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    pub platform: Platform,
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    pub when: Condition,
    pub then: FindingTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

impl RuleDefinition {
    pub fn is_declarative(&self) -> bool {
        self.when.is_never()
    }
}

/// Inputs to [`build_rule_set`] beyond the lock itself.
#[derive(Debug, Clone, Copy)]
pub struct RuleSetRequest<'a> {
    pub stage: Stage,
    /// No policy: every bundle enabled, nothing promoted.
    pub policy: Option<&'a Policy>,
    /// No detection result: every platform assumed active.
    pub platforms: Option<&'a DetectedPlatforms>,
    /// When set, heuristic path prefixes are kept only if they exist under it.
    pub repo_root: Option<&'a Path>,
}

impl<'a> RuleSetRequest<'a> {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            policy: None,
            platforms: None,
            repo_root: None,
        }
    }

    pub fn with_policy(mut self, policy: &'a Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_platforms(mut self, platforms: &'a DetectedPlatforms) -> Self {
        self.platforms = Some(platforms);
        self
    }

    pub fn with_repo_root(mut self, repo_root: &'a Path) -> Self {
        self.repo_root = Some(repo_root);
        self
    }

    fn bundle_enabled(&self, name: &str) -> bool {
        self.policy.map_or(true, |p| p.bundle_enabled(name))
    }

    fn platform_admitted(&self, platform: Platform) -> bool {
        self.platforms.map_or(true, |d| d.admits(platform))
    }

    fn existing_prefixes(&self, platform: Platform) -> Vec<&'static str> {
        platform
            .source_prefixes()
            .iter()
            .copied()
            .filter(|prefix| self.repo_root.map_or(true, |root| root.join(prefix).is_dir()))
            .collect()
    }
}

/// Rules active at one stage plus what the caller must run to evaluate them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRuleSet {
    pub stage: Stage,
    /// Sorted by id, one per id.
    pub rules: Vec<RuleDefinition>,
    pub active_bundles: Vec<String>,
    pub required_detectors: BTreeSet<String>,
    pub mapped_heuristic_rule_ids: BTreeSet<String>,
    pub requires_heuristic_facts: bool,
    /// AUTO rules with no detector binding, emitted as placeholders.
    pub unsupported_auto_rule_ids: Vec<String>,
}

impl ResolvedRuleSet {
    pub fn find(&self, rule_id: &str) -> Option<&RuleDefinition> {
        self.rules
            .binary_search_by(|r| r.id.as_str().cmp(rule_id))
            .ok()
            .map(|i| &self.rules[i])
    }

    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id.as_str()).collect()
    }
}

/// `skills.ios.no-anyview` -> `SKILLS_SKILLS_IOS_NO_ANYVIEW`.
pub fn finding_code(rule_id: &str) -> String {
    format!(
        "SKILLS_{}",
        NON_ALNUM_RUN.replace_all(rule_id, "_").to_uppercase()
    )
}

/// Severity after promotion. Promotion applies at PRE_PUSH and CI and never lowers.
pub fn resolve_severity(rule: &CompiledRule, bundle: &str, policy: Option<&Policy>, stage: Stage) -> Severity {
    let promoted = stage >= Stage::PrePush && policy.is_some_and(|p| p.promotes(bundle, &rule.id));
    if promoted {
        rule.severity.max(Severity::Error)
    } else {
        rule.severity
    }
}

fn heuristic_condition(binding: &DetectorBinding, prefixes: &[&str]) -> Condition {
    let mut conditions: Vec<Condition> = binding
        .mapped_heuristic_rule_ids
        .iter()
        .flat_map(|heuristic_id| {
            let scoped: Vec<Option<String>> = if prefixes.is_empty() {
                vec![None]
            } else {
                prefixes.iter().map(|p| Some((*p).to_string())).collect()
            };
            scoped
                .into_iter()
                .map(move |prefix| Condition::heuristic(*heuristic_id, prefix))
        })
        .collect();

    if conditions.len() == 1 {
        conditions.remove(0)
    } else {
        Condition::any(conditions)
    }
}

struct Projected {
    definition: RuleDefinition,
    binding: Option<&'static DetectorBinding>,
    unsupported_auto: bool,
}

fn project_rule(rule: &CompiledRule, bundle: &str, request: &RuleSetRequest<'_>) -> Projected {
    let binding = resolve_detector_binding(&rule.id);
    let mode = rule.evaluation_mode();
    let active_binding = binding.filter(|_| mode == EvaluationMode::Auto);

    let (when, code) = match active_binding {
        Some(binding) => (
            heuristic_condition(binding, &request.existing_prefixes(rule.platform)),
            finding_code(&rule.id),
        ),
        None => (
            Condition::never(),
            format!("{}{}", finding_code(&rule.id), DECLARATIVE_CODE_SUFFIX),
        ),
    };

    Projected {
        definition: RuleDefinition {
            id: rule.id.clone(),
            description: rule.description.clone(),
            severity: resolve_severity(rule, bundle, request.policy, request.stage),
            platform: rule.platform,
            locked: rule.is_locked(),
            confidence: rule.confidence,
            when,
            then: FindingTemplate {
                kind: FindingKind::Finding,
                message: rule.description.clone(),
                code,
            },
            scope: None,
        },
        binding: active_binding,
        unsupported_auto: mode == EvaluationMode::Auto && binding.is_none(),
    }
}

/// Build the rule set active at `request.stage` from `lock`.
pub fn build_rule_set(lock: &Lock, request: &RuleSetRequest<'_>) -> ResolvedRuleSet {
    let mut active_bundles = Vec::new();
    let mut by_id: BTreeMap<String, Projected> = BTreeMap::new();

    for bundle in &lock.bundles {
        if !request.bundle_enabled(&bundle.name) {
            debug!(bundle = %bundle.name, "skills bundle disabled by policy");
            continue;
        }
        active_bundles.push(bundle.name.clone());

        for rule in &bundle.rules {
            if !request.platform_admitted(rule.platform) {
                continue;
            }
            if !request.stage.admits(rule.stage) {
                continue;
            }
            // Later bundles override earlier ones.
            by_id.insert(rule.id.clone(), project_rule(rule, &bundle.name, request));
        }
    }

    let mut required_detectors = BTreeSet::new();
    let mut mapped_heuristic_rule_ids = BTreeSet::new();
    let mut unsupported_auto_rule_ids = Vec::new();
    let mut rules = Vec::with_capacity(by_id.len());

    for (id, projected) in by_id {
        if let Some(binding) = projected.binding {
            required_detectors.insert(binding.detector_id.to_string());
            mapped_heuristic_rule_ids.extend(
                binding
                    .mapped_heuristic_rule_ids
                    .iter()
                    .map(|h| (*h).to_string()),
            );
        }
        if projected.unsupported_auto {
            unsupported_auto_rule_ids.push(id);
        }
        rules.push(projected.definition);
    }

    let requires_heuristic_facts = rules.iter().any(|r| !r.is_declarative());
    debug!(
        stage = %request.stage,
        rules = rules.len(),
        bundles = active_bundles.len(),
        detectors = required_detectors.len(),
        "resolved skills rule set"
    );

    ResolvedRuleSet {
        stage: request.stage,
        rules,
        active_bundles,
        required_detectors,
        mapped_heuristic_rule_ids,
        requires_heuristic_facts,
        unsupported_auto_rule_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::tests::{bundle, fixed_time, rule};
    use crate::policy::BundlePolicy;
    use tempfile::TempDir;

    fn ios_rule(id: &str, severity: Severity) -> CompiledRule {
        CompiledRule {
            platform: Platform::Ios,
            ..rule(id, severity)
        }
    }

    fn ios_lock() -> Lock {
        Lock::new(
            fixed_time(),
            vec![bundle(
                "ios-guidelines",
                vec![
                    ios_rule("skills.ios.no-anyview", Severity::Error),
                    ios_rule("skills.ios.no-task-detached", Severity::Warn),
                    ios_rule("skills.ios.guideline.ios-guidelines.prefer-structs", Severity::Warn),
                ],
            )],
        )
    }

    fn promoting_policy() -> Policy {
        let mut policy = Policy::default();
        policy.per_bundle.insert(
            "ios-guidelines".to_string(),
            BundlePolicy {
                enabled: true,
                promote_to_error_rule_ids: vec![
                    "skills.ios.no-task-detached".to_string(),
                    "skills.ios.no-anyview".to_string(),
                ],
            },
        );
        policy
    }

    #[test]
    fn test_finding_code() {
        assert_eq!(finding_code("skills.ios.no-anyview"), "SKILLS_SKILLS_IOS_NO_ANYVIEW");
        assert_eq!(finding_code("a..b--c"), "SKILLS_A_B_C");
    }

    #[test]
    fn test_heuristic_condition_over_platform_prefixes() {
        let lock = ios_lock();
        let set = build_rule_set(&lock, &RuleSetRequest::new(Stage::PreCommit));
        let anyview = set.find("skills.ios.no-anyview").unwrap();
        assert_eq!(
            anyview.when,
            Condition::any(vec![
                Condition::heuristic("heuristics.ios.anyview.ast", Some("apps/ios/".into())),
                Condition::heuristic("heuristics.ios.anyview.ast", Some("ios/".into())),
            ])
        );
        assert_eq!(anyview.then.code, "SKILLS_SKILLS_IOS_NO_ANYVIEW");
        assert!(set.required_detectors.contains("ios.anyview"));
        assert!(set.mapped_heuristic_rule_ids.contains("heuristics.ios.anyview.ast"));
        assert!(set.requires_heuristic_facts);
    }

    #[test]
    fn test_prefixes_filtered_by_repo_layout() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("apps/ios")).unwrap();
        let lock = ios_lock();
        let request = RuleSetRequest::new(Stage::PreCommit).with_repo_root(dir.path());
        let set = build_rule_set(&lock, &request);
        assert_eq!(
            set.find("skills.ios.no-anyview").unwrap().when,
            Condition::heuristic("heuristics.ios.anyview.ast", Some("apps/ios/".into()))
        );

        let empty = TempDir::new().unwrap();
        let request = RuleSetRequest::new(Stage::PreCommit).with_repo_root(empty.path());
        let set = build_rule_set(&lock, &request);
        assert_eq!(
            set.find("skills.ios.no-anyview").unwrap().when,
            Condition::heuristic("heuristics.ios.anyview.ast", None)
        );
    }

    #[test]
    fn test_unbound_rule_is_declarative_placeholder() {
        let set = build_rule_set(&ios_lock(), &RuleSetRequest::new(Stage::Ci));
        let id = "skills.ios.guideline.ios-guidelines.prefer-structs";
        let placeholder = set.find(id).unwrap();
        assert!(placeholder.is_declarative());
        assert!(placeholder.then.code.ends_with(DECLARATIVE_CODE_SUFFIX));
        assert_eq!(set.unsupported_auto_rule_ids, vec![id.to_string()]);

        let mut lock = ios_lock();
        lock.bundles[0].rules[0].evaluation_mode = Some(EvaluationMode::Declarative);
        let set = build_rule_set(&lock, &RuleSetRequest::new(Stage::Ci));
        assert!(set.find("skills.ios.no-anyview").unwrap().is_declarative());
        assert!(!set.required_detectors.contains("ios.anyview"));
        assert!(!set.unsupported_auto_rule_ids.contains(&"skills.ios.no-anyview".to_string()));
    }

    #[test]
    fn test_promotion_only_at_push_and_ci_and_never_downgrades() {
        let lock = Lock::new(
            fixed_time(),
            vec![bundle(
                "ios-guidelines",
                vec![
                    ios_rule("skills.ios.no-task-detached", Severity::Warn),
                    ios_rule("skills.ios.no-anyview", Severity::Critical),
                ],
            )],
        );
        let policy = promoting_policy();

        let commit = build_rule_set(&lock, &RuleSetRequest::new(Stage::PreCommit).with_policy(&policy));
        assert_eq!(commit.find("skills.ios.no-task-detached").unwrap().severity, Severity::Warn);

        for stage in [Stage::PrePush, Stage::Ci] {
            let set = build_rule_set(&lock, &RuleSetRequest::new(stage).with_policy(&policy));
            assert_eq!(set.find("skills.ios.no-task-detached").unwrap().severity, Severity::Error);
            assert_eq!(set.find("skills.ios.no-anyview").unwrap().severity, Severity::Critical);
        }
    }

    #[test]
    fn test_stage_and_platform_filters() {
        let mut lock = ios_lock();
        lock.bundles[0].rules[0].stage = Some(Stage::PrePush);
        lock.bundles.push(bundle(
            "team-guidelines",
            vec![CompiledRule {
                platform: Platform::Generic,
                ..rule("skills.generic.team.keep-it-small", Severity::Info)
            }],
        ));

        let commit = build_rule_set(&lock, &RuleSetRequest::new(Stage::PreCommit));
        assert!(commit.find("skills.ios.no-anyview").is_none());
        let push = build_rule_set(&lock, &RuleSetRequest::new(Stage::PrePush));
        assert!(push.find("skills.ios.no-anyview").is_some());

        let backend_only = DetectedPlatforms::detected(&[Platform::Backend]);
        let set = build_rule_set(
            &lock,
            &RuleSetRequest::new(Stage::Ci).with_platforms(&backend_only),
        );
        assert_eq!(set.rule_ids(), vec!["skills.generic.team.keep-it-small"]);
        assert!(!set.requires_heuristic_facts);
    }

    #[test]
    fn test_bundle_enablement_and_dedup() {
        let mut lock = ios_lock();
        lock.bundles.push(bundle(
            "ios-overrides",
            vec![ios_rule("skills.ios.no-anyview", Severity::Critical)],
        ));
        lock.sort_bundles();

        let set = build_rule_set(&lock, &RuleSetRequest::new(Stage::PreCommit));
        assert_eq!(set.active_bundles, vec!["ios-guidelines", "ios-overrides"]);
        assert_eq!(set.find("skills.ios.no-anyview").unwrap().severity, Severity::Critical);
        assert_eq!(set.rules.len(), 3);

        let mut policy = Policy::default();
        policy.default_bundle_enabled = false;
        policy.per_bundle.insert(
            "ios-overrides".to_string(),
            BundlePolicy {
                enabled: true,
                promote_to_error_rule_ids: vec![],
            },
        );
        let set = build_rule_set(&lock, &RuleSetRequest::new(Stage::PreCommit).with_policy(&policy));
        assert_eq!(set.active_bundles, vec!["ios-overrides"]);
        assert_eq!(set.rule_ids(), vec!["skills.ios.no-anyview"]);
    }

    #[test]
    fn test_solid_binding_expands_every_heuristic() {
        let lock = Lock::new(
            fixed_time(),
            vec![bundle(
                "backend-guidelines",
                vec![CompiledRule {
                    platform: Platform::Backend,
                    ..rule("skills.backend.no-solid-violations", Severity::Warn)
                }],
            )],
        );
        let set = build_rule_set(&lock, &RuleSetRequest::new(Stage::Ci));
        match &set.rules[0].when {
            Condition::Any { conditions } => assert_eq!(conditions.len(), 6),
            other => panic!("expected Any, got {:?}", other),
        }
        assert_eq!(set.mapped_heuristic_rule_ids.len(), 6);
    }
}
