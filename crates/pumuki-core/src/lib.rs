//! Guideline compilation, lock determinism, policy resolution and condition
//! evaluation for the `pumuki` pipeline gates.

pub mod condition;
pub mod config;
pub mod digest;
pub mod error;
pub mod evaluate;
pub mod extract;
pub mod facts;
pub mod lock;
pub mod model;
pub mod platform;
pub mod policy;
pub mod ruleset;
pub mod schema;
pub mod sources;
pub mod templates;

// Convenience re-exports
pub use condition::Condition;
pub use config::LayerOptions;
pub use error::{SchemaError, SkillsError, SkillsResult};
pub use evaluate::{evaluate_rules, gate_decision, Finding, GateDecision, GateOutcome};
pub use extract::{extract_rules, MarkdownSource};
pub use facts::{load_facts, ChangeType, Fact, FactContext, FactKind};
pub use lock::{
    check_lock_status, compile_lock, core_lock, import_custom_rules, load_effective_lock,
    load_lock, lock_hash, merge_locks, reset_core_lock_cache_for_tests, write_lock,
    CompileOptions, CoreLockCache, Lock, LockBundle, LockCheck, LockStatus,
};
pub use model::{CompiledRule, Confidence, EvaluationMode, Origin, Platform, Severity, Stage};
pub use platform::DetectedPlatforms;
pub use policy::{load_policy, policy_hash, Policy, StagePolicy};
pub use ruleset::{build_rule_set, ResolvedRuleSet, RuleDefinition, RuleSetRequest};
pub use sources::{load_sources, SourceBundleSpec, SourcesManifest};
pub use templates::{TemplateRegistry, COMPILER_VERSION};
