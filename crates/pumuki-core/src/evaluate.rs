//! Turn a resolved rule set and a fact context into findings and a gate outcome.

use std::collections::BTreeSet;

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::facts::{Fact, FactContext, FactKind};
use crate::model::Severity;
use crate::policy::StagePolicy;
use crate::ruleset::{RuleDefinition, Scope};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<FactKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

enum PathPattern {
    Glob(GlobMatcher),
    Prefix(String),
}

impl PathPattern {
    fn new(pattern: &str) -> Self {
        let is_glob = pattern.contains(['*', '?', '[', '{']);
        if is_glob {
            match Glob::new(pattern) {
                Ok(glob) => return PathPattern::Glob(glob.compile_matcher()),
                Err(e) => {
                    warn!(pattern, error = %e, "invalid scope glob, matching as prefix");
                }
            }
        }
        PathPattern::Prefix(pattern.to_string())
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Glob(matcher) => matcher.is_match(path),
            PathPattern::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

struct CompiledScope {
    include: Vec<PathPattern>,
    exclude: Vec<PathPattern>,
}

impl CompiledScope {
    fn new(scope: &Scope) -> Self {
        Self {
            include: scope.include.iter().map(|p| PathPattern::new(p)).collect(),
            exclude: scope.exclude.iter().map(|p| PathPattern::new(p)).collect(),
        }
    }

    /// Path-less facts are never filtered out.
    fn admits(&self, fact: &Fact) -> bool {
        let Some(path) = fact.path() else {
            return true;
        };
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(path));
        included && !self.exclude.iter().any(|p| p.matches(path))
    }
}

fn finding(rule: &RuleDefinition, witness: Option<&Fact>) -> Finding {
    Finding {
        rule_id: rule.id.clone(),
        severity: rule.severity,
        code: rule.then.code.clone(),
        message: rule.then.message.clone(),
        file_path: witness.and_then(Fact::path).map(str::to_string),
        matched_by: witness.map(Fact::kind),
        source: witness.and_then(Fact::source).map(str::to_string),
    }
}

/// Findings for one rule: one per distinct witnessing path, or a single
/// path-less finding when nothing that fired names a file.
pub fn evaluate_rule(rule: &RuleDefinition, context: &FactContext) -> Vec<Finding> {
    let scoped;
    let context = match &rule.scope {
        Some(scope) => {
            let compiled = CompiledScope::new(scope);
            scoped = context.filtered(|fact| compiled.admits(fact));
            &scoped
        }
        None => context,
    };

    let Some(witnesses) = rule.when.witnesses(context) else {
        return Vec::new();
    };

    let mut seen = BTreeSet::new();
    let mut findings = Vec::new();
    for &fact in &witnesses {
        if let Some(path) = fact.path() {
            if seen.insert(path) {
                findings.push(finding(rule, Some(fact)));
            }
        }
    }

    if findings.is_empty() {
        findings.push(finding(rule, witnesses.first().copied()));
    }
    findings
}

/// Evaluate every rule against `context`. Findings follow rule order.
pub fn evaluate_rules(rules: &[RuleDefinition], context: &FactContext) -> Vec<Finding> {
    let findings: Vec<Finding> = rules
        .iter()
        .flat_map(|rule| evaluate_rule(rule, context))
        .collect();
    debug!(
        rules = rules.len(),
        facts = context.facts.len(),
        findings = findings.len(),
        "evaluated skills rules"
    );
    findings
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateOutcome {
    Pass,
    Warn,
    Block,
}

impl GateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Pass => "PASS",
            GateOutcome::Warn => "WARN",
            GateOutcome::Block => "BLOCK",
        }
    }
}

impl std::fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    pub outcome: GateOutcome,
    pub blocking: Vec<Finding>,
    pub warnings: Vec<Finding>,
    /// Below the warning threshold.
    pub informational: Vec<Finding>,
}

/// Classify findings against one stage's thresholds.
pub fn gate_decision(findings: &[Finding], thresholds: &StagePolicy) -> GateDecision {
    let mut blocking = Vec::new();
    let mut warnings = Vec::new();
    let mut informational = Vec::new();

    for finding in findings {
        if finding.severity.is_at_least(thresholds.block_on_or_above) {
            blocking.push(finding.clone());
        } else if finding.severity.is_at_least(thresholds.warn_on_or_above) {
            warnings.push(finding.clone());
        } else {
            informational.push(finding.clone());
        }
    }

    let outcome = if !blocking.is_empty() {
        GateOutcome::Block
    } else if !warnings.is_empty() {
        GateOutcome::Warn
    } else {
        GateOutcome::Pass
    };

    GateDecision {
        outcome,
        blocking,
        warnings,
        informational,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::facts::ChangeType;
    use crate::model::Platform;
    use crate::ruleset::{FindingKind, FindingTemplate};

    fn rule_with(id: &str, severity: Severity, when: Condition, scope: Option<Scope>) -> RuleDefinition {
        RuleDefinition {
            id: id.to_string(),
            description: format!("{} description", id),
            severity,
            platform: Platform::Generic,
            locked: true,
            confidence: None,
            when,
            then: FindingTemplate {
                kind: FindingKind::Finding,
                message: format!("{} fired", id),
                code: id.to_uppercase(),
            },
            scope,
        }
    }

    fn include(patterns: &[&str]) -> Option<Scope> {
        Some(Scope {
            include: patterns.iter().map(|p| p.to_string()).collect(),
            exclude: vec![],
        })
    }

    #[test]
    fn test_file_change_finding_carries_fact_details() {
        let rule = rule_with(
            "rule.backend",
            Severity::Warn,
            Condition::FileChange {
                path_prefix: Some("apps/backend/".to_string()),
                change_type: Some(ChangeType::Modified),
            },
            None,
        );
        let context = FactContext::new(vec![Fact::FileChange {
            path: "apps/backend/src/main.ts".to_string(),
            change_type: ChangeType::Modified,
            source: Some("git".to_string()),
        }]);

        let findings = evaluate_rules(&[rule], &context);
        assert_eq!(
            findings,
            vec![Finding {
                rule_id: "rule.backend".to_string(),
                severity: Severity::Warn,
                code: "RULE.BACKEND".to_string(),
                message: "rule.backend fired".to_string(),
                file_path: Some("apps/backend/src/main.ts".to_string()),
                matched_by: Some(FactKind::FileChange),
                source: Some("git".to_string()),
            }]
        );
    }

    #[test]
    fn test_scope_glob_excludes_other_paths() {
        let rule = rule_with(
            "rule.token",
            Severity::Warn,
            Condition::FileContent {
                contains: vec!["token".to_string()],
                regex: vec![],
            },
            include(&["apps/backend/*"]),
        );
        let frontend = FactContext::default()
            .with_file_content("apps/frontend/src/App.tsx", "const token = \"abc\";");
        assert!(evaluate_rules(&[rule.clone()], &frontend).is_empty());

        let backend = FactContext::default()
            .with_file_content("apps/backend/src/auth/token.ts", "const token = 1;");
        assert_eq!(evaluate_rules(&[rule], &backend).len(), 1);
    }

    #[test]
    fn test_one_finding_per_matching_file() {
        let rule = rule_with(
            "rule.any",
            Severity::Warn,
            Condition::FileContent {
                contains: vec![],
                regex: vec![r":\s*any\b".to_string()],
            },
            include(&["apps/backend/"]),
        );
        let context = FactContext::default()
            .with_file_content("apps/backend/src/a.ts", "const a: any = 1;")
            .with_file_content("apps/backend/src/b.ts", "const b: any = 2;")
            .with_file_content("apps/web/src/c.ts", "const c: any = 3;");

        let mut paths: Vec<_> = evaluate_rules(&[rule], &context)
            .into_iter()
            .filter_map(|f| f.file_path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["apps/backend/src/a.ts", "apps/backend/src/b.ts"]);
    }

    #[test]
    fn test_exclude_and_duplicate_paths() {
        let rule = rule_with(
            "rule.h",
            Severity::Error,
            Condition::heuristic("heuristics.ts.console-log.ast", None),
            Some(Scope {
                include: vec![],
                exclude: vec!["**/*.spec.ts".to_string()],
            }),
        );
        let context = FactContext::default()
            .with_heuristic("heuristics.ts.console-log.ast", "apps/backend/a.ts")
            .with_heuristic("heuristics.ts.console-log.ast", "apps/backend/a.ts")
            .with_heuristic("heuristics.ts.console-log.ast", "apps/backend/a.spec.ts");
        let findings = evaluate_rules(&[rule], &context);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].matched_by, Some(FactKind::Heuristic));
    }

    #[test]
    fn test_pathless_finding_and_declarative_rules() {
        let negated = rule_with(
            "rule.no-tests",
            Severity::Info,
            Condition::not(Condition::path_prefix("tests/")),
            None,
        );
        let placeholder = rule_with("rule.declarative", Severity::Critical, Condition::never(), None);
        let context = FactContext::default().with_changed_file("src/lib.rs", ChangeType::Added);

        let findings = evaluate_rules(&[negated, placeholder], &context);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "rule.no-tests");
        assert_eq!(findings[0].file_path, None);
        assert_eq!(findings[0].matched_by, None);
    }

    #[test]
    fn test_gate_decision_thresholds() {
        let thresholds = StagePolicy {
            block_on_or_above: Severity::Error,
            warn_on_or_above: Severity::Warn,
        };
        let make = |severity| Finding {
            rule_id: "r".to_string(),
            severity,
            code: "R".to_string(),
            message: "m".to_string(),
            file_path: None,
            matched_by: None,
            source: None,
        };

        assert_eq!(gate_decision(&[], &thresholds).outcome, GateOutcome::Pass);
        assert_eq!(gate_decision(&[make(Severity::Info)], &thresholds).outcome, GateOutcome::Pass);
        assert_eq!(gate_decision(&[make(Severity::Warn)], &thresholds).outcome, GateOutcome::Warn);

        let decision = gate_decision(
            &[make(Severity::Warn), make(Severity::Critical), make(Severity::Info)],
            &thresholds,
        );
        assert_eq!(decision.outcome, GateOutcome::Block);
        assert_eq!(decision.blocking.len(), 1);
        assert_eq!(decision.warnings.len(), 1);
        assert_eq!(decision.informational.len(), 1);
    }
}
