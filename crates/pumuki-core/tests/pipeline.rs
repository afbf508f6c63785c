use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use pumuki_core::config::{LayerOptions, LOCK_FILE};
use pumuki_core::lock::{check_lock_status, load_lock, CoreLockCache, LockStatus};
use pumuki_core::{
    build_rule_set, compile_lock, evaluate_rules, gate_decision, import_custom_rules,
    load_effective_lock, write_lock, CompileOptions, Condition, FactContext, GateOutcome,
    Platform, Policy, RuleSetRequest, Severity, Stage,
};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn ios_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "skills.sources.json",
        r#"{
  "version": "1.0",
  "bundles": [
    { "name": "ios-guidelines", "version": "1.0.0", "sourcePath": "docs/ios.md", "templateId": "markdown", "enabled": true }
  ]
}"#,
    );
    write(dir.path(), "docs/ios.md", "# SwiftUI\n\n❌ Never use AnyView\n");
    dir
}

fn options() -> CompileOptions {
    CompileOptions {
        generated_at: Some(Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()),
        ..CompileOptions::default()
    }
}

#[test]
fn test_compile_resolve_evaluate() {
    let repo = ios_repo();
    let lock = compile_lock(repo.path(), &options()).unwrap();

    assert_eq!(lock.bundles.len(), 1);
    assert_eq!(lock.rule_count(), 1);
    let rule = &lock.bundles[0].rules[0];
    assert_eq!(rule.id, "skills.ios.no-anyview");
    assert_eq!(rule.severity, Severity::Error);
    assert_eq!(rule.platform, Platform::Ios);

    let policy = Policy::default();
    let request = RuleSetRequest::new(Stage::PreCommit).with_policy(&policy);
    let rule_set = build_rule_set(&lock, &request);
    let resolved = rule_set.find("skills.ios.no-anyview").unwrap();
    assert_eq!(resolved.severity, Severity::Error);
    assert!(!resolved.is_declarative());
    assert!(matches!(resolved.when, Condition::Any { ref conditions } if conditions.len() == 2));

    let facts = FactContext::default()
        .with_heuristic("heuristics.ios.anyview.ast", "apps/ios/Feature/View.swift")
        .with_heuristic("heuristics.ios.anyview.ast", "apps/backend/src/view.ts");
    let findings = evaluate_rules(&rule_set.rules, &facts);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].file_path.as_deref(), Some("apps/ios/Feature/View.swift"));

    let commit = gate_decision(&findings, policy.stage(Stage::PreCommit));
    assert_eq!(commit.outcome, GateOutcome::Warn);
    let push = gate_decision(&findings, policy.stage(Stage::PrePush));
    assert_eq!(push.outcome, GateOutcome::Block);
}

#[test]
fn test_written_lock_is_fresh_until_sources_change() {
    let repo = ios_repo();
    assert_eq!(check_lock_status(repo.path(), &options()).status, LockStatus::Missing);

    let lock = compile_lock(repo.path(), &options()).unwrap();
    let path = write_lock(&lock, &repo.path().join(LOCK_FILE)).unwrap();
    assert!(fs::read_to_string(&path).unwrap().ends_with('\n'));
    assert_eq!(load_lock(repo.path()).unwrap(), lock);

    // A different clock must not make the lock stale.
    let later = CompileOptions::default();
    assert_eq!(check_lock_status(repo.path(), &later).status, LockStatus::Fresh);

    write(repo.path(), "docs/ios.md", "❌ Never use AnyView\n- Avoid force unwrap in views\n");
    let check = check_lock_status(repo.path(), &later);
    assert_eq!(check.status, LockStatus::Stale);

    fs::remove_file(repo.path().join("docs/ios.md")).unwrap();
    let check = check_lock_status(repo.path(), &later);
    assert_eq!(check.status, LockStatus::Invalid);
    assert!(!check.details.is_empty());
}

#[test]
fn test_effective_lock_layers_custom_rules_last() {
    let repo = ios_repo();
    let lock = compile_lock(repo.path(), &options()).unwrap();
    write_lock(&lock, &repo.path().join(LOCK_FILE)).unwrap();

    write(
        repo.path(),
        "skills/team/SKILL.md",
        "- Never log access tokens in request handlers\n",
    );
    write(repo.path(), "AGENTS.md", "Follow ./skills/team/SKILL.md.\n");
    let imported = import_custom_rules(repo.path(), &[]).unwrap();
    assert_eq!(imported.rules.len(), 1);

    let cache = CoreLockCache::new();
    let effective = load_effective_lock(repo.path(), &cache, LayerOptions::without_core())
        .unwrap()
        .unwrap();
    let names: Vec<_> = effective.bundles.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["custom-guidelines", "ios-guidelines"]);
    assert!(effective.find_rule(&imported.rules[0].id).is_some());
    effective.validate().unwrap();

    let rule_set = build_rule_set(&effective, &RuleSetRequest::new(Stage::Ci));
    assert_eq!(rule_set.rules.len(), 2);
    assert_eq!(rule_set.unsupported_auto_rule_ids, vec![imported.rules[0].id.clone()]);
}

#[test]
fn test_unknown_template_and_missing_source_fail_compile() {
    let repo = ios_repo();
    write(
        repo.path(),
        "skills.sources.json",
        r#"{"version": "1.0", "bundles": [
  { "name": "ios-guidelines", "version": "1.0.0", "sourcePath": "docs/ios.md", "templateId": "nope" }
]}"#,
    );
    let err = compile_lock(repo.path(), &options()).unwrap_err();
    assert!(err.to_string().contains("nope"));

    write(
        repo.path(),
        "skills.sources.json",
        r#"{"version": "1.0", "bundles": [
  { "name": "ios-guidelines", "version": "1.0.0", "sourcePath": "docs/missing.md", "templateId": "markdown" }
]}"#,
    );
    let err = compile_lock(repo.path(), &options()).unwrap_err();
    assert!(err.to_string().contains("docs/missing.md"));
}
