use chrono::{TimeZone, Utc};
use pumuki_core::lock::{core_lock, lock_hash, merge_locks, reset_core_lock_cache_for_tests};
use pumuki_core::{Lock, Severity};
use serial_test::serial;

fn permuted(lock: &Lock) -> Lock {
    let mut out = lock.clone();
    out.bundles.reverse();
    for bundle in &mut out.bundles {
        bundle.rules.reverse();
    }
    out
}

#[test]
#[serial]
fn test_hash_ignores_bundle_and_rule_order() {
    reset_core_lock_cache_for_tests();
    let lock = core_lock().unwrap().as_ref().clone();
    assert!(lock.bundles.len() > 1);
    assert_eq!(lock_hash(&lock).unwrap(), lock_hash(&permuted(&lock)).unwrap());
}

#[test]
#[serial]
fn test_hash_ignores_generated_at_but_tracks_content() {
    let lock = core_lock().unwrap().as_ref().clone();
    let base = lock_hash(&lock).unwrap();

    let mut restamped = lock.clone();
    restamped.generated_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(lock_hash(&restamped).unwrap(), base);

    let mut severity = lock.clone();
    let rule = &mut severity.bundles[0].rules[0];
    rule.severity = if rule.severity == Severity::Critical {
        Severity::Info
    } else {
        Severity::Critical
    };
    assert_ne!(lock_hash(&severity).unwrap(), base);

    let mut compiler = lock.clone();
    compiler.compiler_version = "9.9.9".to_string();
    assert_ne!(lock_hash(&compiler).unwrap(), base);
}

#[test]
#[serial]
fn test_core_lock_recompiles_identically_after_reset() {
    let first = core_lock().unwrap();
    reset_core_lock_cache_for_tests();
    let second = core_lock().unwrap();
    assert_eq!(lock_hash(&first).unwrap(), lock_hash(&second).unwrap());
}

#[test]
#[serial]
fn test_merge_is_stable_under_layer_permutation() {
    let lock = core_lock().unwrap().as_ref().clone();
    let merged = merge_locks([lock.clone()]).unwrap().unwrap();
    let merged_permuted = merge_locks([permuted(&lock)]).unwrap().unwrap();
    assert_eq!(lock_hash(&merged).unwrap(), lock_hash(&merged_permuted).unwrap());
    for (a, b) in merged.bundles.iter().zip(&merged_permuted.bundles) {
        assert_eq!(a.content_hash, b.content_hash);
    }
}
