//! Merge lock layers (built-in, repository, custom) into one effective lock.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::{hashed_rules, HashedRule, Lock, LockBundle};
use crate::digest::canonical_digest;
use crate::error::SkillsResult;
use crate::model::CompiledRule;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MergedBundleHashInput<'a> {
    name: &'a str,
    version: &'a str,
    provenance: &'a str,
    rules: Vec<HashedRule<'a>>,
}

/// Sort the bundle's rules and recompute its content hash from them.
pub fn rehash_bundle(bundle: &mut LockBundle) -> SkillsResult<()> {
    bundle.rules.sort_by(|a, b| a.id.cmp(&b.id));
    bundle.content_hash = canonical_digest(
        "merged bundle",
        &MergedBundleHashInput {
            name: &bundle.name,
            version: &bundle.version,
            provenance: &bundle.provenance,
            rules: hashed_rules(&bundle.rules),
        },
    )?;
    Ok(())
}

struct MergedBundle {
    version: String,
    provenance: String,
    rules: BTreeMap<String, CompiledRule>,
}

/// Merge `layers`, lowest priority first.
///
/// A later layer's bundle replaces the version and provenance of an earlier
/// bundle with the same name and overrides its rules by id. A rule id
/// redefined by a later layer under a different bundle leaves the earlier
/// bundle. Bundles left without rules are dropped and every surviving bundle
/// is rehashed. Returns `None` when no layer was supplied.
pub fn merge_locks<I>(layers: I) -> SkillsResult<Option<Lock>>
where
    I: IntoIterator<Item = Lock>,
{
    let mut merged: BTreeMap<String, MergedBundle> = BTreeMap::new();
    let mut generated_at = None;
    let mut layer_count = 0usize;

    for layer in layers {
        layer_count += 1;
        generated_at = generated_at.max(Some(layer.generated_at));

        for bundle in layer.bundles {
            for rule in &bundle.rules {
                for (name, other) in merged.iter_mut() {
                    if *name != bundle.name && other.rules.remove(&rule.id).is_some() {
                        debug!(rule = %rule.id, from = %name, to = %bundle.name, "rule moved by later layer");
                    }
                }
            }

            let entry = merged
                .entry(bundle.name.clone())
                .or_insert_with(|| MergedBundle {
                    version: bundle.version.clone(),
                    provenance: bundle.provenance.clone(),
                    rules: BTreeMap::new(),
                });
            entry.version = bundle.version;
            entry.provenance = bundle.provenance;
            for rule in bundle.rules {
                entry.rules.insert(rule.id.clone(), rule);
            }
        }
    }

    let Some(generated_at) = generated_at else {
        return Ok(None);
    };

    let mut bundles = Vec::with_capacity(merged.len());
    for (name, bundle) in merged {
        if bundle.rules.is_empty() {
            continue;
        }
        let mut bundle = LockBundle {
            name,
            version: bundle.version,
            provenance: bundle.provenance,
            content_hash: String::new(),
            rules: bundle.rules.into_values().collect(),
        };
        rehash_bundle(&mut bundle)?;
        bundles.push(bundle);
    }

    let lock = Lock::new(generated_at, bundles);
    debug!(
        layers = layer_count,
        bundles = lock.bundles.len(),
        rules = lock.rule_count(),
        "merged skills lock layers"
    );
    Ok(Some(lock))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::is_sha256_hex;
    use crate::lock::lock_hash;
    use crate::lock::tests::{bundle, fixed_time, rule};
    use crate::model::Severity;
    use chrono::Duration;

    #[test]
    fn test_no_layers_is_none() {
        assert!(merge_locks(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn test_later_layer_overrides_rule_and_bundle_identity() {
        let core = Lock::new(
            fixed_time(),
            vec![bundle(
                "ios-guidelines",
                vec![
                    rule("skills.ios.no-anyview", Severity::Warn),
                    rule("skills.ios.no-force-try", Severity::Error),
                ],
            )],
        );
        let mut repo_bundle = bundle("ios-guidelines", vec![rule("skills.ios.no-anyview", Severity::Critical)]);
        repo_bundle.version = "2.0.0".to_string();
        let repo = Lock::new(fixed_time() + Duration::hours(1), vec![repo_bundle]);

        let merged = merge_locks(vec![core, repo]).unwrap().unwrap();
        assert_eq!(merged.bundles.len(), 1);
        let ios = &merged.bundles[0];
        assert_eq!(ios.version, "2.0.0");
        assert_eq!(ios.rules.len(), 2);
        assert_eq!(
            merged.find_rule("skills.ios.no-anyview").unwrap().severity,
            Severity::Critical
        );
        assert_eq!(merged.generated_at, fixed_time() + Duration::hours(1));
        assert!(is_sha256_hex(&ios.content_hash));
        assert_ne!(ios.content_hash, "a".repeat(64));
    }

    #[test]
    fn test_rule_moves_to_later_bundle() {
        let core = Lock::new(
            fixed_time(),
            vec![bundle("ios-guidelines", vec![rule("skills.ios.no-anyview", Severity::Warn)])],
        );
        let custom = Lock::new(
            fixed_time(),
            vec![bundle("custom-guidelines", vec![rule("skills.ios.no-anyview", Severity::Error)])],
        );

        let merged = merge_locks(vec![core, custom]).unwrap().unwrap();
        let names: Vec<_> = merged.bundles.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["custom-guidelines"]);
        merged.validate().unwrap();
    }

    #[test]
    fn test_hash_reflects_final_content_only() {
        let a = Lock::new(
            fixed_time(),
            vec![bundle(
                "ios-guidelines",
                vec![
                    rule("skills.ios.no-anyview", Severity::Warn),
                    rule("skills.ios.no-force-try", Severity::Error),
                ],
            )],
        );
        let mut b = a.clone();
        b.bundles[0].rules.reverse();
        b.bundles[0].content_hash = "b".repeat(64);

        let ma = merge_locks(vec![a]).unwrap().unwrap();
        let mb = merge_locks(vec![b]).unwrap().unwrap();
        assert_eq!(ma.bundles[0].content_hash, mb.bundles[0].content_hash);
        assert_eq!(lock_hash(&ma).unwrap(), lock_hash(&mb).unwrap());
    }
}
