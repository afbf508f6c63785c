//! Mine enforceable rules out of free-form guideline markdown.
//!
//! Only lines that look like directives are considered: a ✅/❌ marker, or a
//! bullet carrying an enforcement keyword (English or Spanish). Fenced code,
//! headings and table rows are skipped. Well-known phrasings map to stable
//! canonical ids; everything else gets a slug id scoped to the bundle.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::model::{CompiledRule, Confidence, EvaluationMode, Origin, Platform, Severity, Stage};

static CHECK_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[✅❌]\s*").expect("static regex"));
static BULLET_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*]\s+").expect("static regex"));
static TASK_CHECKBOX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[[ xX]\]\s+").expect("static regex"));
static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("static regex"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").expect("static regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_]{1,3}").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));
static GUIDELINES_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-guidelines?$").expect("static regex"));

static RULE_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(always|siempre|prefer|use|usar|avoid|evitar|never|nunca|must|obligatorio|required|disallow|do not|no)\b",
    )
    .expect("static regex")
});
static FORBIDDEN_GLYPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*]\s+)?❌").expect("static regex"));
static CRITICAL_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(critical|bloqueante|block)\b").expect("static regex"));
static ERROR_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(never|nunca|must|obligatorio|required|disallow|avoid|evitar|do not)\b")
        .expect("static regex")
});
static HIGH_CONFIDENCE_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(must|obligatorio|required|disallow)\b").expect("static regex")
});
static STAGE_KEYWORDS: Lazy<[(Regex, Stage); 3]> = Lazy::new(|| {
    [
        (Regex::new(r"\bpre push\b").expect("static regex"), Stage::PrePush),
        (Regex::new(r"\bpre commit\b").expect("static regex"), Stage::PreCommit),
        (Regex::new(r"\bci\b").expect("static regex"), Stage::Ci),
    ]
});

const MIN_BULLET_CHARS: usize = 8;
const MIN_DESCRIPTION_CHARS: usize = 6;
const MAX_SLUG_CHARS: usize = 70;

/// A well-known phrasing and the canonical rule it maps to.
struct KnownTarget {
    platforms: &'static [Platform],
    needles: &'static [&'static str],
    /// Appended to `skills.<platform>.`.
    suffix: &'static str,
}

const IOS: &[Platform] = &[Platform::Ios];
const ANDROID: &[Platform] = &[Platform::Android];
const TYPESCRIPT: &[Platform] = &[Platform::Backend, Platform::Frontend];

/// First match wins, so more specific phrasings come first.
/// Needles are matched against lookup-normalized text (lowercase alphanumerics
/// separated by single spaces).
static KNOWN_TARGETS: &[KnownTarget] = &[
    KnownTarget { platforms: IOS, needles: &["force unwrap"], suffix: "no-force-unwrap" },
    KnownTarget { platforms: IOS, needles: &["force try"], suffix: "no-force-try" },
    KnownTarget { platforms: IOS, needles: &["anyview"], suffix: "no-anyview" },
    KnownTarget {
        platforms: IOS,
        needles: &["callback style", "completion handler"],
        suffix: "no-callback-style-outside-bridges",
    },
    KnownTarget { platforms: IOS, needles: &["force cast"], suffix: "no-force-cast" },
    KnownTarget {
        platforms: IOS,
        needles: &["dispatchqueue", "dispatch queue"],
        suffix: "no-dispatchqueue",
    },
    KnownTarget {
        platforms: IOS,
        needles: &["dispatchgroup", "dispatch group"],
        suffix: "no-dispatchgroup",
    },
    KnownTarget {
        platforms: IOS,
        needles: &["dispatchsemaphore", "dispatch semaphore"],
        suffix: "no-dispatchsemaphore",
    },
    KnownTarget {
        platforms: IOS,
        needles: &["operationqueue", "operation queue"],
        suffix: "no-operation-queue",
    },
    KnownTarget { platforms: IOS, needles: &["task detached"], suffix: "no-task-detached" },
    KnownTarget {
        platforms: IOS,
        needles: &["unchecked sendable"],
        suffix: "no-unchecked-sendable",
    },
    KnownTarget {
        platforms: IOS,
        needles: &["observableobject", "observable object"],
        suffix: "no-observable-object",
    },
    KnownTarget {
        platforms: IOS,
        needles: &["navigationview", "navigation view"],
        suffix: "no-navigation-view",
    },
    KnownTarget {
        platforms: IOS,
        needles: &["ontapgesture", "on tap gesture"],
        suffix: "no-on-tap-gesture",
    },
    KnownTarget { platforms: IOS, needles: &["string format"], suffix: "no-string-format" },
    KnownTarget {
        platforms: IOS,
        needles: &["uiscreen main bounds"],
        suffix: "no-uiscreen-main-bounds",
    },
    KnownTarget { platforms: ANDROID, needles: &["thread sleep"], suffix: "no-thread-sleep" },
    KnownTarget {
        platforms: ANDROID,
        needles: &["globalscope", "global scope"],
        suffix: "no-globalscope",
    },
    KnownTarget {
        platforms: ANDROID,
        needles: &["runblocking", "run blocking"],
        suffix: "no-runblocking",
    },
    KnownTarget {
        platforms: TYPESCRIPT,
        needles: &["solid", "single responsibility", "srp"],
        suffix: "no-solid-violations",
    },
    KnownTarget {
        platforms: TYPESCRIPT,
        needles: &["clean architecture"],
        suffix: "enforce-clean-architecture",
    },
    KnownTarget {
        platforms: TYPESCRIPT,
        needles: &["god classes", "god class", "500 lineas", "500 li neas", "500 lines"],
        suffix: "no-god-classes",
    },
    KnownTarget { platforms: TYPESCRIPT, needles: &["empty catch"], suffix: "no-empty-catch" },
    KnownTarget { platforms: TYPESCRIPT, needles: &["console log"], suffix: "no-console-log" },
    KnownTarget {
        platforms: TYPESCRIPT,
        needles: &["explicit any", " no any", "avoid any"],
        suffix: "avoid-explicit-any",
    },
];

/// One guideline document to extract from.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownSource<'a> {
    /// Bundle name; also decides the platform.
    pub bundle_name: &'a str,
    pub source_path: &'a str,
    pub content: &'a str,
}

/// Extract rules from `source`.
///
/// `existing_ids` are ids already claimed elsewhere (template rules, earlier
/// files in the same import); canonical matches against them are dropped and
/// generated ids are suffixed around them. The result is sorted by id.
pub fn extract_rules(
    source: &MarkdownSource<'_>,
    existing_ids: &BTreeSet<String>,
    origin: Origin,
) -> Vec<CompiledRule> {
    let platform = Platform::from_bundle_name(source.bundle_name);
    let mut used_ids = existing_ids.clone();
    let mut by_id: BTreeMap<String, CompiledRule> = BTreeMap::new();

    for raw_line in candidate_lines(source.content) {
        let description = sanitize_description(raw_line);
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            continue;
        }

        let id = match known_rule_id(platform, &normalize_for_lookup(&description)) {
            Some(known) if used_ids.contains(&known) => continue,
            Some(known) => known,
            None => generated_rule_id(platform, source.bundle_name, &description, &used_ids),
        };
        if used_ids.contains(&id) {
            continue;
        }
        used_ids.insert(id.clone());

        let rule = CompiledRule {
            id: id.clone(),
            description,
            severity: infer_severity(raw_line),
            platform,
            source_bundle_name: source.bundle_name.to_string(),
            source_path: source.source_path.to_string(),
            stage: infer_stage(raw_line),
            confidence: Some(infer_confidence(raw_line)),
            locked: Some(true),
            evaluation_mode: Some(EvaluationMode::Auto),
            origin,
        };
        // Last write wins per id.
        by_id.insert(id, rule);
    }

    by_id.into_values().collect()
}

/// Lines worth turning into rules, trimmed.
fn candidate_lines(markdown: &str) -> Vec<&str> {
    let mut candidates = Vec::new();
    let mut in_code_block = false;

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('|') {
            continue;
        }
        if is_candidate(trimmed) {
            candidates.push(trimmed);
        }
    }

    candidates
}

fn is_candidate(line: &str) -> bool {
    if CHECK_PREFIX.is_match(line) {
        return true;
    }
    if !BULLET_PREFIX.is_match(line) {
        return false;
    }
    let content = BULLET_PREFIX.replace(line, "");
    let content = content.trim();
    if CHECK_PREFIX.is_match(content) {
        return true;
    }
    if content.chars().count() < MIN_BULLET_CHARS {
        return false;
    }
    if TASK_CHECKBOX.is_match(content) || content.starts_with('|') {
        return false;
    }
    RULE_KEYWORDS.is_match(content)
}

fn sanitize_description(line: &str) -> String {
    let text = CHECK_PREFIX.replace(line, "");
    let text = BULLET_PREFIX.replace(&text, "");
    let text = CHECK_PREFIX.replace(&text, "");
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = EMPHASIS.replace_all(&text, "");
    let text = WHITESPACE.replace_all(&text, " ");
    text.trim().to_string()
}

/// NFKD, lowercase, non-alphanumerics collapsed to single spaces.
pub fn normalize_for_lookup(value: &str) -> String {
    let folded: String = value.nfkd().collect::<String>().to_lowercase();
    NON_ALNUM.replace_all(&folded, " ").trim().to_string()
}

/// NFKD, lowercase, non-alphanumerics collapsed to single dashes.
pub fn slugify(value: &str) -> String {
    let folded: String = value.nfkd().collect::<String>().to_lowercase();
    NON_ALNUM
        .replace_all(&folded, "-")
        .trim_matches('-')
        .to_string()
}

fn known_rule_id(platform: Platform, normalized: &str) -> Option<String> {
    KNOWN_TARGETS
        .iter()
        .filter(|target| target.platforms.contains(&platform))
        .find(|target| target.needles.iter().any(|needle| normalized.contains(needle)))
        .map(|target| format!("skills.{}.{}", platform, target.suffix))
}

fn generated_rule_id(
    platform: Platform,
    bundle_name: &str,
    description: &str,
    used_ids: &BTreeSet<String>,
) -> String {
    let slug = slugify(description);
    let slug = match &slug[..slug.len().min(MAX_SLUG_CHARS)] {
        "" => "rule",
        s => s,
    };
    let bundle_slug = GUIDELINES_SUFFIX.replace(&slugify(bundle_name), "").to_string();
    let bundle_slug = if bundle_slug.is_empty() { "bundle" } else { &bundle_slug };

    let base = format!("skills.{}.guideline.{}.{}", platform, bundle_slug, slug);
    if !used_ids.contains(&base) {
        return base;
    }
    let mut counter = 2;
    loop {
        let candidate = format!("{}-{}", base, counter);
        if !used_ids.contains(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn infer_severity(raw: &str) -> Severity {
    let normalized = normalize_for_lookup(raw);
    if CRITICAL_KEYWORDS.is_match(&normalized) {
        return Severity::Critical;
    }
    if FORBIDDEN_GLYPH.is_match(raw) || ERROR_KEYWORDS.is_match(&normalized) {
        return Severity::Error;
    }
    Severity::Warn
}

fn infer_confidence(raw: &str) -> Confidence {
    if FORBIDDEN_GLYPH.is_match(raw) || HIGH_CONFIDENCE_KEYWORDS.is_match(raw) {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

fn infer_stage(raw: &str) -> Option<Stage> {
    let normalized = normalize_for_lookup(raw);
    STAGE_KEYWORDS
        .iter()
        .find(|(pattern, _)| pattern.is_match(&normalized))
        .map(|(_, stage)| *stage)
}
