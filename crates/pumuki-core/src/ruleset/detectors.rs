//! Static registry of deterministic detectors backing compiled rules.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Heuristic,
}

/// Which detector satisfies a rule and which heuristic fact ids it emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorBinding {
    pub rule_id: &'static str,
    pub detector_id: &'static str,
    pub detector_kind: DetectorKind,
    pub mapped_heuristic_rule_ids: &'static [&'static str],
}

const fn heuristic(
    rule_id: &'static str,
    detector_id: &'static str,
    mapped_heuristic_rule_ids: &'static [&'static str],
) -> DetectorBinding {
    DetectorBinding {
        rule_id,
        detector_id,
        detector_kind: DetectorKind::Heuristic,
        mapped_heuristic_rule_ids,
    }
}

const TS_EMPTY_CATCH: &[&str] = &["heuristics.ts.empty-catch.ast"];
const TS_CONSOLE_LOG: &[&str] = &["heuristics.ts.console-log.ast"];
const TS_EXPLICIT_ANY: &[&str] = &["heuristics.ts.explicit-any.ast"];
const TS_SOLID: &[&str] = &[
    "heuristics.ts.solid.srp.class-command-query-mix.ast",
    "heuristics.ts.solid.isp.interface-command-query-mix.ast",
    "heuristics.ts.solid.ocp.discriminator-switch.ast",
    "heuristics.ts.solid.lsp.override-not-implemented.ast",
    "heuristics.ts.solid.dip.framework-import.ast",
    "heuristics.ts.solid.dip.concrete-instantiation.ast",
];
const TS_CLEAN_ARCHITECTURE: &[&str] = &[
    "heuristics.ts.solid.dip.framework-import.ast",
    "heuristics.ts.solid.dip.concrete-instantiation.ast",
];
const TS_GOD_CLASS: &[&str] = &["heuristics.ts.god-class-large-class.ast"];

/// Sorted by rule id; lookups binary-search.
static BINDINGS: &[DetectorBinding] = &[
    heuristic("skills.android.no-globalscope", "android.globalscope", &["heuristics.android.globalscope.ast"]),
    heuristic("skills.android.no-runblocking", "android.run-blocking", &["heuristics.android.run-blocking.ast"]),
    heuristic("skills.android.no-thread-sleep", "android.thread-sleep", &["heuristics.android.thread-sleep.ast"]),
    heuristic("skills.backend.avoid-explicit-any", "typescript.explicit-any", TS_EXPLICIT_ANY),
    heuristic("skills.backend.enforce-clean-architecture", "typescript.clean-architecture", TS_CLEAN_ARCHITECTURE),
    heuristic("skills.backend.no-console-log", "typescript.console-log", TS_CONSOLE_LOG),
    heuristic("skills.backend.no-empty-catch", "typescript.empty-catch", TS_EMPTY_CATCH),
    heuristic("skills.backend.no-god-classes", "typescript.god-class", TS_GOD_CLASS),
    heuristic("skills.backend.no-solid-violations", "typescript.solid", TS_SOLID),
    heuristic("skills.frontend.avoid-explicit-any", "typescript.explicit-any", TS_EXPLICIT_ANY),
    heuristic("skills.frontend.enforce-clean-architecture", "typescript.clean-architecture", TS_CLEAN_ARCHITECTURE),
    heuristic("skills.frontend.no-console-log", "typescript.console-log", TS_CONSOLE_LOG),
    heuristic("skills.frontend.no-empty-catch", "typescript.empty-catch", TS_EMPTY_CATCH),
    heuristic("skills.frontend.no-god-classes", "typescript.god-class", TS_GOD_CLASS),
    heuristic("skills.frontend.no-solid-violations", "typescript.solid", TS_SOLID),
    heuristic("skills.ios.no-anyview", "ios.anyview", &["heuristics.ios.anyview.ast"]),
    heuristic("skills.ios.no-callback-style-outside-bridges", "ios.callback-style", &["heuristics.ios.callback-style.ast"]),
    heuristic("skills.ios.no-dispatchgroup", "ios.dispatchgroup", &["heuristics.ios.dispatchgroup.ast"]),
    heuristic("skills.ios.no-dispatchqueue", "ios.dispatchqueue", &["heuristics.ios.dispatchqueue.ast"]),
    heuristic("skills.ios.no-dispatchsemaphore", "ios.dispatchsemaphore", &["heuristics.ios.dispatchsemaphore.ast"]),
    heuristic("skills.ios.no-force-cast", "ios.force-cast", &["heuristics.ios.force-cast.ast"]),
    heuristic("skills.ios.no-force-try", "ios.force-try", &["heuristics.ios.force-try.ast"]),
    heuristic("skills.ios.no-force-unwrap", "ios.force-unwrap", &["heuristics.ios.force-unwrap.ast"]),
    heuristic("skills.ios.no-navigation-view", "ios.navigation-view", &["heuristics.ios.navigation-view.ast"]),
    heuristic("skills.ios.no-observable-object", "ios.observable-object", &["heuristics.ios.observable-object.ast"]),
    heuristic("skills.ios.no-on-tap-gesture", "ios.on-tap-gesture", &["heuristics.ios.on-tap-gesture.ast"]),
    heuristic("skills.ios.no-operation-queue", "ios.operation-queue", &["heuristics.ios.operation-queue.ast"]),
    heuristic("skills.ios.no-string-format", "ios.string-format", &["heuristics.ios.string-format.ast"]),
    heuristic("skills.ios.no-task-detached", "ios.task-detached", &["heuristics.ios.task-detached.ast"]),
    heuristic("skills.ios.no-uiscreen-main-bounds", "ios.uiscreen-main-bounds", &["heuristics.ios.uiscreen-main-bounds.ast"]),
    heuristic("skills.ios.no-unchecked-sendable", "ios.unchecked-sendable", &["heuristics.ios.unchecked-sendable.ast"]),
];

/// Every binding, ordered by rule id.
pub fn detector_bindings() -> &'static [DetectorBinding] {
    BINDINGS
}

pub fn resolve_detector_binding(rule_id: &str) -> Option<&'static DetectorBinding> {
    BINDINGS
        .binary_search_by(|binding| binding.rule_id.cmp(rule_id))
        .ok()
        .map(|index| &BINDINGS[index])
}
