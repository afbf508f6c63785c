//! File-name conventions and environment toggles.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PUMUKI_DISABLE_CORE_SKILLS` | Disable the built-in rule layer (`1`, `true`, `yes`, `on`) |

/// Manifest of rule bundles to compile.
pub const SOURCES_MANIFEST_FILE: &str = "skills.sources.json";

/// Compiled lock written at the repository root.
pub const LOCK_FILE: &str = "skills.lock.json";

/// Operator policy.
pub const POLICY_FILE: &str = "skills.policy.json";

/// Where imported custom rules are written.
pub const CUSTOM_RULES_FILE: &str = ".pumuki/custom-rules.json";

/// Lookup order for the custom rules file.
pub const CUSTOM_RULES_FILE_CANDIDATES: [&str; 2] = [CUSTOM_RULES_FILE, "pumuki.custom-rules.json"];

/// Profile documents scraped for `SKILL.md` references when no sources are given.
pub const PROFILE_FILES: [&str; 2] = ["AGENTS.md", "SKILLS.md"];

pub const DISABLE_CORE_SKILLS_ENV: &str = "PUMUKI_DISABLE_CORE_SKILLS";

/// Interpret a boolean-like environment value.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Which lock layers participate in the effective lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerOptions {
    pub include_core: bool,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self { include_core: true }
    }
}

impl LayerOptions {
    /// Build from `PUMUKI_DISABLE_CORE_SKILLS`.
    pub fn from_env() -> Self {
        let disabled = std::env::var(DISABLE_CORE_SKILLS_ENV)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        Self {
            include_core: !disabled,
        }
    }

    pub fn without_core() -> Self {
        Self {
            include_core: false,
        }
    }
}
