//! Process exit codes. Part of the CLI contract used by git hooks and CI.

pub const SUCCESS: i32 = 0;
pub const GATE_FAILED: i32 = 1; // Gate blocked or lock not fresh
pub const CONFIG_ERROR: i32 = 2; // Unreadable repo, manifest or facts
