use serde::Serialize;

use crate::bytecode::format::ScriptPtr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStatus {
    Running,
    /// Waiting on the primary delay counter, a looping call or an opcode beyond the table.
    Paused,
    /// Waiting on the secondary delay counter (`SLEEP_BEFORE_EXIT`).
    PausedSecondary,
    /// A top-level `EXIT` ended the script.
    Exited,
}

/// Per-interpreter execution state.
///
/// The register and the delay counters survive between `execute` calls so a sleeping script
/// resumes where it left off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    pub cursor: Option<ScriptPtr>,
    pub register: i32,
    pub status: ScriptStatus,
    pub delay_primary: i32,
    pub delay_secondary: i32,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            cursor: None,
            register: 0,
            status: ScriptStatus::Paused,
            delay_primary: 0,
            delay_secondary: 0,
        }
    }
}
