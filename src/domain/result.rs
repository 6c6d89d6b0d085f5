//! Loop run result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::condition::ExitConditionStatus;

/// Terminal outcome of a loop run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    /// Every configured exit condition reported Met
    Completed,
    /// The iteration cap was reached with conditions outstanding
    IterationLimit,
    /// An iteration, checkpoint operation, or restore failed
    Error,
}

/// Summary returned from every run, whatever happened inside it.
///
/// Work-function and checkpoint failures surface here as `outcome: Error`
/// with a message; they are never raised past the run boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopResult {
    /// Session this run belonged to
    pub session_id: String,

    /// Agent the session ran on behalf of
    pub agent_name: String,

    /// How the run ended
    pub outcome: LoopOutcome,

    /// Number of iterations that ran to completion. On an error this is the
    /// index of the failing iteration, which equals the count of iterations
    /// that finished before it.
    pub iterations_completed: u32,

    //=== Timing ===
    pub started_at: i64,
    pub finished_at: i64,
    pub duration_ms: u64,

    /// Final snapshot of every configured condition
    pub conditions: Vec<ExitConditionStatus>,

    /// Final caller payload
    pub final_state: Value,

    /// Present when outcome is Error
    pub error_message: Option<String>,
}

impl LoopResult {
    /// Returns true when the run ended with all conditions met
    pub fn is_success(&self) -> bool {
        self.outcome == LoopOutcome::Completed
    }
}
