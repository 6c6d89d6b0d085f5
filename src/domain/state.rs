//! Loop session state and lifecycle phases.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::condition::{ConditionState, ExitConditionStatus, ExitConditionType};
use crate::id::now_ms;

/// Lifecycle phase of a loop session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopPhase {
    /// Configured but not yet driven
    Initializing,
    /// Actively executing iterations
    Running,
    /// Persisting an interval checkpoint
    Checkpointing,
    /// Conditions satisfied or cap reached, finalizing
    Completing,
    /// Finished normally
    Completed,
    /// Finished with an unrecoverable failure
    Error,
}

impl LoopPhase {
    /// Returns true if the session is in a terminal phase
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Completed | LoopPhase::Error)
    }
}

/// Mutable state of a loop session.
///
/// The controller owns one of these behind a lock. Full clones are
/// snapshotted into checkpoints and restored wholesale on resume, so every
/// field here must survive a serialization round-trip exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    //=== Identity ===
    /// Session identifier (UUID v4 unless supplied by the caller)
    pub session_id: String,

    /// Agent this session runs on behalf of
    pub agent_name: String,

    //=== Progress ===
    /// Current iteration number (0-indexed)
    pub current_iteration: u32,

    /// Hard iteration cap for this session
    pub max_iterations: u32,

    /// Current lifecycle phase
    pub phase: LoopPhase,

    //=== Conditions ===
    /// Exit condition statuses, ordered as configured
    pub conditions: Vec<ExitConditionStatus>,

    //=== Payload ===
    /// Opaque caller-owned state carried across iterations
    pub agent_state: Value,

    //=== Runtime ===
    /// True while a run() call is driving this session
    pub active: bool,

    //=== Timestamps ===
    pub started_at: i64,
    pub last_iteration_at: Option<i64>,
}

impl LoopState {
    /// Create a fresh session state in the Initializing phase
    pub fn new(
        session_id: &str,
        agent_name: &str,
        max_iterations: u32,
        conditions: Vec<ExitConditionStatus>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            agent_name: agent_name.to_string(),
            current_iteration: 0,
            max_iterations,
            phase: LoopPhase::Initializing,
            conditions,
            agent_state: Value::Null,
            active: false,
            started_at: now_ms(),
            last_iteration_at: None,
        }
    }

    /// Number of conditions currently Met
    pub fn met_count(&self) -> usize {
        self.conditions
            .iter()
            .filter(|c| c.status == ConditionState::Met)
            .count()
    }

    /// True when at least one condition is configured and every one is Met.
    ///
    /// An empty condition list never reports satisfied; such sessions run to
    /// the iteration cap.
    pub fn all_conditions_met(&self) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.is_met())
    }

    /// Look up the status for a condition type, if configured
    pub fn condition(&self, condition_type: ExitConditionType) -> Option<&ExitConditionStatus> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Replace the status for a condition type, appending if absent
    pub fn set_condition(&mut self, status: ExitConditionStatus) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == status.condition_type)
        {
            Some(existing) => *existing = status,
            None => self.conditions.push(status),
        }
    }
}
