//! Event record types for observability.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::result::LoopOutcome;
use crate::domain::state::LoopPhase;
use crate::id::{generate_event_id, now_ms};

/// Event type constants
pub mod event_types {
    pub const LOOP_INITIALIZED: &str = "loop.initialized";
    pub const PHASE_CHANGE: &str = "phase.change";
    pub const ITERATION_STARTED: &str = "iteration.started";
    pub const ITERATION_COMPLETED: &str = "iteration.completed";
    pub const CHECKPOINT_SAVED: &str = "checkpoint.saved";
    pub const LOOP_COMPLETED: &str = "loop.completed";
    pub const LOOP_FAILED: &str = "loop.failed";
}

/// General-purpose event log for observability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// Unique event identifier
    pub id: String,
    /// Event type (e.g., "iteration.started", "checkpoint.saved")
    pub event_type: String,
    /// Session the event belongs to
    pub session_id: String,
    /// Iteration the event happened at (if any)
    pub iteration: Option<u32>,
    /// Lifecycle phase at emission time (if relevant)
    pub phase: Option<LoopPhase>,
    /// Event-specific payload data
    pub payload: Value,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

impl EventRecord {
    /// Create a new event with the given type and payload
    pub fn new(
        event_type: &str,
        session_id: &str,
        iteration: Option<u32>,
        phase: Option<LoopPhase>,
        payload: Value,
    ) -> Self {
        Self {
            id: generate_event_id(),
            event_type: event_type.to_string(),
            session_id: session_id.to_string(),
            iteration,
            phase,
            payload,
            created_at: now_ms(),
        }
    }

    /// Create a loop.initialized event
    pub fn loop_initialized(session_id: &str, agent_name: &str, condition_count: usize) -> Self {
        Self::new(
            event_types::LOOP_INITIALIZED,
            session_id,
            None,
            Some(LoopPhase::Initializing),
            serde_json::json!({
                "agent_name": agent_name,
                "condition_count": condition_count
            }),
        )
    }

    /// Create a phase.change event
    pub fn phase_change(session_id: &str, iteration: u32, from: LoopPhase, to: LoopPhase) -> Self {
        Self::new(
            event_types::PHASE_CHANGE,
            session_id,
            Some(iteration),
            Some(to),
            serde_json::json!({ "from": from, "to": to }),
        )
    }

    /// Create an iteration.started event
    pub fn iteration_started(session_id: &str, iteration: u32) -> Self {
        Self::new(
            event_types::ITERATION_STARTED,
            session_id,
            Some(iteration),
            Some(LoopPhase::Running),
            Value::Null,
        )
    }

    /// Create an iteration.completed event
    pub fn iteration_completed(
        session_id: &str,
        iteration: u32,
        duration_ms: u64,
        met: usize,
        total: usize,
    ) -> Self {
        Self::new(
            event_types::ITERATION_COMPLETED,
            session_id,
            Some(iteration),
            Some(LoopPhase::Running),
            serde_json::json!({
                "duration_ms": duration_ms,
                "conditions_met": met,
                "conditions_total": total
            }),
        )
    }

    /// Create a checkpoint.saved event
    pub fn checkpoint_saved(
        session_id: &str,
        iteration: u32,
        checkpoint_id: &str,
        backend: &str,
    ) -> Self {
        Self::new(
            event_types::CHECKPOINT_SAVED,
            session_id,
            Some(iteration),
            Some(LoopPhase::Checkpointing),
            serde_json::json!({
                "checkpoint_id": checkpoint_id,
                "backend": backend
            }),
        )
    }

    /// Create a loop.completed event
    pub fn loop_completed(session_id: &str, outcome: LoopOutcome, iterations: u32) -> Self {
        Self::new(
            event_types::LOOP_COMPLETED,
            session_id,
            Some(iterations.saturating_sub(1)),
            Some(LoopPhase::Completed),
            serde_json::json!({
                "outcome": outcome,
                "iterations_completed": iterations
            }),
        )
    }

    /// Create a loop.failed event
    pub fn loop_failed(session_id: &str, iteration: u32, reason: &str) -> Self {
        Self::new(
            event_types::LOOP_FAILED,
            session_id,
            Some(iteration),
            Some(LoopPhase::Error),
            serde_json::json!({ "reason": reason }),
        )
    }

    /// Check if this event ends a session
    pub fn is_terminal(&self) -> bool {
        self.event_type == event_types::LOOP_COMPLETED
            || self.event_type == event_types::LOOP_FAILED
    }
}
