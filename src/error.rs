//! Error types for runloop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in runloop
#[derive(Debug, Error)]
pub enum RunloopError {
    /// Malformed loop configuration, reported at initialize
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `run` called while a run is already in flight on this controller
    #[error("Loop already running for session {0}")]
    AlreadyRunning(String),

    /// Both checkpoint tiers failed, or the requested iteration is missing
    #[error("Checkpoint recovery failed for session {session_id}: {reason}")]
    CheckpointRecovery { session_id: String, reason: String },

    /// Iteration-limit policy oracle denied the iteration
    #[error("Policy violation for agent {agent}: {reason}")]
    PolicyViolation { agent: String, reason: String },

    /// Sandbox transport failure (spawn error, malformed response)
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Storage/persistence error at the backend level
    #[error("Storage error: {0}")]
    Storage(String),

    /// Work-function failure surfaced through the loop boundary
    #[error("Work function error: {0}")]
    WorkFunction(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error from the durable checkpoint store
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type alias for runloop operations
pub type Result<T> = std::result::Result<T, RunloopError>;
