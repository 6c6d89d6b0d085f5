//! ID generation utilities for runloop
//!
//! Provides functions for generating session, checkpoint, and event identifiers.

use rand::Rng;
use uuid::Uuid;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Generate a session ID.
///
/// Sessions are addressed by external stores and may be supplied by callers;
/// generated ones are plain UUID v4 strings.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a checkpoint ID
///
/// Format: `ckpt-{timestamp_ms}-{random_hex}`
/// Example: `ckpt-1738300800123-a1b2`
pub fn generate_checkpoint_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("ckpt-{}-{:04x}", timestamp, random)
}

/// Generate an event ID
///
/// Format: `evt-{timestamp_ms}-{random_hex}`
pub fn generate_event_id() -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("evt-{}-{:04x}", timestamp, random)
}
