//! Domain types for runloop
//!
//! This module contains all core domain types:
//! - LoopState / LoopPhase: mutable session state and its lifecycle
//! - ExitConditionStatus: per-condition evaluation records
//! - LoopResult / LoopOutcome: what a finished run reports
//! - EventRecord: audit/history events

pub mod condition;
pub mod event;
pub mod result;
pub mod state;

pub use condition::{ConditionState, ExitConditionStatus, ExitConditionType};
pub use event::{EventRecord, event_types};
pub use result::{LoopOutcome, LoopResult};
pub use state::{LoopPhase, LoopState};
