//! Runloop - a checkpointed execution-loop controller for autonomous agents
//!
//! A controller drives caller-supplied work iteration by iteration until an
//! exit condition is verified, the iteration cap is reached, or the work
//! fails. Progress is checkpointed on a fixed cadence into a two-tier store
//! (fast primary with a durable fallback), and any checkpoint can seed a
//! resumed run.

pub mod checkpoint;
pub mod config;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod id;
pub mod policy;
pub mod runner;

pub use config::{ExitConditionConfig, LoopConfiguration};
pub use domain::{ExitConditionStatus, ExitConditionType, LoopOutcome, LoopPhase, LoopResult};
pub use error::{Result, RunloopError};
pub use runner::{FnWorker, IterationContext, LoopController, Worker};
