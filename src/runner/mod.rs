//! Loop execution.
//!
//! `LoopController` drives a session iteration by iteration; `Worker` is the
//! contract the caller's work function implements, and `IterationContext` is
//! the handle each invocation gets on the running loop.

pub mod context;
pub mod controller;

pub use context::{FnWorker, IterationContext, Worker};
pub use controller::{LoopController, LoopControllerBuilder};
