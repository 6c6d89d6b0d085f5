//! The work function contract and its view of the running loop.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{ExitConditionStatus, ExitConditionType};
use crate::error::Result;
use crate::runner::controller::LoopController;

/// One unit of agent work, invoked once per iteration.
///
/// The returned value becomes the session's agent-state payload for the next
/// iteration. An `Err` aborts the loop; the controller converts it into a
/// structured error result rather than propagating it.
#[async_trait]
pub trait Worker: Send {
    async fn execute(&mut self, ctx: &IterationContext<'_>) -> Result<Value>;
}

/// Adapter turning a plain closure into a [`Worker`].
///
/// The closure runs synchronously inside the iteration. Work that needs to
/// await context operations such as [`IterationContext::save_checkpoint`]
/// implements [`Worker`] directly.
pub struct FnWorker<F> {
    work: F,
}

impl<F> FnWorker<F>
where
    F: FnMut(&IterationContext<'_>) -> Result<Value> + Send,
{
    pub fn new(work: F) -> Self {
        Self { work }
    }
}

#[async_trait]
impl<F> Worker for FnWorker<F>
where
    F: FnMut(&IterationContext<'_>) -> Result<Value> + Send,
{
    async fn execute(&mut self, ctx: &IterationContext<'_>) -> Result<Value> {
        (self.work)(ctx)
    }
}

/// The work function's handle on the loop that is driving it.
///
/// All synchronous accessors take the state lock briefly; the async
/// operations delegate to the controller and may touch storage or the
/// verification sandbox.
pub struct IterationContext<'a> {
    controller: &'a LoopController,
    iteration: u32,
}

impl<'a> IterationContext<'a> {
    pub(crate) fn new(controller: &'a LoopController, iteration: u32) -> Self {
        Self {
            controller,
            iteration,
        }
    }

    /// Iteration currently executing (0-indexed)
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Session this iteration belongs to
    pub fn session_id(&self) -> &str {
        self.controller.session_id()
    }

    /// Snapshot of the current agent-state payload
    pub fn agent_state(&self) -> Value {
        self.controller.lock_state().agent_state.clone()
    }

    /// Snapshot of all exit condition statuses
    pub fn conditions(&self) -> Vec<ExitConditionStatus> {
        self.controller.lock_state().conditions.clone()
    }

    /// Replace a condition's status directly, bypassing the evaluator
    pub fn set_condition(&self, status: ExitConditionStatus) {
        self.controller.lock_state().set_condition(status);
    }

    /// Mark a condition met on the work function's own authority
    pub fn mark_met(&self, condition_type: ExitConditionType) {
        self.set_condition(ExitConditionStatus::evaluated(
            condition_type,
            "worker",
            0,
            "marked met by work function",
            self.iteration,
        ));
    }

    /// Persist a checkpoint now, outside the interval cadence.
    ///
    /// `custom_data` is shallow-merged into the snapshot's agent-state
    /// payload; the live payload is left untouched.
    pub async fn save_checkpoint(&self, custom_data: Option<Value>) -> Result<String> {
        self.controller.save_checkpoint(custom_data).await
    }

    /// Re-run the evaluator over the configured conditions.
    ///
    /// With `force` false, conditions already met keep their status; with
    /// `force` true every condition is re-verified and a met condition can
    /// regress.
    pub async fn evaluate_conditions(&self, force: bool) -> Vec<ExitConditionStatus> {
        self.controller.refresh_conditions(self.iteration, force).await
    }
}
