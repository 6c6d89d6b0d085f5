//! The execution-loop controller.
//!
//! One controller drives one logical loop: it invokes the work function once
//! per iteration, persists interval checkpoints, polls exit conditions, and
//! always hands back a structured [`LoopResult`]. The only error `run`
//! itself returns is the re-entry rejection; everything that goes wrong
//! inside the loop is absorbed into the result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::Mutex as TokioMutex;

use crate::checkpoint::{
    BackendSelection, CheckpointManager, CheckpointMetadata, MemoryProvisioner, MemoryStore,
};
use crate::config::LoopConfiguration;
use crate::domain::{
    EventRecord, ExitConditionStatus, LoopOutcome, LoopPhase, LoopResult, LoopState,
};
use crate::error::{Result, RunloopError};
use crate::evaluator::ExitConditionEvaluator;
use crate::events::EventEmitter;
use crate::id::{generate_session_id, now_ms};
use crate::runner::context::{IterationContext, Worker};

/// Drives a single loop session.
pub struct LoopController {
    session_id: String,
    config: LoopConfiguration,
    /// Held only for short synchronous sections, never across an await
    state: Mutex<LoopState>,
    checkpoints: TokioMutex<CheckpointManager>,
    evaluator: ExitConditionEvaluator,
    emitter: EventEmitter,
    active: AtomicBool,
}

impl std::fmt::Debug for LoopController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopController")
            .field("session_id", &self.session_id)
            .field("agent_name", &self.config.agent_name)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl LoopController {
    /// Construct a controller from validated configuration.
    ///
    /// Pure construction: generates a session id if none was supplied and
    /// builds pending statuses for every configured condition, without
    /// touching storage or the sandbox. Fails only on invalid configuration.
    pub fn initialize(
        config: LoopConfiguration,
        mut checkpoints: CheckpointManager,
        evaluator: ExitConditionEvaluator,
        emitter: EventEmitter,
    ) -> Result<Self> {
        config.validate()?;

        let session_id = config
            .session_id
            .clone()
            .unwrap_or_else(generate_session_id);
        checkpoints.bind_session(&session_id);
        if let Some(region) = config.region.as_deref() {
            checkpoints = checkpoints.with_region(region);
        }

        let conditions = config
            .exit_conditions
            .iter()
            .map(|c| ExitConditionStatus::pending(c.condition_type))
            .collect();
        let state = LoopState::new(
            &session_id,
            &config.agent_name,
            config.max_iterations,
            conditions,
        );

        tracing::info!(
            session = %session_id,
            agent = %config.agent_name,
            max_iterations = config.max_iterations,
            checkpoint_interval = config.checkpoint_interval,
            "loop initialized"
        );
        emitter.emit(EventRecord::loop_initialized(
            &session_id,
            &config.agent_name,
            config.exit_conditions.len(),
        ));

        Ok(Self {
            session_id,
            config,
            state: Mutex::new(state),
            checkpoints: TokioMutex::new(checkpoints),
            evaluator,
            emitter,
            active: AtomicBool::new(false),
        })
    }

    /// Start building a controller with default collaborators
    pub fn builder(config: LoopConfiguration) -> LoopControllerBuilder {
        LoopControllerBuilder::new(config)
    }

    /// Session this controller drives
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// True while a `run` call is in flight
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Snapshot of the current session state
    pub fn state(&self) -> LoopState {
        self.lock_state().clone()
    }

    /// Snapshot of the current exit condition statuses
    pub fn condition_statuses(&self) -> Vec<ExitConditionStatus> {
        self.lock_state().conditions.clone()
    }

    /// Drive the loop to an outcome.
    ///
    /// Without `resume_from`, the session restarts cleanly: iteration 0,
    /// `initial_state` as the payload, all conditions pending. With
    /// `resume_from`, that iteration's checkpoint replaces the state
    /// wholesale (ignoring `initial_state`) and execution continues at the
    /// following iteration.
    ///
    /// The only `Err` this returns is [`RunloopError::AlreadyRunning`];
    /// every other failure is reported inside the returned result.
    pub async fn run<W>(
        &self,
        worker: &mut W,
        initial_state: Value,
        resume_from: Option<u32>,
    ) -> Result<LoopResult>
    where
        W: Worker + ?Sized,
    {
        let _guard = ActiveGuard::acquire(&self.active)
            .ok_or_else(|| RunloopError::AlreadyRunning(self.session_id.clone()))?;

        let started_at = now_ms();
        self.lock_state().active = true;

        let driven = self.drive(worker, initial_state, resume_from).await;
        let finished_at = now_ms();

        let (outcome, iterations_completed, error_message) = match driven {
            Ok((outcome, iterations)) => (outcome, iterations, None),
            Err(e) => {
                tracing::error!(session = %self.session_id, error = %e, "loop run failed");
                let failing = self.lock_state().current_iteration;
                (LoopOutcome::Error, failing, Some(e.to_string()))
            }
        };

        self.set_phase(match outcome {
            LoopOutcome::Error => LoopPhase::Error,
            _ => LoopPhase::Completed,
        });

        let (conditions, final_state) = {
            let mut state = self.lock_state();
            state.active = false;
            (state.conditions.clone(), state.agent_state.clone())
        };

        match outcome {
            LoopOutcome::Error => self.emitter.emit(EventRecord::loop_failed(
                &self.session_id,
                iterations_completed,
                error_message.as_deref().unwrap_or("unknown"),
            )),
            _ => self.emitter.emit(EventRecord::loop_completed(
                &self.session_id,
                outcome,
                iterations_completed,
            )),
        }

        tracing::info!(
            session = %self.session_id,
            outcome = ?outcome,
            iterations = iterations_completed,
            duration_ms = (finished_at - started_at).max(0),
            "loop finished"
        );

        Ok(LoopResult {
            session_id: self.session_id.clone(),
            agent_name: self.config.agent_name.clone(),
            outcome,
            iterations_completed,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).max(0) as u64,
            conditions,
            final_state,
            error_message,
        })
    }

    /// Persist a checkpoint of the current state, outside the cadence.
    ///
    /// `custom_data` is merged into the snapshot payload only; the live
    /// state keeps its payload unchanged.
    pub async fn save_checkpoint(&self, custom_data: Option<Value>) -> Result<String> {
        let snapshot = {
            let state = self.lock_state();
            let mut snapshot = state.clone();
            if let Some(custom) = custom_data {
                merge_custom(&mut snapshot.agent_state, custom);
            }
            snapshot
        };

        let mut checkpoints = self.checkpoints.lock().await;
        let checkpoint_id = checkpoints.save(&snapshot).await?;
        self.emitter.emit(EventRecord::checkpoint_saved(
            &self.session_id,
            snapshot.current_iteration,
            &checkpoint_id,
            checkpoints.backend_name(),
        ));
        Ok(checkpoint_id)
    }

    /// Load the state snapshotted at a specific iteration, without
    /// disturbing the live session
    pub async fn load_checkpoint(&self, iteration: u32) -> Result<LoopState> {
        self.checkpoints.lock().await.load(iteration).await
    }

    /// Load the newest snapshot for this session, if any
    pub async fn latest_checkpoint(&self) -> Result<Option<LoopState>> {
        self.checkpoints.lock().await.load_latest().await
    }

    /// Metadata for every checkpoint of this session, ascending by iteration
    pub async fn list_checkpoints(&self) -> Result<Vec<CheckpointMetadata>> {
        self.checkpoints.lock().await.list().await
    }

    /// The loop proper; any `Err` out of here becomes an error result.
    async fn drive<W>(
        &self,
        worker: &mut W,
        initial_state: Value,
        resume_from: Option<u32>,
    ) -> Result<(LoopOutcome, u32)>
    where
        W: Worker + ?Sized,
    {
        match resume_from {
            Some(iteration) => {
                let snapshot = {
                    let mut checkpoints = self.checkpoints.lock().await;
                    checkpoints.load(iteration).await?
                };
                tracing::info!(
                    session = %self.session_id,
                    iteration,
                    "restored state from checkpoint"
                );
                let mut state = self.lock_state();
                *state = snapshot;
                state.current_iteration = iteration + 1;
                state.active = true;
            }
            None => {
                let mut state = self.lock_state();
                state.current_iteration = 0;
                state.agent_state = initial_state;
                state.conditions = self
                    .config
                    .exit_conditions
                    .iter()
                    .map(|c| ExitConditionStatus::pending(c.condition_type))
                    .collect();
            }
        }
        self.set_phase(LoopPhase::Running);

        let checkpoint_interval = self.config.checkpoint_interval;

        loop {
            let iteration = {
                let state = self.lock_state();
                if state.current_iteration >= state.max_iterations {
                    break;
                }
                state.current_iteration
            };

            // 1. Iteration opens
            self.emitter
                .emit(EventRecord::iteration_started(&self.session_id, iteration));
            let iteration_start = Instant::now();

            // 2. Work function; its return value becomes the payload
            let context = IterationContext::new(self, iteration);
            let next_state = worker.execute(&context).await?;
            {
                let mut state = self.lock_state();
                state.agent_state = next_state;
                state.last_iteration_at = Some(now_ms());
            }

            // 3. Iteration closes
            let (met, total) = {
                let state = self.lock_state();
                (state.met_count(), state.conditions.len())
            };
            self.emitter.emit(EventRecord::iteration_completed(
                &self.session_id,
                iteration,
                iteration_start.elapsed().as_millis() as u64,
                met,
                total,
            ));

            // 4. Interval checkpoint; a failed save fails the loop
            if (iteration + 1) % checkpoint_interval == 0 {
                self.set_phase(LoopPhase::Checkpointing);
                self.save_checkpoint(None).await?;
                self.set_phase(LoopPhase::Running);
            }

            // 5. Re-verify anything not already met, then check termination
            self.refresh_conditions(iteration, false).await;
            if self.lock_state().all_conditions_met() {
                self.set_phase(LoopPhase::Completing);
                return Ok((LoopOutcome::Completed, iteration + 1));
            }

            self.lock_state().current_iteration += 1;
        }

        self.set_phase(LoopPhase::Completing);
        let max_iterations = self.lock_state().max_iterations;
        Ok((LoopOutcome::IterationLimit, max_iterations))
    }

    /// Run the evaluator over the configured conditions and fold the
    /// results into the session state.
    ///
    /// Met conditions are skipped unless `force` is set; forcing allows a
    /// met condition to regress.
    pub(crate) async fn refresh_conditions(
        &self,
        iteration: u32,
        force: bool,
    ) -> Vec<ExitConditionStatus> {
        let mut refreshed = Vec::new();
        for condition in &self.config.exit_conditions {
            let current = {
                let state = self.lock_state();
                state.condition(condition.condition_type).cloned()
            };
            let status = match current {
                Some(status) if status.is_met() && !force => status,
                _ => self.evaluator.evaluate(condition, iteration).await,
            };
            refreshed.push(status);
        }

        {
            let mut state = self.lock_state();
            for status in &refreshed {
                state.set_condition(status.clone());
            }
        }
        refreshed
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_phase(&self, next: LoopPhase) {
        let transition = {
            let mut state = self.lock_state();
            let previous = state.phase;
            if previous == next {
                None
            } else {
                state.phase = next;
                Some((state.current_iteration, previous))
            }
        };
        if let Some((iteration, previous)) = transition {
            self.emitter.emit(EventRecord::phase_change(
                &self.session_id,
                iteration,
                previous,
                next,
            ));
        }
    }
}

/// Builder wiring a controller to its collaborators, with in-memory
/// defaults for everything not supplied.
pub struct LoopControllerBuilder {
    config: LoopConfiguration,
    checkpoints: Option<CheckpointManager>,
    evaluator: Option<ExitConditionEvaluator>,
    emitter: Option<EventEmitter>,
}

impl LoopControllerBuilder {
    fn new(config: LoopConfiguration) -> Self {
        Self {
            config,
            checkpoints: None,
            evaluator: None,
            emitter: None,
        }
    }

    pub fn checkpoints(mut self, manager: CheckpointManager) -> Self {
        self.checkpoints = Some(manager);
        self
    }

    pub fn evaluator(mut self, evaluator: ExitConditionEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn build(self) -> Result<LoopController> {
        let checkpoints = self.checkpoints.unwrap_or_else(|| {
            // Session id is rebound by initialize
            CheckpointManager::new(
                "unbound",
                Arc::new(MemoryProvisioner::new()),
                Arc::new(MemoryStore::new()),
            )
            .with_selection(BackendSelection::Auto)
        });
        LoopController::initialize(
            self.config,
            checkpoints,
            self.evaluator.unwrap_or_default(),
            self.emitter.unwrap_or_else(EventEmitter::disabled),
        )
    }
}

/// Scoped hold on the re-entry flag; cleared on every exit path.
struct ActiveGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ActiveGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then_some(Self { flag })
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Fold worker-supplied data into a snapshot payload.
fn merge_custom(agent_state: &mut Value, custom: Value) {
    match custom {
        Value::Object(extra) => match agent_state.as_object_mut() {
            Some(map) => {
                for (key, value) in extra {
                    map.insert(key, value);
                }
            }
            None => *agent_state = Value::Object(extra),
        },
        other => match agent_state.as_object_mut() {
            Some(map) => {
                map.insert("custom".to_string(), other);
            }
            None => *agent_state = serde_json::json!({ "custom": other }),
        },
    }
}
