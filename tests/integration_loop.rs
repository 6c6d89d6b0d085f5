//! End-to-end loop execution integration tests
//!
//! Drives real controllers against the durable sqlite checkpoint store.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use runloop::checkpoint::{
    BackendSelection, CheckpointManager, CheckpointStore, MemoryProvisioner, SqliteStore,
    StoreProvisioner,
};
use runloop::config::LoopConfiguration;
use runloop::domain::{ExitConditionType, LoopOutcome, LoopPhase};
use runloop::error::{Result, RunloopError};
use runloop::evaluator::ExitConditionEvaluator;
use runloop::events::EventEmitter;
use runloop::runner::{IterationContext, LoopController, Worker};

/// Worker that increments a counter in the payload every iteration.
struct CounterWorker;

#[async_trait]
impl Worker for CounterWorker {
    async fn execute(&mut self, ctx: &IterationContext<'_>) -> Result<Value> {
        let count = ctx.agent_state()["counter"].as_i64().unwrap_or(0);
        Ok(json!({ "counter": count + 1 }))
    }
}

/// Worker that declares itself done once a target iteration is reached.
struct FinishingWorker {
    done_at: u32,
}

#[async_trait]
impl Worker for FinishingWorker {
    async fn execute(&mut self, ctx: &IterationContext<'_>) -> Result<Value> {
        if ctx.iteration() >= self.done_at {
            ctx.mark_met(ExitConditionType::Custom);
        }
        Ok(json!({ "last": ctx.iteration() }))
    }
}

/// Worker that fails exactly once at a target iteration.
struct FlakyWorker {
    fail_at: u32,
    tripped: bool,
}

#[async_trait]
impl Worker for FlakyWorker {
    async fn execute(&mut self, ctx: &IterationContext<'_>) -> Result<Value> {
        if ctx.iteration() == self.fail_at && !self.tripped {
            self.tripped = true;
            return Err(RunloopError::WorkFunction("transient failure".to_string()));
        }
        if ctx.iteration() >= self.fail_at + 1 {
            ctx.mark_met(ExitConditionType::Custom);
        }
        Ok(json!({ "last": ctx.iteration() }))
    }
}

fn db_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("checkpoints.db")
}

fn durable_controller(temp_dir: &TempDir, config: LoopConfiguration) -> Result<LoopController> {
    let store = SqliteStore::open(db_path(temp_dir))?;
    let manager = CheckpointManager::new(
        "unbound",
        Arc::new(MemoryProvisioner::new()),
        Arc::new(store),
    )
    .with_selection(BackendSelection::ForceFallback);
    LoopController::initialize(
        config,
        manager,
        ExitConditionEvaluator::default(),
        EventEmitter::disabled(),
    )
}

/// Integration test: a counter loop runs to its iteration cap with
/// checkpoints on the configured cadence
#[tokio::test]
async fn test_counter_loop_runs_to_iteration_limit() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let controller = durable_controller(
        &temp_dir,
        LoopConfiguration::new("counter-agent", 5).with_checkpoint_interval(2),
    )?;

    let mut worker = CounterWorker;
    let result = controller
        .run(&mut worker, json!({ "counter": 0 }), None)
        .await?;

    assert_eq!(result.outcome, LoopOutcome::IterationLimit);
    assert_eq!(result.iterations_completed, 5);
    assert_eq!(result.final_state["counter"], 5);
    assert!(result.error_message.is_none());
    assert!(result.finished_at >= result.started_at);

    // floor(5 / 2) interval checkpoints, at iterations 1 and 3
    let listed = controller.list_checkpoints().await?;
    let iterations: Vec<u32> = listed.iter().map(|m| m.iteration).collect();
    assert_eq!(iterations, vec![1, 3]);

    Ok(())
}

/// Integration test: a worker-satisfied exit condition completes the loop
/// before the cap
#[tokio::test]
async fn test_completion_before_iteration_limit() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let controller = durable_controller(
        &temp_dir,
        LoopConfiguration::new("finishing-agent", 50).with_checkpoint_interval(10),
    )?;

    let mut worker = FinishingWorker { done_at: 2 };
    let result = controller.run(&mut worker, Value::Null, None).await?;

    assert_eq!(result.outcome, LoopOutcome::Completed);
    assert_eq!(result.iterations_completed, 3);
    assert!(result.conditions.iter().any(|c| c.is_met()));
    Ok(())
}

/// Integration test: a worker error surfaces in the result, releases the
/// controller, and a re-run on the same controller succeeds
#[tokio::test]
async fn test_worker_error_then_rerun() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let controller = durable_controller(
        &temp_dir,
        LoopConfiguration::new("flaky-agent", 10).with_checkpoint_interval(20),
    )?;

    let mut worker = FlakyWorker {
        fail_at: 2,
        tripped: false,
    };

    let first = controller.run(&mut worker, Value::Null, None).await?;
    assert_eq!(first.outcome, LoopOutcome::Error);
    assert_eq!(first.iterations_completed, 2);
    assert!(
        first
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("transient failure"))
    );
    assert!(!controller.is_active());
    assert_eq!(controller.state().phase, LoopPhase::Error);

    // Same controller, fresh run; the worker no longer trips
    let second = controller.run(&mut worker, Value::Null, None).await?;
    assert_eq!(second.outcome, LoopOutcome::Completed);
    assert_eq!(second.iterations_completed, 4);
    Ok(())
}

/// Integration test: checkpointed state round-trips exactly through sqlite,
/// including nested numeric payloads, across store handles
#[tokio::test]
async fn test_checkpoint_roundtrip_preserves_payload() -> Result<()> {
    struct NestingWorker;

    #[async_trait]
    impl Worker for NestingWorker {
        async fn execute(&mut self, ctx: &IterationContext<'_>) -> Result<Value> {
            Ok(json!({
                "iteration": ctx.iteration(),
                "big": 9007199254740991i64,
                "ratio": 0.0625,
                "trail": ["α", "β", "γ"],
                "nested": { "flags": [true, false], "note": "still going" }
            }))
        }
    }

    let temp_dir = TempDir::new()?;
    let controller = durable_controller(
        &temp_dir,
        LoopConfiguration::new("nesting-agent", 4).with_checkpoint_interval(2),
    )?;
    let session_id = controller.session_id().to_string();

    let mut worker = NestingWorker;
    controller.run(&mut worker, Value::Null, None).await?;

    let snapshot = controller.load_checkpoint(3).await?;
    assert_eq!(snapshot.current_iteration, 3);
    assert_eq!(snapshot.agent_state["big"], 9007199254740991i64);
    assert_eq!(snapshot.agent_state["ratio"], 0.0625);
    assert_eq!(snapshot.agent_state["trail"][2], "γ");
    assert_eq!(snapshot.agent_state["nested"]["flags"][1], false);

    // A completely fresh handle on the same database sees the same bytes
    let reopened = SqliteStore::open(db_path(&temp_dir))?;
    let checkpoint = reopened
        .get(&session_id, 3)
        .await?
        .expect("checkpoint persisted");
    assert_eq!(checkpoint.state, snapshot);
    Ok(())
}

/// Integration test: a new controller resumes from a chosen checkpoint,
/// ignoring the supplied initial state
#[tokio::test]
async fn test_resume_continues_from_checkpoint() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let first = durable_controller(
        &temp_dir,
        LoopConfiguration::new("counter-agent", 6).with_checkpoint_interval(2),
    )?;
    let session_id = first.session_id().to_string();
    let mut worker = CounterWorker;
    let initial = first.run(&mut worker, json!({ "counter": 0 }), None).await?;
    assert_eq!(initial.final_state["counter"], 6);

    // Second controller over the same database and session
    let resumed = durable_controller(
        &temp_dir,
        LoopConfiguration::new("counter-agent", 6)
            .with_checkpoint_interval(2)
            .with_session_id(&session_id),
    )?;
    let result = resumed
        .run(&mut worker, json!({ "counter": -100 }), Some(3))
        .await?;

    // The snapshot at iteration 3 held counter 4; iterations 4 and 5 ran
    assert_eq!(result.outcome, LoopOutcome::IterationLimit);
    assert_eq!(result.iterations_completed, 6);
    assert_eq!(result.final_state["counter"], 6);
    Ok(())
}

/// Integration test: with the primary store unavailable, checkpoints land
/// transparently on the durable fallback
#[tokio::test]
async fn test_primary_failure_falls_back_durably() -> Result<()> {
    struct UnreachableProvisioner {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl StoreProvisioner for UnreachableProvisioner {
        async fn provision(&self, _region: Option<&str>) -> Result<Arc<dyn CheckpointStore>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(RunloopError::Storage("session memory unreachable".to_string()))
        }
    }

    let temp_dir = TempDir::new()?;
    let provisioner = Arc::new(UnreachableProvisioner {
        attempts: AtomicU32::new(0),
    });
    let manager = CheckpointManager::new(
        "unbound",
        Arc::clone(&provisioner) as Arc<dyn StoreProvisioner>,
        Arc::new(SqliteStore::open(db_path(&temp_dir))?),
    );
    let controller = LoopController::initialize(
        LoopConfiguration::new("fallback-agent", 3).with_checkpoint_interval(1),
        manager,
        ExitConditionEvaluator::default(),
        EventEmitter::disabled(),
    )?;
    let session_id = controller.session_id().to_string();

    let mut worker = CounterWorker;
    let result = controller.run(&mut worker, json!({}), None).await?;
    assert_eq!(result.outcome, LoopOutcome::IterationLimit);

    // Provisioning was tried once, then the decision stuck
    assert_eq!(provisioner.attempts.load(Ordering::SeqCst), 1);

    // Every interval checkpoint is readable straight off the fallback
    let direct = SqliteStore::open(db_path(&temp_dir))?;
    let iterations: Vec<u32> = direct
        .list(&session_id)
        .await?
        .iter()
        .map(|m| m.iteration)
        .collect();
    assert_eq!(iterations, vec![0, 1, 2]);
    Ok(())
}

/// Integration test: checkpoints stranded on the fallback stay reachable
/// for resume once a healthy but empty primary is back
#[tokio::test]
async fn test_resume_reads_fallback_after_primary_recovers() -> Result<()> {
    let temp_dir = TempDir::new()?;

    // First run: primary out of the picture, checkpoints land on sqlite
    let first = durable_controller(
        &temp_dir,
        LoopConfiguration::new("counter-agent", 6).with_checkpoint_interval(2),
    )?;
    let session_id = first.session_id().to_string();
    let mut worker = CounterWorker;
    first.run(&mut worker, json!({ "counter": 0 }), None).await?;

    // Second run: provisioning succeeds, but the fresh primary holds nothing
    let manager = CheckpointManager::new(
        "unbound",
        Arc::new(MemoryProvisioner::new()),
        Arc::new(SqliteStore::open(db_path(&temp_dir))?),
    );
    let resumed = LoopController::initialize(
        LoopConfiguration::new("counter-agent", 6)
            .with_checkpoint_interval(2)
            .with_session_id(&session_id),
        manager,
        ExitConditionEvaluator::default(),
        EventEmitter::disabled(),
    )?;
    let result = resumed
        .run(&mut worker, json!({ "counter": -100 }), Some(3))
        .await?;

    // The iteration-3 snapshot held counter 4; iterations 4 and 5 ran
    assert_eq!(result.outcome, LoopOutcome::IterationLimit);
    assert_eq!(result.iterations_completed, 6);
    assert_eq!(result.final_state["counter"], 6);
    Ok(())
}

/// Integration test: a second run while one is in flight is rejected
/// without disturbing the running session
#[tokio::test]
async fn test_concurrent_run_rejected() -> Result<()> {
    struct SlowFinishingWorker;

    #[async_trait]
    impl Worker for SlowFinishingWorker {
        async fn execute(&mut self, ctx: &IterationContext<'_>) -> Result<Value> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            ctx.mark_met(ExitConditionType::Custom);
            Ok(json!({ "finished_at": ctx.iteration() }))
        }
    }

    let temp_dir = TempDir::new()?;
    let controller = Arc::new(durable_controller(
        &temp_dir,
        LoopConfiguration::new("slow-agent", 5).with_checkpoint_interval(10),
    )?);

    let background = Arc::clone(&controller);
    let in_flight = tokio::spawn(async move {
        let mut worker = SlowFinishingWorker;
        background.run(&mut worker, Value::Null, None).await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(controller.is_active());

    let mut intruder = CounterWorker;
    let rejection = controller
        .run(&mut intruder, Value::Null, None)
        .await
        .unwrap_err();
    assert!(matches!(rejection, RunloopError::AlreadyRunning(_)));

    let result = in_flight.await.expect("task join")?;
    assert_eq!(result.outcome, LoopOutcome::Completed);
    assert_eq!(result.final_state["finished_at"], 0);
    assert!(!controller.is_active());
    Ok(())
}
