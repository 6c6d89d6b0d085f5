//! Exit condition evaluation.
//!
//! Each condition type maps to a verification command that runs in the
//! sandbox. The result is always a status record, never an `Err`: exit code
//! zero means met, nonzero means not met, and anything that prevented a
//! verdict (transport failure, timeout, bad configuration) is recorded as an
//! error state with a diagnostic.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::config::{EvaluationConfig, ExitConditionConfig};
use crate::domain::{ExitConditionStatus, ExitConditionType};
use crate::error::{Result, RunloopError};
use crate::evaluator::sandbox::{ProcessSandbox, Sandbox};

/// Default per-tool timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on recorded tool output, in characters.
pub const DEFAULT_OUTPUT_LIMIT: usize = 2_000;

/// Settings for the evaluator.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Timeout per tool invocation, unless the condition overrides it
    pub timeout: Duration,
    /// Maximum characters of tool output kept on the status record
    pub output_limit: usize,
    /// Directory verification commands run from
    pub working_dir: Option<PathBuf>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TOOL_TIMEOUT,
            output_limit: DEFAULT_OUTPUT_LIMIT,
            working_dir: None,
        }
    }
}

impl From<&EvaluationConfig> for EvaluatorConfig {
    fn from(config: &EvaluationConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.tool_timeout_secs),
            output_limit: config.output_limit,
            working_dir: config.working_dir.clone(),
        }
    }
}

/// Runs verification tools and maps their results onto condition states.
pub struct ExitConditionEvaluator {
    config: EvaluatorConfig,
    sandbox: OnceCell<Arc<dyn Sandbox>>,
}

impl std::fmt::Debug for ExitConditionEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitConditionEvaluator")
            .field("config", &self.config)
            .field("sandbox_ready", &self.sandbox.initialized())
            .finish_non_exhaustive()
    }
}

impl Default for ExitConditionEvaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

impl ExitConditionEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            sandbox: OnceCell::new(),
        }
    }

    /// Use a pre-built sandbox instead of lazily constructing one
    pub fn with_sandbox(config: EvaluatorConfig, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            config,
            sandbox: OnceCell::new_with(Some(sandbox)),
        }
    }

    /// Evaluate one condition at the given iteration.
    ///
    /// The sandbox call is raced against the timeout; on elapse the call is
    /// dropped, which kills the underlying tool rather than leaving it to
    /// finish unobserved.
    pub async fn evaluate(
        &self,
        condition: &ExitConditionConfig,
        iteration: u32,
    ) -> ExitConditionStatus {
        let tool = tool_name(condition);
        let command = match build_command(condition) {
            Ok(command) => command,
            Err(e) => {
                return ExitConditionStatus::errored(
                    condition.condition_type,
                    &tool,
                    &e.to_string(),
                    iteration,
                );
            }
        };

        let timeout = condition
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.timeout);

        tracing::debug!(
            condition = ?condition.condition_type,
            tool = %tool,
            timeout_secs = timeout.as_secs(),
            "evaluating exit condition"
        );

        let sandbox = self.sandbox().await;
        match tokio::time::timeout(timeout, sandbox.execute(&command)).await {
            Ok(Ok(execution)) => ExitConditionStatus::evaluated(
                condition.condition_type,
                &tool,
                execution.exit_code,
                &truncate_output(&execution.output, self.config.output_limit),
                iteration,
            ),
            Ok(Err(e)) => ExitConditionStatus::errored(
                condition.condition_type,
                &tool,
                &e.to_string(),
                iteration,
            ),
            Err(_) => ExitConditionStatus::errored(
                condition.condition_type,
                &tool,
                &format!("verification timed out after {}s", timeout.as_secs()),
                iteration,
            ),
        }
    }

    /// Sandbox client, constructed on first use
    async fn sandbox(&self) -> &Arc<dyn Sandbox> {
        let working_dir = self.config.working_dir.clone();
        self.sandbox
            .get_or_init(|| async move {
                tracing::debug!(working_dir = ?working_dir, "initializing verification sandbox");
                let sandbox = match working_dir {
                    Some(dir) => ProcessSandbox::new().with_working_dir(dir),
                    None => ProcessSandbox::new(),
                };
                Arc::new(sandbox) as Arc<dyn Sandbox>
            })
            .await
    }
}

/// Short tool label recorded on the status for auditability.
fn tool_name(condition: &ExitConditionConfig) -> String {
    match condition.condition_type {
        ExitConditionType::TestsPass => "cargo-test".to_string(),
        ExitConditionType::LintClean => "cargo-clippy".to_string(),
        ExitConditionType::BuildSucceeds => "cargo-build".to_string(),
        ExitConditionType::SecurityScan => "cargo-audit".to_string(),
        ExitConditionType::Custom => condition
            .command
            .as_deref()
            .and_then(|command| command.split_whitespace().next())
            .unwrap_or("custom")
            .to_string(),
    }
}

/// Build the shell command for a condition.
fn build_command(condition: &ExitConditionConfig) -> Result<String> {
    let base = match condition.condition_type {
        ExitConditionType::TestsPass => match &condition.filter {
            Some(filter) => format!("cargo test {filter}"),
            None => "cargo test".to_string(),
        },
        ExitConditionType::LintClean => "cargo clippy --all-targets -- -D warnings".to_string(),
        ExitConditionType::BuildSucceeds => "cargo build".to_string(),
        ExitConditionType::SecurityScan => "cargo audit".to_string(),
        ExitConditionType::Custom => condition
            .command
            .clone()
            .ok_or_else(|| {
                RunloopError::InvalidConfig("custom condition requires a command".to_string())
            })?,
    };

    Ok(match &condition.path {
        Some(path) => format!("cd {} && {}", shell_quote(path), base),
        None => base,
    })
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn truncate_output(output: &str, limit: usize) -> String {
    if output.chars().count() <= limit {
        return output.to_string();
    }
    let mut truncated: String = output.chars().take(limit).collect();
    truncated.push_str("\n... (truncated)");
    truncated
}
