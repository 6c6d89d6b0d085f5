//! Command execution for condition verification.
//!
//! Verification tools run through the [`Sandbox`] trait so evaluation can be
//! pointed at a remote execution service or a test double. The default
//! implementation shells out on the local host.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Result, RunloopError};

/// Outcome of one sandboxed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Process exit code (-1 when the process was killed by a signal)
    pub exit_code: i32,
    /// Combined stdout and stderr
    pub output: String,
}

/// Where verification commands run.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run a shell command to completion and capture its output.
    ///
    /// A nonzero exit code is not an error here; `Err` means the command
    /// could not be run at all.
    async fn execute(&self, command: &str) -> Result<Execution>;
}

/// Sandbox that runs commands on the local host via `sh -c`.
pub struct ProcessSandbox {
    working_dir: Option<PathBuf>,
}

impl ProcessSandbox {
    pub fn new() -> Self {
        Self { working_dir: None }
    }

    /// Run commands from the given directory instead of the process cwd
    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn execute(&self, command: &str) -> Result<Execution> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        // The child must die with the future when a caller's timeout drops us
        cmd.kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| RunloopError::Sandbox(format!("failed to start '{command}': {e}")))?;
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RunloopError::Sandbox(format!("failed to run '{command}': {e}")))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(stderr.trim_end());
        }

        Ok(Execution {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}
