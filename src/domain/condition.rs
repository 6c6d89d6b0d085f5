//! Exit condition types and evaluation status records.

use serde::{Deserialize, Serialize};

use crate::id::now_ms;

/// Kind of external verification backing an exit condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitConditionType {
    /// Test suite passes
    TestsPass,
    /// Linter reports no findings
    LintClean,
    /// Build completes
    BuildSucceeds,
    /// Security scanner reports no findings
    SecurityScan,
    /// Caller-supplied verification command
    Custom,
}

/// Evaluation state of a single exit condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionState {
    /// Not yet evaluated
    Pending,
    /// Verification tool reported success
    Met,
    /// Verification tool reported failure
    NotMet,
    /// The evaluation itself failed (timeout, spawn error)
    Error,
}

/// Recorded outcome of the most recent evaluation of one exit condition.
///
/// Every evaluation fills in the tool, iteration, and timestamp fields,
/// whichever of the three result shapes it lands on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitConditionStatus {
    /// Which condition this status tracks
    pub condition_type: ExitConditionType,

    /// Current evaluation state
    pub status: ConditionState,

    /// Command line the evaluator last ran
    pub last_tool: Option<String>,

    /// Exit code from the last tool run (absent on timeout/spawn failure)
    pub last_exit_code: Option<i32>,

    /// Tool output from the last run, truncated to the evaluator's limit
    pub last_output: Option<String>,

    /// Diagnostic when the evaluation itself failed
    pub last_error: Option<String>,

    /// Iteration at which the last evaluation happened
    pub evaluated_at_iteration: Option<u32>,

    /// Unix timestamp (ms) of the last evaluation
    pub evaluated_at: Option<i64>,
}

impl ExitConditionStatus {
    /// Create a pending status for a configured condition
    pub fn pending(condition_type: ExitConditionType) -> Self {
        Self {
            condition_type,
            status: ConditionState::Pending,
            last_tool: None,
            last_exit_code: None,
            last_output: None,
            last_error: None,
            evaluated_at_iteration: None,
            evaluated_at: None,
        }
    }

    /// Record a tool verdict: exit 0 maps to Met, anything else to NotMet
    pub fn evaluated(
        condition_type: ExitConditionType,
        tool: &str,
        exit_code: i32,
        output: &str,
        iteration: u32,
    ) -> Self {
        let status = if exit_code == 0 {
            ConditionState::Met
        } else {
            ConditionState::NotMet
        };
        Self {
            condition_type,
            status,
            last_tool: Some(tool.to_string()),
            last_exit_code: Some(exit_code),
            last_output: Some(output.to_string()),
            last_error: None,
            evaluated_at_iteration: Some(iteration),
            evaluated_at: Some(now_ms()),
        }
    }

    /// Record an evaluation failure (timeout or transport error)
    pub fn errored(
        condition_type: ExitConditionType,
        tool: &str,
        error: &str,
        iteration: u32,
    ) -> Self {
        Self {
            condition_type,
            status: ConditionState::Error,
            last_tool: Some(tool.to_string()),
            last_exit_code: None,
            last_output: None,
            last_error: Some(error.to_string()),
            evaluated_at_iteration: Some(iteration),
            evaluated_at: Some(now_ms()),
        }
    }

    /// Returns true when this condition no longer blocks completion
    pub fn is_met(&self) -> bool {
        self.status == ConditionState::Met
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_has_no_evaluation_fields() {
        let status = ExitConditionStatus::pending(ExitConditionType::TestsPass);
        assert_eq!(status.status, ConditionState::Pending);
        assert!(status.last_tool.is_none());
        assert!(status.last_exit_code.is_none());
        assert!(status.last_output.is_none());
        assert!(status.last_error.is_none());
        assert!(status.evaluated_at_iteration.is_none());
        assert!(status.evaluated_at.is_none());
        assert!(!status.is_met());
    }

    #[test]
    fn test_evaluated_zero_exit_is_met() {
        let status =
            ExitConditionStatus::evaluated(ExitConditionType::TestsPass, "cargo test", 0, "ok", 3);
        assert_eq!(status.status, ConditionState::Met);
        assert_eq!(status.last_tool.as_deref(), Some("cargo test"));
        assert_eq!(status.last_exit_code, Some(0));
        assert_eq!(status.last_output.as_deref(), Some("ok"));
        assert!(status.last_error.is_none());
        assert_eq!(status.evaluated_at_iteration, Some(3));
        assert!(status.evaluated_at.is_some());
        assert!(status.is_met());
    }

    #[test]
    fn test_evaluated_nonzero_exit_is_not_met() {
        let status = ExitConditionStatus::evaluated(
            ExitConditionType::LintClean,
            "cargo clippy --all-targets -- -D warnings",
            1,
            "warning: unused variable",
            0,
        );
        assert_eq!(status.status, ConditionState::NotMet);
        assert_eq!(status.last_exit_code, Some(1));
        assert!(!status.is_met());
    }

    #[test]
    fn test_errored_records_diagnostic() {
        let status = ExitConditionStatus::errored(
            ExitConditionType::Custom,
            "./verify.sh",
            "timed out after 30s",
            7,
        );
        assert_eq!(status.status, ConditionState::Error);
        assert!(status.last_exit_code.is_none());
        assert!(status.last_output.is_none());
        assert_eq!(status.last_error.as_deref(), Some("timed out after 30s"));
        assert_eq!(status.evaluated_at_iteration, Some(7));
        assert!(status.evaluated_at.is_some());
    }

    #[test]
    fn test_condition_type_serialization() {
        assert_eq!(
            serde_json::to_string(&ExitConditionType::TestsPass).unwrap(),
            "\"tests_pass\""
        );
        assert_eq!(
            serde_json::to_string(&ExitConditionType::LintClean).unwrap(),
            "\"lint_clean\""
        );
        assert_eq!(
            serde_json::to_string(&ExitConditionType::BuildSucceeds).unwrap(),
            "\"build_succeeds\""
        );
        assert_eq!(
            serde_json::to_string(&ExitConditionType::SecurityScan).unwrap(),
            "\"security_scan\""
        );
        assert_eq!(
            serde_json::to_string(&ExitConditionType::Custom).unwrap(),
            "\"custom\""
        );
    }

    #[test]
    fn test_condition_state_serialization() {
        assert_eq!(
            serde_json::to_string(&ConditionState::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&ConditionState::Met).unwrap(),
            "\"met\""
        );
        assert_eq!(
            serde_json::to_string(&ConditionState::NotMet).unwrap(),
            "\"not_met\""
        );
        assert_eq!(
            serde_json::to_string(&ConditionState::Error).unwrap(),
            "\"error\""
        );
    }

    #[test]
    fn test_status_serialization_roundtrip() {
        let status =
            ExitConditionStatus::evaluated(ExitConditionType::BuildSucceeds, "cargo build", 0, "", 2);
        let json = serde_json::to_string(&status).expect("serialize");
        let parsed: ExitConditionStatus = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, status);
    }
}
