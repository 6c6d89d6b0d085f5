//! Iteration-limit policy oracle.
//!
//! The controller enforces its own `max_iterations` bound; this oracle is
//! for orchestrating callers that gate loop starts or continuations on an
//! external policy service. The service internals live elsewhere, only the
//! decision contract is defined here.

use async_trait::async_trait;

use crate::error::{Result, RunloopError};

/// Verdict from the policy oracle for one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The iteration may proceed
    Allow,
    /// The iteration must not proceed
    Deny { reason: String },
}

impl PolicyDecision {
    /// Returns true when the iteration may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The denial reason, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Deny { reason } => Some(reason),
            Self::Allow => None,
        }
    }
}

/// External authority over whether an agent may run another iteration.
#[async_trait]
pub trait IterationPolicy: Send + Sync {
    /// Decide whether `agent` may execute `current_iteration` given the
    /// session's configured `max_iterations`. An `Err` means the oracle
    /// itself could not be consulted.
    async fn check(
        &self,
        agent: &str,
        current_iteration: u32,
        max_iterations: u32,
    ) -> Result<PolicyDecision>;
}

/// Consult the oracle and convert a denial into an error.
pub async fn enforce(
    policy: &dyn IterationPolicy,
    agent: &str,
    current_iteration: u32,
    max_iterations: u32,
) -> Result<()> {
    match policy.check(agent, current_iteration, max_iterations).await? {
        PolicyDecision::Allow => Ok(()),
        PolicyDecision::Deny { reason } => Err(RunloopError::PolicyViolation {
            agent: agent.to_string(),
            reason,
        }),
    }
}

/// Policy that allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnlimitedPolicy;

#[async_trait]
impl IterationPolicy for UnlimitedPolicy {
    async fn check(
        &self,
        _agent: &str,
        _current_iteration: u32,
        _max_iterations: u32,
    ) -> Result<PolicyDecision> {
        Ok(PolicyDecision::Allow)
    }
}

/// Policy that denies once a fixed iteration cap is reached, regardless of
/// what the session itself is configured for.
#[derive(Debug, Clone, Copy)]
pub struct HardCapPolicy {
    cap: u32,
}

impl HardCapPolicy {
    /// Create a policy denying iterations at or beyond `cap`
    pub fn new(cap: u32) -> Self {
        Self { cap }
    }

    /// The configured cap
    pub fn cap(&self) -> u32 {
        self.cap
    }
}

#[async_trait]
impl IterationPolicy for HardCapPolicy {
    async fn check(
        &self,
        _agent: &str,
        current_iteration: u32,
        _max_iterations: u32,
    ) -> Result<PolicyDecision> {
        if current_iteration >= self.cap {
            Ok(PolicyDecision::Deny {
                reason: format!(
                    "iteration {} exceeds the policy cap of {}",
                    current_iteration, self.cap
                ),
            })
        } else {
            Ok(PolicyDecision::Allow)
        }
    }
}
