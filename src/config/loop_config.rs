//! Per-session loop configuration.
//!
//! This is the configuration a caller hands to the controller; it is fixed
//! for the lifetime of the session.

use serde::{Deserialize, Serialize};

use crate::domain::ExitConditionType;
use crate::error::{Result, RunloopError};

/// Configuration for one exit condition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExitConditionConfig {
    /// Which verification backs this condition
    pub condition_type: ExitConditionType,

    /// Optional path scope handed to the verification tool
    #[serde(default)]
    pub path: Option<String>,

    /// Optional name filter (e.g. a package or test filter)
    #[serde(default)]
    pub filter: Option<String>,

    /// Verification command; required for Custom conditions
    #[serde(default)]
    pub command: Option<String>,

    /// Per-condition override of the evaluator timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ExitConditionConfig {
    /// Create a condition config for a built-in verification
    pub fn new(condition_type: ExitConditionType) -> Self {
        Self {
            condition_type,
            path: None,
            filter: None,
            command: None,
            timeout_secs: None,
        }
    }

    /// Create a Custom condition backed by the given command
    pub fn custom(command: &str) -> Self {
        Self {
            condition_type: ExitConditionType::Custom,
            path: None,
            filter: None,
            command: Some(command.to_string()),
            timeout_secs: None,
        }
    }

    /// Set the path scope
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    /// Set the name filter
    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }

    /// Override the evaluation timeout for this condition
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Configuration for a loop session.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoopConfiguration {
    /// Agent this session runs on behalf of
    pub agent_name: String,

    /// Session identifier; a UUID v4 is generated at initialize when absent
    #[serde(default)]
    pub session_id: Option<String>,

    /// Hard iteration cap (must be >= 1)
    pub max_iterations: u32,

    /// Save a checkpoint every N completed iterations (must be >= 1)
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,

    /// Exit conditions evaluated after each iteration
    #[serde(default)]
    pub exit_conditions: Vec<ExitConditionConfig>,

    /// Locality hint forwarded to the checkpoint store provisioner
    #[serde(default)]
    pub region: Option<String>,
}

fn default_checkpoint_interval() -> u32 {
    crate::config::DEFAULT_CHECKPOINT_INTERVAL
}

impl LoopConfiguration {
    /// Create a configuration with defaults for everything optional
    pub fn new(agent_name: &str, max_iterations: u32) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            session_id: None,
            max_iterations,
            checkpoint_interval: default_checkpoint_interval(),
            exit_conditions: vec![],
            region: None,
        }
    }

    /// Pin the session identifier instead of generating one
    pub fn with_session_id(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    /// Set the checkpoint cadence
    pub fn with_checkpoint_interval(mut self, interval: u32) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Append an exit condition
    pub fn with_exit_condition(mut self, condition: ExitConditionConfig) -> Self {
        self.exit_conditions.push(condition);
        self
    }

    /// Set the store locality hint
    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    /// Validate the configuration.
    ///
    /// Rejected configurations never reach the run loop; the controller
    /// calls this during initialize.
    pub fn validate(&self) -> Result<()> {
        if self.agent_name.is_empty() {
            return Err(RunloopError::InvalidConfig(
                "agent_name cannot be empty".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(RunloopError::InvalidConfig(
                "max_iterations must be >= 1".to_string(),
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(RunloopError::InvalidConfig(
                "checkpoint_interval must be >= 1".to_string(),
            ));
        }
        if self.session_id.as_deref().is_some_and(|id| id.is_empty()) {
            return Err(RunloopError::InvalidConfig(
                "session_id cannot be empty when provided".to_string(),
            ));
        }
        for condition in &self.exit_conditions {
            if condition.condition_type == ExitConditionType::Custom
                && condition.command.as_deref().unwrap_or("").is_empty()
            {
                return Err(RunloopError::InvalidConfig(
                    "custom exit conditions require a command".to_string(),
                ));
            }
            if condition.timeout_secs.is_some_and(|secs| secs == 0) {
                return Err(RunloopError::InvalidConfig(
                    "condition timeout_secs must be >= 1 when provided".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_configuration_defaults() {
        let config = LoopConfiguration::new("refactor-bot", 10);
        assert_eq!(config.agent_name, "refactor-bot");
        assert!(config.session_id.is_none());
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.checkpoint_interval, 5);
        assert!(config.exit_conditions.is_empty());
        assert!(config.region.is_none());
    }

    #[test]
    fn test_builder_methods() {
        let config = LoopConfiguration::new("agent", 20)
            .with_session_id("sess-fixed")
            .with_checkpoint_interval(2)
            .with_exit_condition(ExitConditionConfig::new(ExitConditionType::TestsPass))
            .with_region("us-east-1");
        assert_eq!(config.session_id.as_deref(), Some("sess-fixed"));
        assert_eq!(config.checkpoint_interval, 2);
        assert_eq!(config.exit_conditions.len(), 1);
        assert_eq!(config.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_validation_passes_for_defaults() {
        let config = LoopConfiguration::new("agent", 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_empty_agent_name() {
        let config = LoopConfiguration::new("", 10);
        assert!(matches!(
            config.validate(),
            Err(RunloopError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_invalid_zero_max_iterations() {
        let config = LoopConfiguration::new("agent", 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_zero_checkpoint_interval() {
        let config = LoopConfiguration::new("agent", 10).with_checkpoint_interval(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_custom_condition_requires_command() {
        let config = LoopConfiguration::new("agent", 10)
            .with_exit_condition(ExitConditionConfig::new(ExitConditionType::Custom));
        assert!(config.validate().is_err());

        let config = LoopConfiguration::new("agent", 10)
            .with_exit_condition(ExitConditionConfig::custom("./verify.sh"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_condition_timeout_rejected() {
        let config = LoopConfiguration::new("agent", 10).with_exit_condition(
            ExitConditionConfig::new(ExitConditionType::TestsPass).with_timeout_secs(0),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_deserialization_with_defaults() {
        let yaml = r#"
agent_name: refactor-bot
max_iterations: 50
exit_conditions:
  - condition_type: tests_pass
    filter: auth
  - condition_type: custom
    command: ./scripts/verify.sh
"#;
        let config: LoopConfiguration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.agent_name, "refactor-bot");
        assert_eq!(config.checkpoint_interval, 5);
        assert_eq!(config.exit_conditions.len(), 2);
        assert_eq!(
            config.exit_conditions[0].condition_type,
            ExitConditionType::TestsPass
        );
        assert_eq!(config.exit_conditions[0].filter.as_deref(), Some("auth"));
        assert_eq!(
            config.exit_conditions[1].command.as_deref(),
            Some("./scripts/verify.sh")
        );
        assert!(config.validate().is_ok());
    }
}
