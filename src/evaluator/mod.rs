//! Exit condition evaluation against external verification tools.

pub mod conditions;
pub mod sandbox;

pub use conditions::{
    DEFAULT_OUTPUT_LIMIT, DEFAULT_TOOL_TIMEOUT, EvaluatorConfig, ExitConditionEvaluator,
};
pub use sandbox::{Execution, ProcessSandbox, Sandbox};
