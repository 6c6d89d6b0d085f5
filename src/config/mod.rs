//! Configuration system for runloop.
//!
//! Two layers:
//! 1. `LoopConfiguration` - per-session settings callers hand to the
//!    controller directly
//! 2. `GlobalConfig` - CLI/global settings loaded from
//!    ~/.config/runloop/runloop.yml or .runloop.yml

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{EvaluationConfig, EventsConfig, GlobalConfig, StorageConfig};
pub use self::loop_config::{ExitConditionConfig, LoopConfiguration};

mod global;
mod loop_config;

/// Default checkpoint cadence (iterations per checkpoint).
pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 5;

/// Load global configuration from the standard search paths.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. .runloop.yml in current directory (project config)
/// 3. ~/.config/runloop/runloop.yml (user config)
/// 4. Default values
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GlobalConfig> {
    GlobalConfig::load(explicit_path)
}
