//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - sessions: list sessions present in the durable checkpoint store
//! - checkpoints: list checkpoints for one session
//! - show: print a checkpoint's state as JSON

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Runloop - checkpointed execution-loop controller for autonomous agents
#[derive(Parser, Debug)]
#[command(name = "runloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List sessions with checkpoints in the durable store
    Sessions,

    /// List checkpoints recorded for a session
    Checkpoints {
        /// Session to list checkpoints for
        #[arg(short, long)]
        session: String,
    },

    /// Print a checkpoint's state as pretty JSON
    Show {
        /// Session to read from
        #[arg(short, long)]
        session: String,

        /// Checkpoint iteration (latest when omitted)
        #[arg(short, long)]
        iteration: Option<u32>,
    },
}
