//! CLI module for runloop - command-line interface and subcommands.
//!
//! Provides the entry point structure with subcommands for inspecting
//! sessions and checkpoints in the durable store.

pub mod commands;

pub use commands::Cli;
