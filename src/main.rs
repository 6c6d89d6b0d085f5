use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use runloop::checkpoint::{CheckpointStore, SqliteStore};
use runloop::config::GlobalConfig;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("runloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("runloop.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_store(config: &GlobalConfig) -> Result<SqliteStore> {
    SqliteStore::open(&config.storage.database_path).context(format!(
        "Failed to open checkpoint database at {}",
        config.storage.database_path.display()
    ))
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

async fn run_application(cli: &Cli, config: &GlobalConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
        println!(
            "  Checkpoint database: {}",
            config.storage.database_path.display()
        );
    }

    match &cli.command {
        // Default: list sessions, the overview of what the store holds
        None | Some(Commands::Sessions) => handle_sessions_command(config).await,
        Some(Commands::Checkpoints { session }) => {
            handle_checkpoints_command(session, config).await
        }
        Some(Commands::Show { session, iteration }) => {
            handle_show_command(session, *iteration, config).await
        }
    }
}

async fn handle_sessions_command(config: &GlobalConfig) -> Result<()> {
    info!("Listing sessions");
    let store = open_store(config)?;
    let sessions = store.sessions().await.context("Failed to list sessions")?;

    if sessions.is_empty() {
        println!("{}", "No sessions recorded.".yellow());
        return Ok(());
    }

    println!("{}", "Sessions:".cyan());
    for session in sessions {
        println!("  {}", session);
    }
    Ok(())
}

async fn handle_checkpoints_command(session: &str, config: &GlobalConfig) -> Result<()> {
    info!("Listing checkpoints for session: {}", session);
    let store = open_store(config)?;
    let metadata = store
        .list(session)
        .await
        .context(format!("Failed to list checkpoints for {session}"))?;

    if metadata.is_empty() {
        println!("{} {}", "No checkpoints for session".yellow(), session);
        return Ok(());
    }

    println!("{} {}", "Checkpoints for".cyan(), session.bold());
    println!("  {:<10} {:<28} {}", "iteration", "checkpoint", "created");
    for entry in metadata {
        println!(
            "  {:<10} {:<28} {}",
            entry.iteration,
            entry.checkpoint_id,
            format_timestamp(entry.created_at)
        );
    }
    Ok(())
}

async fn handle_show_command(
    session: &str,
    iteration: Option<u32>,
    config: &GlobalConfig,
) -> Result<()> {
    info!("Showing checkpoint - session: {}, iteration: {:?}", session, iteration);
    let store = open_store(config)?;

    let iteration = match iteration {
        Some(n) => n,
        None => {
            // Latest checkpoint when no iteration is given
            let metadata = store
                .list(session)
                .await
                .context(format!("Failed to list checkpoints for {session}"))?;
            metadata
                .last()
                .map(|m| m.iteration)
                .ok_or_else(|| eyre!("No checkpoints for session {session}"))?
        }
    };

    let checkpoint = store
        .get(session, iteration)
        .await
        .context("Failed to load checkpoint")?
        .ok_or_else(|| eyre!("No checkpoint at iteration {iteration} for session {session}"))?;

    println!(
        "{} {} {} {}",
        "Checkpoint".cyan(),
        checkpoint.checkpoint_id.bold(),
        "taken at".cyan(),
        format_timestamp(checkpoint.created_at)
    );
    let rendered = serde_json::to_string_pretty(&checkpoint.state)
        .context("Failed to render checkpoint state")?;
    println!("{rendered}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config =
        GlobalConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config)
        .await
        .context("Application failed")?;

    Ok(())
}
