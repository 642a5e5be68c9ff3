//! QA Base CLI
//!
//! Manages the question/answer record store and keeps its vector index in
//! sync. Data goes to stdout, logs to stderr.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{
    AuditCommand, GradeCommand, RebuildCommand, RecordsCommand, SearchCommand, SyncCommand,
};
use qabase_core::{config::AppConfig, logging};
use std::path::PathBuf;

/// QA Base - curated question/answer knowledge base with a synced vector index
#[derive(Parser, Debug)]
#[command(name = "qabase")]
#[command(about = "Curated QA knowledge base with a synced vector index", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "QABASE_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "QABASE_CONFIG")]
    config: Option<PathBuf>,

    /// Record store file (default: <workspace>/qa_database.json)
    #[arg(long, global = true, env = "QABASE_RECORDS")]
    records: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List and edit records
    Records(RecordsCommand),

    /// Re-sync the index against the stored records
    Sync(SyncCommand),

    /// Drop the index and re-embed every active record
    Rebuild(RebuildCommand),

    /// Report index entries that disagree with the record store
    Audit(AuditCommand),

    /// Retrieve answers for a question
    Search(SearchCommand),

    /// Grade candidate answers against reference answers
    Grade(GradeCommand),
}

/// Defaults, then YAML, then environment, then flags.
///
/// `--workspace` and `--config` choose which YAML is read, so they go into
/// loading itself rather than being applied afterwards.
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let config = AppConfig::load_from(cli.workspace.clone(), cli.config.clone())
        .context("loading configuration")?;

    Ok(config.with_overrides(
        None,
        cli.records.clone(),
        cli.log_level.clone(),
        cli.verbose,
        cli.no_color,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = load_config(&cli)?;

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.no_color)?;

    tracing::info!("QA Base CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Records: {:?}", config.records_path);
    tracing::debug!("Index: {:?}", config.index_path);

    let command_name = match &cli.command {
        Commands::Records(_) => "records",
        Commands::Sync(_) => "sync",
        Commands::Rebuild(_) => "rebuild",
        Commands::Audit(_) => "audit",
        Commands::Search(_) => "search",
        Commands::Grade(_) => "grade",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match &cli.command {
        Commands::Records(cmd) => cmd.execute(&config).await,
        Commands::Sync(cmd) => cmd.execute(&config).await,
        Commands::Rebuild(cmd) => cmd.execute(&config).await,
        Commands::Audit(cmd) => cmd.execute(&config).await,
        Commands::Search(cmd) => cmd.execute(&config).await,
        Commands::Grade(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {:#}", e),
    }

    result
}
