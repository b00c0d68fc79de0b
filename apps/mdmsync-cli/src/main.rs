//! mdmsync - push MDM device inventory into GLPI
//!
//! One-shot commands run a single reconciliation or query the local ledger;
//! `daemon` keeps running scheduled syncs until it receives a signal.

mod commands;
mod config;
mod context;
mod error;
mod logging;
mod output;

use clap::{Parser, Subcommand};

use commands::check_config::CheckConfigArgs;
use commands::cleanup::CleanupArgs;
use commands::failed::FailedArgs;
use commands::health::HealthArgs;
use commands::runs::RunsArgs;
use commands::status::StatusArgs;
use commands::sync::{ManualArgs, RetryArgs, RunArgs};
use config::AppConfig;
use context::AppContext;
use error::CliResult;

#[derive(Parser)]
#[command(
    name = "mdmsync",
    author,
    version,
    about = "Reconcile MDM devices into GLPI",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync every device from the MDM
    Full(RunArgs),

    /// Sync devices changed since the last successful run
    Incremental(RunArgs),

    /// Sync specific devices by MDM id
    Manual(ManualArgs),

    /// Sync devices whose last attempt failed again
    Retry(RetryArgs),

    /// Show watermarks, the latest run and record counts
    Status(StatusArgs),

    /// List devices whose last sync failed
    Failed(FailedArgs),

    /// Delete old successful records and finished runs
    Cleanup(CleanupArgs),

    /// Show recent sync runs
    Runs(RunsArgs),

    /// Check MDM, GLPI and database health
    Health(HealthArgs),

    /// Run scheduled syncs until interrupted
    Daemon,

    /// Validate the configuration without connecting anywhere
    CheckConfig(CheckConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.print();
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = AppConfig::from_env()?;
    logging::init_logging(&config.log_filter, config.log_format);

    if let Commands::CheckConfig(args) = cli.command {
        return commands::check_config::execute(&config, args);
    }

    let ctx = AppContext::build(config).await?;
    let outcome = dispatch(&ctx, cli.command).await;
    ctx.shutdown().await;
    outcome
}

async fn dispatch(ctx: &AppContext, command: Commands) -> CliResult<()> {
    match command {
        Commands::Full(args) => commands::sync::execute_full(ctx, args).await,
        Commands::Incremental(args) => commands::sync::execute_incremental(ctx, args).await,
        Commands::Manual(args) => commands::sync::execute_manual(ctx, args).await,
        Commands::Retry(args) => commands::sync::execute_retry(ctx, args).await,
        Commands::Status(args) => commands::status::execute(ctx, args).await,
        Commands::Failed(args) => commands::failed::execute(ctx, args).await,
        Commands::Cleanup(args) => commands::cleanup::execute(ctx, args).await,
        Commands::Runs(args) => commands::runs::execute(ctx, args).await,
        Commands::Health(args) => commands::health::execute(ctx, args).await,
        Commands::Daemon => commands::daemon::execute(ctx).await,
        Commands::CheckConfig(args) => commands::check_config::execute(&ctx.config, args),
    }
}
