//! Cleanup command - Delete old successful records and finished runs

use clap::Args;
use serde::Serialize;

use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::{print_json, print_success};

/// Arguments for the cleanup command
#[derive(Args)]
pub struct CleanupArgs {
    /// Retention in days (default: SYNC_RETENTION_DAYS, 30)
    #[arg(long)]
    pub days: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct CleanupOutput {
    retention_days: u32,
    deleted: u64,
}

/// Execute the cleanup command
pub async fn execute(ctx: &AppContext, args: CleanupArgs) -> CliResult<()> {
    let retention_days = args.days.unwrap_or(ctx.config.schedule.retention_days);
    let deleted = ctx.engine.cleanup(retention_days).await?;

    if args.json {
        return print_json(&CleanupOutput {
            retention_days,
            deleted,
        });
    }

    print_success(&format!(
        "Deleted {deleted} row(s) older than {retention_days} day(s)"
    ));
    Ok(())
}
