//! Runs command - Show recent sync runs from the ledger

use clap::Args;
use mdmsync_sync::SyncRun;

use crate::commands::failed::validate_limit;
use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::{format_duration, format_timestamp, print_info, print_json};

/// Arguments for the runs command
#[derive(Args)]
pub struct RunsArgs {
    /// Number of runs to show, newest first
    #[arg(long, default_value_t = 10)]
    pub limit: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the runs command
pub async fn execute(ctx: &AppContext, args: RunsArgs) -> CliResult<()> {
    validate_limit(args.limit)?;
    let runs = ctx.engine.recent_runs(args.limit).await?;

    if args.json {
        return print_json(&runs);
    }

    if runs.is_empty() {
        print_info("No sync runs recorded yet.");
        return Ok(());
    }

    println!(
        "{:<38} {:<12} {:<12} {:<24} {:>9} {:>7} {:>7} {:>7} {:>7} {:>10}",
        "ID", "MODE", "STATUS", "STARTED", "PROCESSED", "CREATED", "UPDATED", "SKIPPED", "FAILED",
        "DURATION"
    );
    for run in &runs {
        println!("{}", run_row(run));
    }
    Ok(())
}

fn run_row(run: &SyncRun) -> String {
    let duration = run.duration_ms.map_or_else(
        || "-".to_string(),
        |ms| format_duration(std::time::Duration::from_millis(ms)),
    );
    format!(
        "{:<38} {:<12} {:<12} {:<24} {:>9} {:>7} {:>7} {:>7} {:>7} {:>10}",
        run.id,
        run.mode.as_str(),
        run.status.as_str(),
        format_timestamp(Some(run.started_at)),
        run.counts.processed,
        run.counts.created,
        run.counts.updated,
        run.counts.skipped,
        run.counts.failed,
        duration,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mdmsync_sync::{RunMode, RunStatus};
    use uuid::Uuid;

    #[test]
    fn test_run_row_without_duration() {
        let run = SyncRun {
            id: Uuid::nil(),
            mode: RunMode::Full,
            status: RunStatus::InProgress,
            started_at: Utc::now(),
            completed_at: None,
            counts: Default::default(),
            duration_ms: None,
            errors: Vec::new(),
            error_message: None,
        };
        let row = run_row(&run);
        assert!(row.starts_with("00000000-0000-0000-0000-000000000000"));
        assert!(row.contains("full"));
        assert!(row.contains("in_progress"));
        assert!(row.trim_end().ends_with('-'));
    }
}
