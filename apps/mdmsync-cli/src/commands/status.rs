//! Status command - Show watermarks, the latest run and record counts

use clap::Args;
use mdmsync_sync::{RunState, SyncStatusReport};

use crate::context::AppContext;
use crate::error::CliResult;
use crate::output::{format_timestamp, print_header, print_json, print_key_value, print_warning};

/// Arguments for the status command
#[derive(Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the status command
pub async fn execute(ctx: &AppContext, args: StatusArgs) -> CliResult<()> {
    let report = ctx.engine.sync_status().await?;

    if args.json {
        return print_json(&report);
    }

    print_status(&report);
    Ok(())
}

fn print_status(report: &SyncStatusReport) {
    print_header("Sync Status");

    print_key_value("Running", if report.running { "yes" } else { "no" });
    print_key_value("Last full sync", &format_timestamp(report.last_full_sync));
    print_key_value(
        "Last incremental sync",
        &format_timestamp(report.last_incremental_sync),
    );

    match &report.last_run {
        Some(last) => {
            print_key_value(
                "Last run",
                &format!(
                    "{} ({}) started {}",
                    last.run.mode,
                    last.state,
                    format_timestamp(Some(last.run.started_at))
                ),
            );
            if let Some(message) = &last.run.error_message {
                print_key_value("Last error", message);
            }
            if last.state == RunState::Stale {
                print_warning("The latest run never finished; it was probably interrupted.");
            }
        }
        None => print_key_value("Last run", "none"),
    }

    println!();
    print_key_value("Tracked devices", &report.records.total.to_string());
    print_key_value("Synced", &report.records.success.to_string());
    print_key_value("Failed", &report.records.failed.to_string());
    print_key_value("Pending", &report.records.pending.to_string());
    print_key_value("Success rate", &format!("{:.1}%", report.success_rate));
}
