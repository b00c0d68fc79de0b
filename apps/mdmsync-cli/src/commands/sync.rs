//! Sync commands - full, incremental, manual and retry runs

use clap::Args;
use mdmsync_sync::SyncRunResult;

use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::{
    format_duration, print_header, print_info, print_json, print_key_value, print_success,
    print_warning,
};

/// Arguments for the full and incremental commands
#[derive(Args)]
pub struct RunArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the manual command
#[derive(Args)]
pub struct ManualArgs {
    /// MDM device ids to push
    #[arg(required = true, value_name = "ID")]
    pub ids: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the retry command
#[derive(Args)]
pub struct RetryArgs {
    /// Only retry these device ids (default: every failed device)
    #[arg(value_name = "ID")]
    pub ids: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute_full(ctx: &AppContext, args: RunArgs) -> CliResult<()> {
    let result = ctx.engine.run_full().await?;
    report(&result, args.json)
}

pub async fn execute_incremental(ctx: &AppContext, args: RunArgs) -> CliResult<()> {
    let result = ctx.engine.run_incremental().await?;
    report(&result, args.json)
}

pub async fn execute_manual(ctx: &AppContext, args: ManualArgs) -> CliResult<()> {
    if args.ids.iter().all(|id| id.trim().is_empty()) {
        return Err(CliError::Validation(
            "At least one non-empty device id is required.".to_string(),
        ));
    }
    let result = ctx.engine.run_manual(&args.ids).await?;
    report(&result, args.json)
}

pub async fn execute_retry(ctx: &AppContext, args: RetryArgs) -> CliResult<()> {
    let only = (!args.ids.is_empty()).then_some(args.ids.as_slice());
    let result = ctx.engine.retry_failed(only).await?;
    if result.run_id.is_none() && !args.json {
        print_info("No failed devices to retry.");
        return Ok(());
    }
    report(&result, args.json)
}

/// Print the result, then turn device failures into a non-zero exit.
fn report(result: &SyncRunResult, json: bool) -> CliResult<()> {
    if json {
        print_json(result)?;
    } else {
        print_result(result);
    }

    if result.success {
        Ok(())
    } else {
        Err(CliError::DevicesFailed {
            failed: result.failed,
        })
    }
}

fn print_result(result: &SyncRunResult) {
    print_header(&format!("{} sync", capitalize(result.mode.as_str())));

    if let Some(run_id) = result.run_id {
        print_key_value("Run", &run_id.to_string());
    }
    print_key_value("Processed", &result.processed.to_string());
    print_key_value("Created", &result.created.to_string());
    print_key_value("Updated", &result.updated.to_string());
    print_key_value("Skipped", &result.skipped.to_string());
    print_key_value("Failed", &result.failed.to_string());
    print_key_value("Duration", &format_duration(result.duration()));
    println!();

    if result.success {
        print_success("Sync completed");
    } else {
        print_warning(&format!("{} device(s) failed", result.failed));
        for error in &result.errors {
            println!("  - {error}");
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdmsync_sync::RunMode;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("incremental"), "Incremental");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_report_maps_failures() {
        let mut result = SyncRunResult::empty(RunMode::Manual);
        assert!(report(&result, true).is_ok());

        result.failed = 2;
        result.success = false;
        assert!(matches!(
            report(&result, true),
            Err(CliError::DevicesFailed { failed: 2 })
        ));
    }
}
