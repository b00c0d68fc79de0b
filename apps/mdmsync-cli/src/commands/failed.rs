//! Failed command - List devices whose last sync failed

use clap::Args;

use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::{format_timestamp, print_info, print_json, truncate};

const MAX_LIMIT: u32 = 1000;

/// Arguments for the failed command
#[derive(Args)]
pub struct FailedArgs {
    /// Maximum number of devices to show
    #[arg(long, default_value_t = 50)]
    pub limit: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the failed command
pub async fn execute(ctx: &AppContext, args: FailedArgs) -> CliResult<()> {
    validate_limit(args.limit)?;
    let records = ctx.engine.failed_devices(args.limit).await?;

    if args.json {
        return print_json(&records);
    }

    if records.is_empty() {
        print_info("No failed devices.");
        return Ok(());
    }

    println!(
        "{:<24} {:<10} {:<8} {:<24} {:<40}",
        "DEVICE", "GLPI ID", "RETRIES", "UPDATED", "ERROR"
    );
    for record in &records {
        println!(
            "{:<24} {:<10} {:<8} {:<24} {:<40}",
            truncate(&record.external_id, 24),
            record
                .target_id
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
            record.retry_count,
            format_timestamp(Some(record.updated_at)),
            truncate(record.last_error.as_deref().unwrap_or("-"), 40),
        );
    }
    println!("\n{} failed device(s)", records.len());
    Ok(())
}

pub(crate) fn validate_limit(limit: u32) -> CliResult<()> {
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(())
    } else {
        Err(CliError::Validation(format!(
            "Limit must be between 1 and {MAX_LIMIT}."
        )))
    }
}
