//! Check-config command - Validate and print the effective configuration

use clap::Args;
use serde_json::json;

use crate::config::AppConfig;
use crate::error::CliResult;
use crate::output::{print_header, print_json, print_key_value, print_success};

/// Arguments for the check-config command
#[derive(Args)]
pub struct CheckConfigArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the check-config command. Secrets are never printed.
pub fn execute(config: &AppConfig, args: CheckConfigArgs) -> CliResult<()> {
    if args.json {
        return print_json(&summary(config));
    }

    print_header("Configuration");
    print_key_value("MDM", &config.mdm.base_url);
    print_key_value("MDM devices path", &config.mdm.devices_path);
    print_key_value("GLPI", &config.glpi.base_url);
    print_key_value("Database", &config.database_url);
    print_key_value("Batch size", &config.sync.batch_size.to_string());
    print_key_value("HTTP retries", &config.sync.max_retries.to_string());
    print_key_value(
        "Target rate",
        &format!(
            "{} per {}s",
            config.sync.rate_limit, config.sync.rate_window_secs
        ),
    );
    print_key_value(
        "Schedule",
        &format!(
            "full every {}s, incremental every {}s",
            config.schedule.full_interval_secs, config.schedule.incremental_interval_secs
        ),
    );
    print_key_value("Log format", config.log_format.as_str());
    println!();
    print_success("Configuration is valid");
    Ok(())
}

fn summary(config: &AppConfig) -> serde_json::Value {
    json!({
        "mdm": {
            "base_url": config.mdm.base_url,
            "devices_path": config.mdm.devices_path,
            "timeout_secs": config.mdm.timeout_secs,
            "rate_limit_per_minute": config.mdm.rate_limit_per_minute,
            "verify_ssl": config.mdm.verify_ssl,
        },
        "glpi": {
            "base_url": config.glpi.base_url,
            "timeout_secs": config.glpi.timeout_secs,
            "rate_limit_per_minute": config.glpi.rate_limit_per_minute,
            "verify_ssl": config.glpi.verify_ssl,
        },
        "sync": config.sync,
        "schedule": config.schedule,
        "database": {
            "url": config.database_url,
            "max_connections": config.database_max_connections,
        },
        "health_timeout_secs": config.health.check_timeout_secs,
        "log_format": config.log_format.as_str(),
    })
}
