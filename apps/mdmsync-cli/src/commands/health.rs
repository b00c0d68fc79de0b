//! Health command - Probe MDM, GLPI and the local database

use clap::Args;
use mdmsync_sync::{HealthReport, HealthStatus};

use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::{print_header, print_json, print_success, print_warning};

/// Arguments for the health command
#[derive(Args)]
pub struct HealthArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the health command
pub async fn execute(ctx: &AppContext, args: HealthArgs) -> CliResult<()> {
    let report = ctx.health_checker().check().await;

    if args.json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    match report.status {
        HealthStatus::Unhealthy => Err(CliError::Unhealthy(report.status.to_string())),
        _ => Ok(()),
    }
}

fn print_report(report: &HealthReport) {
    print_header("Health Check");

    println!("{:<10} {:<10} {:>8}  {}", "COMPONENT", "STATUS", "TIME", "DETAILS");
    for component in &report.components {
        println!(
            "{:<10} {:<10} {:>6}ms  {}",
            component.name,
            component.status.as_str(),
            component.response_time_ms,
            component.message
        );
    }
    println!();

    match report.status {
        HealthStatus::Healthy => print_success("All components healthy"),
        status => print_warning(&format!("Overall status: {status}")),
    }
}
