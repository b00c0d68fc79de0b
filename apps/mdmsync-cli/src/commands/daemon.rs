//! Daemon command - Run scheduled syncs until SIGINT or SIGTERM

use mdmsync_sync::SyncScheduler;
use tokio::signal;
use tracing::info;

use crate::context::AppContext;
use crate::error::CliResult;

/// Execute the daemon command
///
/// On a signal the scheduler stops ticking and the active run is cancelled
/// at its next batch boundary, then finalized before the process exits.
pub async fn execute(ctx: &AppContext) -> CliResult<()> {
    let scheduler = SyncScheduler::new(ctx.engine.clone(), ctx.config.schedule.clone())?;

    let run = scheduler.run();
    tokio::pin!(run);

    let signalled = tokio::select! {
        () = &mut run => false,
        () = shutdown_signal() => true,
    };
    if signalled {
        scheduler.shutdown();
        run.await;
    }

    info!("Daemon stopped");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        () = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
