use super::context::AppContext;
use anyhow::{Context, Result};
use hourboost_execution::{BackgroundWorkers, LifecycleEvent};
use tokio::sync::mpsc;

/// Restores the cluster, farms until Ctrl-C, then pauses every farm and
/// flushes its usage.
pub async fn run(ctx: AppContext, events: Option<mpsc::UnboundedReceiver<LifecycleEvent>>) -> Result<()> {
    let printer = events.map(|mut events| {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "[run] Could not encode lifecycle event"),
                }
            }
        })
    });

    let workers = BackgroundWorkers::start(&ctx.usecase, &ctx.settings.farming).await;
    let report = ctx
        .restore_orchestrator(ctx.settings.farming.resume_on_restore)
        .restore()
        .await?;
    tracing::info!(
        users = report.users,
        accounts = report.accounts,
        reconnects = report.reconnects_requested,
        "[run] Cluster restored, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("[run] Shutting down");

    workers.shutdown().await;
    let reports = ctx.usecase.shutdown_all().await;
    let stopped: usize = reports.iter().map(|(_, r)| r.stopped.len()).sum();
    let failed: usize = reports.iter().map(|(_, r)| r.errors.len()).sum();
    tracing::info!(
        users = reports.len(),
        stopped,
        failed,
        "[run] All farms paused"
    );

    if let Some(printer) = printer {
        printer.abort();
    }
    Ok(())
}
