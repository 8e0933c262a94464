use crate::restart::AutoRestartScheduler;
use crate::usage_watchdog::UsageWatchdog;
use crate::watcher::ConnectionWatcher;
use hourboost_application::FarmingUseCase;
use hourboost_core::config::FarmingSettings;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background runtime of a farming process.
///
/// Start the workers before running the restore: the reconnects a restore
/// raises are only acted on if the restart scheduler is already registered.
pub struct BackgroundWorkers {
    restarts: Arc<AutoRestartScheduler>,
    watcher: Arc<ConnectionWatcher>,
    watchdog_cancel: CancellationToken,
    watchdog: JoinHandle<()>,
}

impl BackgroundWorkers {
    pub async fn start(usecase: &Arc<FarmingUseCase>, settings: &FarmingSettings) -> Self {
        let restarts = AutoRestartScheduler::register(usecase, settings.restart_delay()).await;
        let watcher = ConnectionWatcher::register(usecase).await;
        let watchdog = UsageWatchdog::new(usecase, settings.usage_check_interval());
        let watchdog_cancel = watchdog.cancel_token();

        tracing::info!(
            restart_delay_secs = settings.restart_delay_secs,
            usage_check_interval_secs = settings.usage_check_interval_secs,
            "[BackgroundWorkers] Started"
        );
        Self {
            restarts,
            watcher,
            watchdog_cancel,
            watchdog: watchdog.spawn(),
        }
    }

    pub fn pending_restarts(&self) -> usize {
        self.restarts.pending()
    }

    /// Cancels pending restarts, stops watching connections and waits for the
    /// watchdog to finish its current sweep.
    pub async fn shutdown(self) {
        self.restarts.cancel_all();
        self.watcher.stop_all();
        self.watchdog_cancel.cancel();
        if let Err(e) = self.watchdog.await {
            tracing::warn!(error = %e, "[BackgroundWorkers] Watchdog task failed");
        }
        tracing::info!("[BackgroundWorkers] Stopped");
    }
}
