//! Periodic enforcement of capped plans.

use hourboost_application::FarmingUseCase;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Pauses the farms of users whose capped plan ran out while farming.
pub struct UsageWatchdog {
    usecase: Weak<FarmingUseCase>,
    interval: Duration,
    cancel: CancellationToken,
}

impl UsageWatchdog {
    pub fn new(usecase: &Arc<FarmingUseCase>, interval: Duration) -> Self {
        Self {
            usecase: Arc::downgrade(usecase),
            interval,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs sweeps every `interval` until cancelled or the use case is gone.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            tracing::info!(
                interval_secs = self.interval.as_secs(),
                "[UsageWatchdog] Started"
            );
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(usecase) = self.usecase.upgrade() else {
                            break;
                        };
                        sweep(&usecase).await;
                    }
                }
            }
            tracing::info!("[UsageWatchdog] Stopped");
        })
    }
}

/// Checks every registered user once. Returns how many users were paused.
pub async fn sweep(usecase: &FarmingUseCase) -> usize {
    let mut paused = 0;
    for username in usecase.storage().usernames().await {
        match usecase.enforce_usage_limit(&username).await {
            Ok(Some(report)) => {
                paused += 1;
                if !report.is_clean() {
                    tracing::warn!(
                        username = %username,
                        failed = report.errors.len(),
                        "[UsageWatchdog] Some farms refused to stop"
                    );
                }
            }
            Ok(None) => {}
            // Evicted between listing and checking.
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!(
                username = %username,
                error = %e,
                "[UsageWatchdog] Usage check failed"
            ),
        }
    }
    paused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Cluster;
    use hourboost_core::session::SessionState;

    #[tokio::test]
    async fn test_sweep_pauses_users_out_of_time() {
        let cluster = Cluster::new(3000).await;
        cluster.farming("acc1", vec![730]).await;

        cluster.advance(300);
        assert_eq!(sweep(&cluster.usecase).await, 0);
        assert_eq!(cluster.state("acc1").await, SessionState::Farming);

        cluster.advance(300);
        assert_eq!(sweep(&cluster.usecase).await, 1);
        assert_eq!(cluster.state("acc1").await, SessionState::LoggedIn);
        assert_eq!(cluster.recorded_usage().await, 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_watchdog_sweeps_until_cancelled() {
        let cluster = Cluster::new(3000).await;
        cluster.farming("acc1", vec![730]).await;
        cluster.advance(600);

        let watchdog = UsageWatchdog::new(&cluster.usecase, Duration::from_secs(60));
        let cancel = watchdog.cancel_token();
        let handle = watchdog.spawn();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cluster.state("acc1").await, SessionState::LoggedIn);

        cancel.cancel();
        handle.await.unwrap();
    }
}
