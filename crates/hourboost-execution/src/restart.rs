//! Delayed re-login after restart-eligible client errors.

use async_trait::async_trait;
use hourboost_application::FarmingUseCase;
use hourboost_core::error::Result;
use hourboost_core::event::{EventHandler, EventKind, FarmEvent};
use hourboost_core::sync::lock;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type AccountKey = (String, String);

/// Re-logs accounts in after `error-occured-on-steam-client` events that are
/// flagged restart-eligible.
///
/// Each restart waits `delay` on its own task so the emitting dispatcher is
/// never blocked. At most one restart is pending per account.
pub struct AutoRestartScheduler {
    usecase: Weak<FarmingUseCase>,
    delay: Duration,
    cancel: CancellationToken,
    pending: Arc<Mutex<HashSet<AccountKey>>>,
}

impl AutoRestartScheduler {
    pub fn new(usecase: Weak<FarmingUseCase>, delay: Duration) -> Self {
        Self {
            usecase,
            delay,
            cancel: CancellationToken::new(),
            pending: Arc::default(),
        }
    }

    /// Creates a scheduler and registers it on the use case's dispatcher.
    pub async fn register(usecase: &Arc<FarmingUseCase>, delay: Duration) -> Arc<Self> {
        let scheduler = Arc::new(Self::new(Arc::downgrade(usecase), delay));
        usecase
            .dispatcher()
            .on(EventKind::ErrorOccuredOnSteamClient, scheduler.clone())
            .await;
        scheduler
    }

    /// Number of restarts waiting for their delay.
    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Drops every pending restart. Later events are ignored.
    pub fn cancel_all(&self) {
        tracing::info!(
            pending = self.pending(),
            "[AutoRestartScheduler] Cancelling pending restarts"
        );
        self.cancel.cancel();
    }

    /// Schedules a re-login of `account_name`. Returns `false` when one is
    /// already pending or the scheduler was cancelled.
    pub fn schedule(&self, username: &str, account_name: &str) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let key: AccountKey = (username.to_string(), account_name.to_string());
        if !lock(&self.pending).insert(key.clone()) {
            tracing::debug!(
                username,
                account_name,
                "[AutoRestartScheduler] Restart already pending"
            );
            return false;
        }

        tracing::info!(
            username,
            account_name,
            delay_secs = self.delay.as_secs(),
            "[AutoRestartScheduler] Restart scheduled"
        );

        let usecase = self.usecase.clone();
        let cancel = self.cancel.clone();
        let pending = Arc::clone(&self.pending);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    lock(&pending).remove(&key);
                }
                _ = tokio::time::sleep(delay) => {
                    // Cleared first: a failed re-login raises a new event that
                    // must be able to schedule again.
                    lock(&pending).remove(&key);
                    restart(usecase, &key.0, &key.1).await;
                }
            }
        });
        true
    }
}

async fn restart(usecase: Weak<FarmingUseCase>, username: &str, account_name: &str) {
    let Some(usecase) = usecase.upgrade() else {
        return;
    };
    match usecase.reconnect_and_resume(username, account_name).await {
        Ok(outcome) => tracing::info!(
            username,
            account_name,
            outcome = ?outcome,
            "[AutoRestartScheduler] Restart attempted"
        ),
        Err(e) => tracing::warn!(
            username,
            account_name,
            error = %e,
            "[AutoRestartScheduler] Restart failed"
        ),
    }
}

#[async_trait]
impl EventHandler for AutoRestartScheduler {
    fn name(&self) -> &str {
        "auto-restart"
    }

    async fn handle(&self, event: &FarmEvent) -> Result<()> {
        let FarmEvent::ErrorOccuredOnSteamClient {
            username,
            account_name,
            code,
            restart_eligible,
            ..
        } = event
        else {
            return Ok(());
        };
        if !restart_eligible {
            tracing::debug!(
                username = %username,
                account_name = %account_name,
                code = %code,
                "[AutoRestartScheduler] Not restart-eligible"
            );
            return Ok(());
        }
        self.schedule(username, account_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Cluster;
    use hourboost_core::session::{SessionState, TransportErrorCode};

    const DELAY: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_eligible_error_relogs_after_delay() {
        let cluster = Cluster::new(0).await;
        let scheduler = AutoRestartScheduler::register(&cluster.usecase, DELAY).await;
        cluster.farming("acc1", vec![730]).await;

        cluster.fail("acc1", TransportErrorCode::NoConnection).await;
        assert_eq!(scheduler.pending(), 1);
        assert_eq!(cluster.state("acc1").await, SessionState::Erroring);

        tokio::time::sleep(DELAY / 2).await;
        assert_eq!(cluster.state("acc1").await, SessionState::Erroring);

        tokio::time::sleep(DELAY).await;
        assert_eq!(cluster.state("acc1").await, SessionState::Farming);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ineligible_error_is_ignored() {
        let cluster = Cluster::new(0).await;
        let scheduler = AutoRestartScheduler::register(&cluster.usecase, DELAY).await;
        cluster.farming("acc1", vec![730]).await;

        cluster.fail("acc1", TransportErrorCode::InvalidPassword).await;

        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_restarts() {
        let cluster = Cluster::new(0).await;
        let scheduler = AutoRestartScheduler::register(&cluster.usecase, DELAY).await;
        cluster.farming("acc1", vec![730]).await;
        cluster.fail("acc1", TransportErrorCode::Timeout).await;

        assert!(!scheduler.schedule("alice", "acc1"));
        scheduler.cancel_all();
        tokio::time::sleep(DELAY * 2).await;

        assert_eq!(scheduler.pending(), 0);
        assert_eq!(cluster.state("acc1").await, SessionState::Erroring);
        assert!(!scheduler.schedule("alice", "acc1"));
    }
}
