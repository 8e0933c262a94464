//! Routes connection failures of logged-in accounts into the cluster.

use async_trait::async_trait;
use hourboost_application::FarmingUseCase;
use hourboost_core::error::Result;
use hourboost_core::event::{EventHandler, EventKind, FarmEvent};
use hourboost_core::session::{ConnectionEvent, TransportErrorCode};
use hourboost_core::sync::lock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

type AccountKey = (String, String);

struct Watch {
    generation: u64,
    token: CancellationToken,
}

/// Watches the connection of every account that logs in.
///
/// On `account_logged_in` a task subscribes to the account's connection and
/// forwards the first `Error` or `Disconnected` to
/// [`FarmingUseCase::handle_client_error`]. The task then ends; the next
/// successful login starts a new one.
pub struct ConnectionWatcher {
    usecase: Weak<FarmingUseCase>,
    cancel: CancellationToken,
    watches: Arc<Mutex<HashMap<AccountKey, Watch>>>,
    generations: AtomicU64,
}

impl ConnectionWatcher {
    pub fn new(usecase: Weak<FarmingUseCase>) -> Self {
        Self {
            usecase,
            cancel: CancellationToken::new(),
            watches: Arc::default(),
            generations: AtomicU64::new(0),
        }
    }

    pub async fn register(usecase: &Arc<FarmingUseCase>) -> Arc<Self> {
        let watcher = Arc::new(Self::new(Arc::downgrade(usecase)));
        usecase
            .dispatcher()
            .on(EventKind::AccountLoggedIn, watcher.clone())
            .await;
        watcher
    }

    /// Accounts currently watched.
    pub fn watching(&self) -> usize {
        lock(&self.watches).len()
    }

    pub fn stop_all(&self) {
        self.cancel.cancel();
    }

    async fn watch(&self, username: &str, account_name: &str) {
        if self.cancel.is_cancelled() {
            return;
        }
        let Some(usecase) = self.usecase.upgrade() else {
            return;
        };
        let Some(client) = usecase
            .storage()
            .get_account_client(username, account_name)
            .await
        else {
            return;
        };
        let events = client.lock().await.connection().subscribe();

        let key: AccountKey = (username.to_string(), account_name.to_string());
        let token = self.cancel.child_token();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let watch = Watch {
            generation,
            token: token.clone(),
        };
        if let Some(previous) = lock(&self.watches).insert(key.clone(), watch) {
            previous.token.cancel();
        }
        tracing::debug!(
            username,
            account_name,
            "[ConnectionWatcher] Watching connection"
        );

        let usecase = self.usecase.clone();
        let watches = Arc::clone(&self.watches);
        tokio::spawn(async move {
            let failure = tokio::select! {
                _ = token.cancelled() => None,
                failure = next_failure(events) => failure,
            };
            {
                let mut watches = lock(&watches);
                // A newer watch may have replaced this one.
                if watches.get(&key).is_some_and(|w| w.generation == generation) {
                    watches.remove(&key);
                }
            }
            let (Some((code, message)), Some(usecase)) = (failure, usecase.upgrade()) else {
                return;
            };
            if let Err(e) = usecase
                .handle_client_error(&key.0, &key.1, code, &message)
                .await
            {
                tracing::warn!(
                    username = %key.0,
                    account_name = %key.1,
                    error = %e,
                    "[ConnectionWatcher] Could not apply connection failure"
                );
            }
        });
    }
}

/// Waits for the first event that ends the session.
async fn next_failure(
    mut events: broadcast::Receiver<ConnectionEvent>,
) -> Option<(TransportErrorCode, String)> {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::Error { code, message }) => return Some((code, message)),
            Ok(ConnectionEvent::Disconnected { message }) => {
                return Some((TransportErrorCode::NoConnection, message));
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "[ConnectionWatcher] Lagged behind connection events");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[async_trait]
impl EventHandler for ConnectionWatcher {
    fn name(&self) -> &str {
        "connection-watcher"
    }

    async fn handle(&self, event: &FarmEvent) -> Result<()> {
        if let FarmEvent::AccountLoggedIn {
            username,
            account_name,
            ..
        } = event
        {
            self.watch(username, account_name).await;
        }
        Ok(())
    }
}
