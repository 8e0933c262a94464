//! Process-wide map of user registries.

use futures::stream::{self, BoxStream, StreamExt};
use hourboost_core::error::{HourboostError, Result};
use hourboost_core::plan::PlanSnapshot;
use hourboost_core::registry::{AccountRegistry, SessionContext, SharedClient};
use hourboost_core::session::AccountSummary;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Monitoring view of one user's accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub user_id: String,
    pub username: String,
    pub plan_id: String,
    pub accounts: Vec<AccountSummary>,
}

impl UserSummary {
    pub fn farming_count(&self) -> usize {
        self.accounts.iter().filter(|a| a.is_farming).count()
    }
}

/// Maps username to [`AccountRegistry`] for the lifetime of the process.
///
/// Entries are created lazily by [`FarmingClusterStorage::add`] and only
/// leave through [`FarmingClusterStorage::evict`].
pub struct FarmingClusterStorage {
    registries: Arc<RwLock<HashMap<String, Arc<AccountRegistry>>>>,
    context: SessionContext,
}

impl FarmingClusterStorage {
    pub fn new(context: SessionContext) -> Self {
        Self {
            registries: Arc::new(RwLock::new(HashMap::new())),
            context,
        }
    }

    /// Returns the registry of `username`, creating it if absent.
    ///
    /// An existing registry keeps its live clients; the plan is applied to
    /// them as well, cutting staged games over the new game limit.
    pub async fn add(
        &self,
        user_id: &str,
        username: &str,
        plan: PlanSnapshot,
    ) -> Arc<AccountRegistry> {
        let mut registries = self.registries.write().await;
        if let Some(existing) = registries.get(username) {
            let dropped = existing.set_plan(plan).await;
            if !dropped.is_empty() {
                tracing::debug!(
                    username,
                    accounts = dropped.len(),
                    "[FarmingClusterStorage] Staged games cut by plan update"
                );
            }
            return Arc::clone(existing);
        }

        tracing::info!(
            username,
            plan_id = %plan.plan_id,
            "[FarmingClusterStorage] Registry created"
        );
        let registry = Arc::new(AccountRegistry::new(
            user_id,
            username,
            plan,
            self.context.clone(),
        ));
        registries.insert(username.to_string(), Arc::clone(&registry));
        registry
    }

    /// Fails with `NotFound` for users that never farmed. Callers should
    /// treat that as a no-op signal.
    pub async fn get(&self, username: &str) -> Result<Arc<AccountRegistry>> {
        self.registries
            .read()
            .await
            .get(username)
            .cloned()
            .ok_or_else(|| HourboostError::not_found("UserStorage", username))
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.registries.read().await.contains_key(username)
    }

    pub async fn get_account_client(
        &self,
        username: &str,
        account_name: &str,
    ) -> Option<SharedClient> {
        let registry = self.registries.read().await.get(username).cloned()?;
        registry.get_account_client(account_name).await
    }

    /// Removes a user's registry. Its clients are left as they are.
    pub async fn evict(&self, username: &str) -> Option<Arc<AccountRegistry>> {
        let removed = self.registries.write().await.remove(username);
        if removed.is_some() {
            tracing::info!(username, "[FarmingClusterStorage] Registry evicted");
        }
        removed
    }

    pub async fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registries.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registries sorted by username.
    pub async fn registries(&self) -> Vec<Arc<AccountRegistry>> {
        let mut registries: Vec<_> = self.registries.read().await.values().cloned().collect();
        registries.sort_by(|a, b| a.username().cmp(b.username()));
        registries
    }

    pub async fn len(&self) -> usize {
        self.registries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Lazily produces one summary per user.
    ///
    /// The set of users is captured when the stream is created; each summary
    /// is computed when polled. Nothing is cached between calls.
    pub async fn list_users(&self) -> BoxStream<'static, UserSummary> {
        let registries = self.registries().await;
        stream::iter(registries)
            .then(|registry| async move {
                UserSummary {
                    user_id: registry.user_id().to_string(),
                    username: registry.username().to_string(),
                    plan_id: registry.plan().await.plan_id,
                    accounts: registry.summaries().await,
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hourboost_core::clock::SystemClock;
    use hourboost_core::plan::PlanKind;
    use hourboost_core::session::LoginCredentials;
    use hourboost_infrastructure::SimulatedConnectionFactory;
    use std::time::Duration;

    fn context() -> SessionContext {
        SessionContext {
            connections: Arc::new(SimulatedConnectionFactory::new()),
            clock: Arc::new(SystemClock),
            guard_timeout: Duration::from_secs(1),
        }
    }

    fn plan(id: &str, max_accounts: usize) -> PlanSnapshot {
        PlanSnapshot {
            plan_id: id.to_string(),
            name: id.to_string(),
            kind: PlanKind::Infinity,
            max_steam_accounts: max_accounts,
            max_games_allowed: 32,
            auto_restarter: false,
        }
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let storage = FarmingClusterStorage::new(context());
        let Err(err) = storage.get("nobody").await else {
            panic!("user was never added");
        };
        assert!(err.is_not_found());
        assert!(storage.get_account_client("nobody", "acc1").await.is_none());
    }

    #[tokio::test]
    async fn test_add_twice_keeps_clients_and_updates_plan() {
        let storage = FarmingClusterStorage::new(context());
        let registry = storage.add("u1", "alice", plan("free", 1)).await;
        registry
            .add(LoginCredentials::with_password("acc1", "pw"), false)
            .await
            .unwrap();

        let again = storage.add("u1", "alice", plan("gold", 3)).await;

        assert!(Arc::ptr_eq(&registry, &again));
        assert_eq!(again.plan().await.plan_id, "gold");
        assert!(storage.get_account_client("alice", "acc1").await.is_some());
        assert!(storage.get_account_client("alice", "acc2").await.is_none());
    }

    #[tokio::test]
    async fn test_add_applies_plan_to_live_clients() {
        let storage = FarmingClusterStorage::new(context());
        let registry = storage.add("u1", "alice", plan("gold", 2)).await;
        let client = registry
            .add(LoginCredentials::with_password("acc1", "pw"), false)
            .await
            .unwrap();
        client.lock().await.stage_games(vec![730, 570, 440]).unwrap();

        let mut free = plan("free", 1);
        free.max_games_allowed = 1;
        storage.add("u1", "alice", free).await;

        let mut client = client.lock().await;
        assert_eq!(client.plan_id(), "free");
        assert_eq!(client.staged_game_list(), &[730]);
        assert!(client.stage_games(vec![730, 570]).is_err());
    }

    #[tokio::test]
    async fn test_list_users_is_fresh_each_call() {
        let storage = FarmingClusterStorage::new(context());
        storage.add("u2", "bob", plan("free", 1)).await;
        let alice = storage.add("u1", "alice", plan("free", 2)).await;

        let first: Vec<UserSummary> = storage.list_users().await.collect().await;
        let names: Vec<_> = first.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob"]);
        assert!(first[0].accounts.is_empty());

        alice
            .add(LoginCredentials::with_password("acc1", "pw"), false)
            .await
            .unwrap();
        let second: Vec<UserSummary> = storage.list_users().await.collect().await;
        assert_eq!(second[0].accounts.len(), 1);
        assert_eq!(second[0].farming_count(), 0);
    }

    #[tokio::test]
    async fn test_evict_removes_registry() {
        let storage = FarmingClusterStorage::new(context());
        storage.add("u1", "alice", plan("free", 1)).await;

        assert!(storage.evict("alice").await.is_some());
        assert!(storage.evict("alice").await.is_none());
        assert!(storage.is_empty().await);
    }
}
