use super::outcome::{AccountError, PauseReport, RemovedAccount, TrimReport};
use crate::clock::Clock;
use crate::error::{HourboostError, Result};
use crate::plan::PlanSnapshot;
use crate::session::{
    AccountSummary, ConnectionFactory, GameId, LoginCredentials, PersonaStatus, SessionClient,
    SessionClientParams, StopReason,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// A session client shared between the registry and in-flight operations.
///
/// The mutex serializes transitions on one account.
pub type SharedClient = Arc<Mutex<SessionClient>>;

/// Process-scoped collaborators every new session client needs.
#[derive(Clone)]
pub struct SessionContext {
    pub connections: Arc<dyn ConnectionFactory>,
    pub clock: Arc<dyn Clock>,
    pub guard_timeout: Duration,
}

#[derive(Default)]
struct AccountMap {
    clients: HashMap<String, SharedClient>,
    /// Account names, oldest first.
    order: Vec<String>,
}

impl AccountMap {
    fn insert(&mut self, account_name: String, client: SharedClient) {
        self.order.push(account_name.clone());
        self.clients.insert(account_name, client);
    }

    fn remove(&mut self, account_name: &str) -> Option<SharedClient> {
        let client = self.clients.remove(account_name)?;
        self.order.retain(|name| name != account_name);
        Some(client)
    }

    fn ordered(&self) -> Vec<(String, SharedClient)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.clients
                    .get(name)
                    .map(|client| (name.clone(), Arc::clone(client)))
            })
            .collect()
    }
}

/// Owns the session clients of one user and enforces the plan's quotas.
pub struct AccountRegistry {
    user_id: String,
    username: String,
    plan: RwLock<PlanSnapshot>,
    accounts: RwLock<AccountMap>,
    context: SessionContext,
}

impl AccountRegistry {
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        plan: PlanSnapshot,
        context: SessionContext,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            plan: RwLock::new(plan),
            accounts: RwLock::new(AccountMap::default()),
            context,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub async fn plan(&self) -> PlanSnapshot {
        self.plan.read().await.clone()
    }

    /// Replaces the plan snapshot and applies it to every live client.
    ///
    /// Staged games beyond the new game limit are cut; the cut games are
    /// returned per account, oldest account first. Running farms keep their
    /// games until the caller restages them.
    pub async fn set_plan(&self, plan: PlanSnapshot) -> Vec<(String, Vec<GameId>)> {
        *self.plan.write().await = plan.clone();

        let clients = self.accounts.read().await.ordered();
        let mut dropped = Vec::new();
        for (account_name, client) in clients {
            let cut = client.lock().await.apply_plan(&plan);
            if !cut.is_empty() {
                dropped.push((account_name, cut));
            }
        }
        dropped
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.clients.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Account names in insertion order, oldest first.
    pub async fn account_names(&self) -> Vec<String> {
        self.accounts.read().await.order.clone()
    }

    /// Clients in insertion order.
    pub async fn clients(&self) -> Vec<SharedClient> {
        self.accounts
            .read()
            .await
            .ordered()
            .into_iter()
            .map(|(_, client)| client)
            .collect()
    }

    /// Registers a new idle client for `credentials.account_name`.
    pub async fn add(&self, credentials: LoginCredentials, auto_restart: bool) -> Result<SharedClient> {
        let plan = self.plan().await;
        let mut accounts = self.accounts.write().await;

        if accounts.clients.contains_key(&credentials.account_name) {
            return Err(HourboostError::already_exists(
                "SteamAccount",
                credentials.account_name.clone(),
            ));
        }
        if accounts.clients.len() >= plan.max_steam_accounts {
            return Err(HourboostError::AccountLimitReached {
                max: plan.max_steam_accounts,
            });
        }

        let account_name = credentials.account_name.clone();
        let client = SessionClient::new(SessionClientParams {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            connection: self.context.connections.create(&account_name),
            clock: Arc::clone(&self.context.clock),
            guard_timeout: self.context.guard_timeout,
            plan,
            credentials,
            auto_restart,
        });
        let client = Arc::new(Mutex::new(client));
        accounts.insert(account_name.clone(), Arc::clone(&client));

        tracing::info!(
            username = %self.username,
            account_name = %account_name,
            accounts = accounts.clients.len(),
            "[AccountRegistry] Account added"
        );
        Ok(client)
    }

    /// Evicts an account, stopping its farm first.
    ///
    /// Returns `None` when the account is not registered. Calling it twice is
    /// a no-op the second time.
    pub async fn remove(&self, account_name: &str, reason: StopReason) -> Option<RemovedAccount> {
        let client = self.accounts.write().await.remove(account_name)?;

        let stop = client.lock().await.disconnect(reason).await;
        tracing::info!(
            username = %self.username,
            account_name,
            farmed_secs = stop.as_ref().map(|s| s.usage.amount_time_secs),
            "[AccountRegistry] Account removed"
        );
        Some(RemovedAccount {
            account_name: account_name.to_string(),
            stop,
        })
    }

    /// Removes the oldest accounts until at most `new_max` remain.
    pub async fn trim_to_limit(&self, new_max: usize) -> TrimReport {
        let excess: Vec<String> = {
            let accounts = self.accounts.read().await;
            let count = accounts.order.len().saturating_sub(new_max);
            accounts.order.iter().take(count).cloned().collect()
        };

        if excess.is_empty() {
            return TrimReport::default();
        }

        tracing::info!(
            username = %self.username,
            new_max,
            excess = ?excess,
            "[AccountRegistry] Trimming accounts to plan limit"
        );

        let mut report = TrimReport::default();
        for account_name in excess {
            if let Some(removed) = self.remove(&account_name, StopReason::PlanDowngrade).await {
                report.removed.push(removed);
            }
        }
        report
    }

    /// Stops every farming client. Failures are collected per account and do
    /// not interrupt the remaining stops.
    pub async fn pause_all(&self, reason: StopReason) -> PauseReport {
        let mut report = PauseReport::default();
        let accounts = self.accounts.read().await.ordered();

        for (account_name, client) in accounts {
            let mut client = client.lock().await;
            if !client.is_farming() {
                continue;
            }
            match client.stop_farm(reason).await {
                Ok(stop) => report.stopped.push(stop),
                Err(error) => {
                    tracing::warn!(
                        username = %self.username,
                        account_name = %account_name,
                        error = %error,
                        "[AccountRegistry] Failed to pause account"
                    );
                    report.errors.push(AccountError {
                        account_name,
                        error,
                    });
                }
            }
        }
        report
    }

    pub async fn set_status(&self, account_name: &str, status: PersonaStatus) -> Result<()> {
        let client = self.get_account_client_or_err(account_name).await?;
        let mut client = client.lock().await;
        client.set_status(status).await
    }

    pub async fn get_account_client(&self, account_name: &str) -> Option<SharedClient> {
        self.accounts.read().await.clients.get(account_name).cloned()
    }

    /// Like [`AccountRegistry::get_account_client`], for callers that already
    /// validated the account exists.
    pub async fn get_account_client_or_err(&self, account_name: &str) -> Result<SharedClient> {
        self.get_account_client(account_name)
            .await
            .ok_or_else(|| HourboostError::not_found("SteamAccount", account_name))
    }

    pub async fn summaries(&self) -> Vec<AccountSummary> {
        let mut summaries = Vec::new();
        for client in self.clients().await {
            summaries.push(client.lock().await.summary());
        }
        summaries
    }

    /// Seconds farmed by running sessions that are not yet in the ledger.
    pub async fn in_flight_secs(&self) -> u64 {
        let mut total = 0u64;
        for client in self.clients().await {
            total = total.saturating_add(client.lock().await.farming_elapsed_secs());
        }
        total
    }

    pub async fn farming_count(&self) -> usize {
        let mut count = 0;
        for client in self.clients().await {
            if client.lock().await.is_farming() {
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
#[path = "account_registry_test.rs"]
mod tests;
