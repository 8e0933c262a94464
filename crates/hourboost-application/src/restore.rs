//! Startup restore of user registries from persisted state.

use crate::cluster_storage::FarmingClusterStorage;
use hourboost_core::error::Result;
use hourboost_core::event::{EventDispatcher, FarmEvent};
use hourboost_core::plan::{Plan, PlanRepository};
use hourboost_core::registry::AccountRegistry;
use hourboost_core::session::{CacheRepository, TransportErrorCode};
use hourboost_core::user::{SteamAccount, User, UsersRepository};
use serde::Serialize;
use std::sync::Arc;

/// A stored account that could not be attached to its registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachFailure {
    pub username: String,
    pub account_name: String,
    pub code: &'static str,
    pub message: String,
}

/// Counts of a restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub users: usize,
    pub accounts: usize,
    /// Accounts whose cache describes an interrupted farm.
    pub resumable: usize,
    /// Reconnects raised for resumable accounts.
    pub reconnects_requested: usize,
    /// Users skipped because their plan is missing.
    pub skipped_users: Vec<String>,
    pub attach_failures: Vec<AttachFailure>,
}

/// Rebuilds the cluster from the users store and the cache repository.
///
/// No connection is opened. Clients come back idle with their last known
/// state; interrupted farms resume on the next login. With `resume_on_restore`,
/// an `error-occured-on-steam-client` event is raised for each resumable
/// auto-restart account so the restart scheduler logs it back on.
pub struct RestoreOrchestrator {
    storage: Arc<FarmingClusterStorage>,
    dispatcher: Arc<EventDispatcher>,
    users_repository: Arc<dyn UsersRepository>,
    plan_repository: Arc<dyn PlanRepository>,
    cache_repository: Arc<dyn CacheRepository>,
    resume_on_restore: bool,
}

struct Reconnect {
    user_id: String,
    username: String,
    account_name: String,
}

impl RestoreOrchestrator {
    pub fn new(
        storage: Arc<FarmingClusterStorage>,
        dispatcher: Arc<EventDispatcher>,
        users_repository: Arc<dyn UsersRepository>,
        plan_repository: Arc<dyn PlanRepository>,
        cache_repository: Arc<dyn CacheRepository>,
        resume_on_restore: bool,
    ) -> Self {
        Self {
            storage,
            dispatcher,
            users_repository,
            plan_repository,
            cache_repository,
            resume_on_restore,
        }
    }

    pub async fn restore(&self) -> Result<RestoreReport> {
        let users = self.users_repository.list_all().await?;
        let mut report = RestoreReport::default();
        let mut reconnects = Vec::new();

        for user in users {
            let Some(plan) = self.plan_repository.get_by_id(&user.plan_id).await? else {
                tracing::warn!(
                    username = %user.username,
                    plan_id = %user.plan_id,
                    "[RestoreOrchestrator] Plan missing, user skipped"
                );
                report.skipped_users.push(user.username.clone());
                continue;
            };

            let registry = self
                .storage
                .add(&user.id, &user.username, plan.snapshot())
                .await;
            report.users += 1;

            for account in &user.steam_accounts {
                self.restore_account(
                    &user,
                    &plan,
                    &registry,
                    account,
                    &mut report,
                    &mut reconnects,
                )
                .await;
            }
        }

        if !report.attach_failures.is_empty() {
            tracing::warn!(
                failures = report.attach_failures.len(),
                "[RestoreOrchestrator] Some stored accounts could not be attached"
            );
        }

        for reconnect in reconnects {
            self.dispatcher
                .emit(FarmEvent::ErrorOccuredOnSteamClient {
                    user_id: reconnect.user_id,
                    username: reconnect.username,
                    account_name: reconnect.account_name,
                    code: TransportErrorCode::NoConnection,
                    message: "restored after process restart".to_string(),
                    restart_eligible: true,
                })
                .await;
            report.reconnects_requested += 1;
        }

        tracing::info!(
            users = report.users,
            accounts = report.accounts,
            resumable = report.resumable,
            "[RestoreOrchestrator] Restore finished"
        );
        Ok(report)
    }

    async fn restore_account(
        &self,
        user: &User,
        plan: &Plan,
        registry: &AccountRegistry,
        account: &SteamAccount,
        report: &mut RestoreReport,
        reconnects: &mut Vec<Reconnect>,
    ) {
        let account_name = account.account_name.as_str();
        if registry.get_account_client(account_name).await.is_some() {
            tracing::debug!(
                username = %user.username,
                account_name,
                "[RestoreOrchestrator] Account already attached"
            );
            return;
        }

        let mut credentials = account.credentials();
        let auto_restart = plan.auto_restarter && account.auto_relogin;
        let cached = async {
            credentials.refresh_token =
                self.cache_repository.get_refresh_token(account_name).await?;
            self.cache_repository.get(account_name).await
        }
        .await;

        let attached = match cached {
            Ok(cache) => registry
                .add(credentials, auto_restart)
                .await
                .map(|client| (client, cache)),
            Err(e) => Err(e),
        };

        let (client, cache) = match attached {
            Ok(attached) => attached,
            Err(e) => {
                tracing::warn!(
                    username = %user.username,
                    account_name,
                    error = %e,
                    "[RestoreOrchestrator] Failed to attach account"
                );
                report.attach_failures.push(AttachFailure {
                    username: user.username.clone(),
                    account_name: account_name.to_string(),
                    code: e.code(),
                    message: e.to_string(),
                });
                return;
            }
        };
        report.accounts += 1;

        let Some(cache) = cache else {
            return;
        };
        client.lock().await.restore_from_cache(&cache);

        if cache.is_resumable() {
            report.resumable += 1;
            if self.resume_on_restore && auto_restart {
                reconnects.push(Reconnect {
                    user_id: user.id.clone(),
                    username: user.username.clone(),
                    account_name: account_name.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "restore_test.rs"]
mod tests;
