//! Farming use case.
//!
//! `FarmingUseCase` is the command surface consumed by the request layer. It
//! drives registries and session clients, writes cache snapshots, and emits
//! lifecycle events once all per-account locks are released, so handlers can
//! call back into the cluster freely.

use crate::cluster_storage::FarmingClusterStorage;
use hourboost_core::error::{HourboostError, Result};
use hourboost_core::event::{EventDispatcher, FarmEvent};
use hourboost_core::plan::{Plan, PlanRepository};
use hourboost_core::registry::{AccountRegistry, PauseReport, SharedClient};
use hourboost_core::session::{
    AccountSummary, CacheRepository, CacheState, FarmStop, GameId, LoginOutcome, OwnedGame,
    PersonaStatus, SessionClient, StopReason, TransportErrorCode, TransportFailure,
};
use hourboost_core::usage::{Remaining, UsageEntry};
use hourboost_core::user::{SteamAccount, User, UsersRepository};
use std::sync::Arc;

/// Result of a plan change.
#[derive(Debug, Clone, Default)]
pub struct PlanChangeReport {
    /// Accounts removed because the new plan allows fewer, oldest first.
    pub trimmed_accounts: Vec<String>,
    /// Staged games dropped per account because the new plan allows fewer.
    pub dropped_games: Vec<(String, Vec<GameId>)>,
    /// Usage produced by the stops the change forced.
    pub usages: Vec<UsageEntry>,
}

/// Identity of an account as seen by events.
struct AccountRef {
    user_id: String,
    username: String,
    account_name: String,
    plan_id: String,
}

impl AccountRef {
    fn of(client: &SessionClient) -> Self {
        Self {
            user_id: client.user_id().to_string(),
            username: client.username().to_string(),
            account_name: client.account_name().to_string(),
            plan_id: client.plan_id().to_string(),
        }
    }
}

/// What a login left behind, captured while the client was locked.
struct LoginAttempt {
    outcome: LoginOutcome,
    account: AccountRef,
    restart_eligible: bool,
    cache: CacheState,
    refresh_token: Option<String>,
}

impl LoginAttempt {
    fn capture(client: &SessionClient, outcome: LoginOutcome) -> Self {
        let restart_eligible = match &outcome {
            LoginOutcome::Failed { code, .. } => client.restart_eligible(*code),
            _ => false,
        };
        Self {
            outcome,
            account: AccountRef::of(client),
            restart_eligible,
            cache: client.cache(),
            refresh_token: client.refresh_token().map(str::to_string),
        }
    }
}

pub struct FarmingUseCase {
    storage: Arc<FarmingClusterStorage>,
    dispatcher: Arc<EventDispatcher>,
    plan_repository: Arc<dyn PlanRepository>,
    users_repository: Arc<dyn UsersRepository>,
    cache_repository: Arc<dyn CacheRepository>,
}

impl FarmingUseCase {
    pub fn new(
        storage: Arc<FarmingClusterStorage>,
        dispatcher: Arc<EventDispatcher>,
        plan_repository: Arc<dyn PlanRepository>,
        users_repository: Arc<dyn UsersRepository>,
        cache_repository: Arc<dyn CacheRepository>,
    ) -> Self {
        Self {
            storage,
            dispatcher,
            plan_repository,
            users_repository,
            cache_repository,
        }
    }

    pub fn storage(&self) -> &Arc<FarmingClusterStorage> {
        &self.storage
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    // ============================================================================
    // Accounts
    // ============================================================================

    /// Attaches `account` to the user and registers an idle client for it.
    pub async fn add_account(&self, user_id: &str, account: SteamAccount) -> Result<AccountSummary> {
        let mut user = self.load_user(user_id).await?;
        let plan = self.load_plan(&user.plan_id).await?;
        let registry = self
            .storage
            .add(&user.id, &user.username, plan.snapshot())
            .await;

        let mut credentials = account.credentials();
        credentials.refresh_token = self.cached_refresh_token(&account.account_name).await;
        let client = registry
            .add(credentials, plan.auto_restarter && account.auto_relogin)
            .await?;
        let summary = client.lock().await.summary();

        if user.steam_account(&account.account_name).is_none() {
            user.steam_accounts.push(account);
            self.save_user(&user).await;
        }
        Ok(summary)
    }

    /// Removes an account, stopping its farm first. Absent accounts are a
    /// no-op and return `None`.
    pub async fn remove_account(
        &self,
        username: &str,
        account_name: &str,
    ) -> Result<Option<UsageEntry>> {
        let registry = self.storage.get(username).await?;
        let Some(removed) = registry.remove(account_name, StopReason::Manual).await else {
            return Ok(None);
        };

        let plan_id = registry.plan().await.plan_id;
        let usage = removed.usage().cloned();
        if let Some(stop) = removed.stop {
            self.emit_completed(
                registry.user_id(),
                username,
                &plan_id,
                stop.reason,
                vec![stop.usage],
            )
            .await;
        }

        self.detach_from_user(registry.user_id(), &[account_name.to_string()])
            .await;
        self.dispatcher
            .emit(FarmEvent::AccountRemoved {
                user_id: registry.user_id().to_string(),
                username: username.to_string(),
                account_name: account_name.to_string(),
            })
            .await;
        Ok(usage)
    }

    // ============================================================================
    // Login
    // ============================================================================

    pub async fn login(&self, username: &str, account_name: &str) -> Result<LoginOutcome> {
        let client = self.client(username, account_name).await?;
        let attempt = {
            let mut client = client.lock().await;
            let outcome = client.login().await?;
            LoginAttempt::capture(&client, outcome)
        };
        self.finish_login(attempt).await
    }

    pub async fn provide_guard(
        &self,
        username: &str,
        account_name: &str,
        code: &str,
    ) -> Result<LoginOutcome> {
        let client = self.client(username, account_name).await?;
        let attempt = {
            let mut client = client.lock().await;
            let outcome = client.provide_guard(code).await?;
            LoginAttempt::capture(&client, outcome)
        };
        self.finish_login(attempt).await
    }

    /// Logs a dropped account back on; a pending farm resumes on success.
    ///
    /// Accounts that are already logged in are left alone.
    pub async fn reconnect_and_resume(
        &self,
        username: &str,
        account_name: &str,
    ) -> Result<LoginOutcome> {
        let client = self.client(username, account_name).await?;
        let attempt = {
            let mut client = client.lock().await;
            if client.state().is_logged_in() {
                tracing::debug!(
                    username,
                    account_name,
                    "[FarmingUseCase] Already logged in, nothing to resume"
                );
                return Ok(LoginOutcome::LoggedOn {
                    resumed_games: None,
                });
            }
            tracing::info!(username, account_name, "[FarmingUseCase] Reconnecting");
            let outcome = client.login().await?;
            LoginAttempt::capture(&client, outcome)
        };
        self.finish_login(attempt).await
    }

    async fn finish_login(&self, attempt: LoginAttempt) -> Result<LoginOutcome> {
        let LoginAttempt {
            outcome,
            account,
            restart_eligible,
            cache,
            refresh_token,
        } = attempt;
        match &outcome {
            LoginOutcome::LoggedOn { resumed_games } => {
                if let Some(token) = refresh_token {
                    self.persist_refresh_token(&account, &token).await;
                }
                self.persist_cache(&cache).await;
                self.dispatcher
                    .emit(FarmEvent::AccountLoggedIn {
                        user_id: account.user_id.clone(),
                        username: account.username.clone(),
                        account_name: account.account_name.clone(),
                        resumed_games: resumed_games.clone(),
                    })
                    .await;
                if let (Some(games), Some(started_at)) = (resumed_games, cache.farm_started_at) {
                    self.dispatcher
                        .emit(FarmEvent::UserHasStartFarming {
                            user_id: account.user_id.clone(),
                            username: account.username.clone(),
                            account_name: account.account_name.clone(),
                            game_ids: games.clone(),
                            started_at,
                        })
                        .await;
                }
            }
            LoginOutcome::SteamGuardRequired { domain } => {
                self.dispatcher
                    .emit(FarmEvent::AccountRequiredSteamGuard {
                        user_id: account.user_id.clone(),
                        username: account.username.clone(),
                        account_name: account.account_name.clone(),
                        domain: domain.clone(),
                    })
                    .await;
            }
            LoginOutcome::Failed { code, message } => {
                self.dispatcher
                    .emit(FarmEvent::ErrorOccuredOnSteamClient {
                        user_id: account.user_id.clone(),
                        username: account.username.clone(),
                        account_name: account.account_name.clone(),
                        code: *code,
                        message: message.clone(),
                        restart_eligible,
                    })
                    .await;
            }
            LoginOutcome::Timeout => {
                tracing::info!(
                    username = %account.username,
                    account_name = %account.account_name,
                    "[FarmingUseCase] Login timed out, caller may retry"
                );
            }
        }
        Ok(outcome)
    }

    // ============================================================================
    // Farming
    // ============================================================================

    /// Starts farming `game_ids`. Capped plans are checked against their
    /// ledger plus the time every running farm of the user has not yet
    /// recorded.
    pub async fn start_farm(
        &self,
        username: &str,
        account_name: &str,
        game_ids: Vec<GameId>,
    ) -> Result<()> {
        let registry = self.storage.get(username).await?;
        let client = registry.get_account_client_or_err(account_name).await?;
        let remaining = self.remaining_for(&registry).await?;

        let (account, cache) = {
            let mut client = client.lock().await;
            client.start_farm(game_ids.clone(), remaining).await?;
            (AccountRef::of(&client), client.cache())
        };

        self.persist_cache(&cache).await;
        if let Some(started_at) = cache.farm_started_at {
            self.dispatcher
                .emit(FarmEvent::UserHasStartFarming {
                    user_id: account.user_id,
                    username: account.username,
                    account_name: account.account_name,
                    game_ids,
                    started_at,
                })
                .await;
        }
        Ok(())
    }

    pub async fn stop_farm(&self, username: &str, account_name: &str) -> Result<UsageEntry> {
        let client = self.client(username, account_name).await?;
        let (stop, account, cache) = {
            let mut client = client.lock().await;
            let stop = client.stop_farm(StopReason::Manual).await?;
            (stop, AccountRef::of(&client), client.cache())
        };

        self.persist_cache(&cache).await;
        let usage = stop.usage.clone();
        self.emit_completed(
            &account.user_id,
            &account.username,
            &account.plan_id,
            stop.reason,
            vec![stop.usage],
        )
        .await;
        Ok(usage)
    }

    pub async fn set_status(
        &self,
        username: &str,
        account_name: &str,
        status: PersonaStatus,
    ) -> Result<()> {
        let registry = self.storage.get(username).await?;
        registry.set_status(account_name, status).await
    }

    /// Fetches the owned games of a logged-in account and caches them.
    pub async fn refresh_owned_games(
        &self,
        username: &str,
        account_name: &str,
    ) -> Result<Vec<OwnedGame>> {
        let client = self.client(username, account_name).await?;
        let games = client.lock().await.refresh_owned_games().await?;
        if let Err(e) = self
            .cache_repository
            .set_account_games(account_name, &games)
            .await
        {
            tracing::warn!(
                account_name,
                error = %e,
                "[FarmingUseCase] Failed to cache owned games"
            );
        }
        Ok(games)
    }

    /// Owned games from the cache, falling back to the live client.
    pub async fn owned_games(&self, username: &str, account_name: &str) -> Result<Vec<OwnedGame>> {
        match self.cache_repository.get_account_games(account_name).await {
            Ok(Some(games)) => Ok(games),
            Ok(None) => self.refresh_owned_games(username, account_name).await,
            Err(e) => {
                tracing::warn!(
                    account_name,
                    error = %e,
                    "[FarmingUseCase] Cached games unavailable, asking the client"
                );
                self.refresh_owned_games(username, account_name).await
            }
        }
    }

    // ============================================================================
    // Plans and usage
    // ============================================================================

    /// Moves a user to `new_plan_id`.
    ///
    /// The registry gets the new limits, excess accounts are trimmed oldest
    /// first, staged lists are cut to the new game limit and farms running
    /// more games than allowed restart on the allowed prefix.
    pub async fn change_plan(&self, user_id: &str, new_plan_id: &str) -> Result<PlanChangeReport> {
        let mut user = self.load_user(user_id).await?;
        let plan = self.load_plan(new_plan_id).await?;
        let previous_plan_id = std::mem::replace(&mut user.plan_id, plan.id.clone());

        let registry = match self.storage.get(&user.username).await {
            Ok(registry) => registry,
            Err(e) if e.is_not_found() => {
                // Never farmed: only the stored user changes.
                self.save_user(&user).await;
                return Ok(PlanChangeReport::default());
            }
            Err(e) => return Err(e),
        };

        let snapshot = plan.snapshot();
        let dropped_games = registry.set_plan(snapshot.clone()).await;
        let trim = registry.trim_to_limit(snapshot.max_steam_accounts).await;
        let trimmed_accounts = trim.removed_names();

        let mut report = PlanChangeReport {
            usages: trim.usages(),
            dropped_games: dropped_games
                .into_iter()
                .filter(|(account_name, _)| !trimmed_accounts.contains(account_name))
                .collect(),
            trimmed_accounts,
        };

        let remaining = self.remaining_for(&registry).await?;
        for client in registry.clients().await {
            let mut client = client.lock().await;
            if client.is_farming() && client.exceeds_game_limit() {
                if let Some(stop) = self.restage_farm(&mut client, remaining).await {
                    report.usages.push(stop.usage);
                }
            }
            self.persist_cache(&client.cache()).await;
        }

        user.steam_accounts
            .retain(|a| !report.trimmed_accounts.contains(&a.account_name));
        self.save_user(&user).await;

        self.emit_completed(
            &user.id,
            &user.username,
            &previous_plan_id,
            StopReason::PlanDowngrade,
            report.usages.clone(),
        )
        .await;
        for account_name in &report.trimmed_accounts {
            self.dispatcher
                .emit(FarmEvent::AccountRemoved {
                    user_id: user.id.clone(),
                    username: user.username.clone(),
                    account_name: account_name.clone(),
                })
                .await;
        }
        self.dispatcher
            .emit(FarmEvent::UserChangedPlan {
                user_id: user.id.clone(),
                username: user.username.clone(),
                previous_plan_id,
                plan: snapshot,
                trimmed_accounts: report.trimmed_accounts.clone(),
            })
            .await;

        tracing::info!(
            username = %user.username,
            plan_id = %plan.id,
            trimmed = report.trimmed_accounts.len(),
            "[FarmingUseCase] Plan changed"
        );
        Ok(report)
    }

    /// Stops a farm running more games than allowed and restarts it on the
    /// allowed prefix. Returns the stop, if the stop succeeded.
    async fn restage_farm(&self, client: &mut SessionClient, remaining: Remaining) -> Option<FarmStop> {
        let stop = match client.stop_farm(StopReason::PlanDowngrade).await {
            Ok(stop) => stop,
            Err(e) => {
                tracing::warn!(
                    account_name = client.account_name(),
                    error = %e,
                    "[FarmingUseCase] Could not stop farm over the new game limit"
                );
                return None;
            }
        };
        let allowed = client.staged_game_list().to_vec();
        if !allowed.is_empty() {
            if let Err(e) = client.start_farm(allowed, remaining).await {
                tracing::warn!(
                    account_name = client.account_name(),
                    error = %e,
                    "[FarmingUseCase] Could not restart farm after plan change"
                );
            }
        }
        Some(stop)
    }

    /// Pauses every farm of `username` when its capped plan has no time left
    /// once in-flight farming is counted. Returns the pause, if one happened.
    pub async fn enforce_usage_limit(&self, username: &str) -> Result<Option<PauseReport>> {
        let registry = self.storage.get(username).await?;
        if registry.farming_count().await == 0 {
            return Ok(None);
        }
        let remaining = self.remaining_for(&registry).await?;
        if !remaining.is_exhausted() {
            return Ok(None);
        }

        let plan_id = registry.plan().await.plan_id;
        tracing::info!(
            username,
            plan_id = %plan_id,
            "[FarmingUseCase] Usage exhausted, pausing all farms"
        );
        let report = registry.pause_all(StopReason::UsageExhausted).await;
        self.sync_caches(&registry).await;
        self.emit_completed(
            registry.user_id(),
            username,
            &plan_id,
            StopReason::UsageExhausted,
            report.usages(),
        )
        .await;
        Ok(Some(report))
    }

    // ============================================================================
    // Errors and teardown
    // ============================================================================

    /// Applies a transport error reported by an account's connection.
    pub async fn handle_client_error(
        &self,
        username: &str,
        account_name: &str,
        code: TransportErrorCode,
        message: &str,
    ) -> Result<TransportFailure> {
        let client = self.client(username, account_name).await?;
        let (failure, account, cache) = {
            let mut client = client.lock().await;
            let failure = client.handle_transport_error(code);
            (failure, AccountRef::of(&client), client.cache())
        };

        tracing::warn!(
            username,
            account_name,
            code = %code,
            restart_eligible = failure.restart_eligible,
            "[FarmingUseCase] Steam client error"
        );
        self.persist_cache(&cache).await;
        if let Some(stop) = &failure.interrupted {
            self.emit_completed(
                &account.user_id,
                &account.username,
                &account.plan_id,
                stop.reason,
                vec![stop.usage.clone()],
            )
            .await;
        }
        self.dispatcher
            .emit(FarmEvent::ErrorOccuredOnSteamClient {
                user_id: account.user_id,
                username: account.username,
                account_name: account.account_name,
                code,
                message: message.to_string(),
                restart_eligible: failure.restart_eligible,
            })
            .await;
        Ok(failure)
    }

    /// Tears a user's session down: pauses every farm, flushes the usage,
    /// disconnects all clients and evicts the registry.
    ///
    /// Accounts that were farming are cached as paused farms with their usage
    /// flushed; a later restore resumes them and counts from the new login.
    pub async fn shutdown_user(&self, username: &str) -> Result<PauseReport> {
        let registry = self.storage.get(username).await?;
        let plan_id = registry.plan().await.plan_id;
        let report = registry.pause_all(StopReason::SessionFinalize).await;

        for stop in &report.stopped {
            let cache = CacheState::paused(
                stop.usage.account_name.clone(),
                stop.games.clone(),
                plan_id.clone(),
                stop.usage.created_at,
            );
            self.persist_cache(&cache).await;
        }

        self.emit_completed(
            registry.user_id(),
            username,
            &plan_id,
            StopReason::SessionFinalize,
            report.usages(),
        )
        .await;

        for client in registry.clients().await {
            let mut client = client.lock().await;
            if let Some(stop) = client.disconnect(StopReason::SessionFinalize).await {
                // Farms whose stop was rejected above still produce usage here.
                self.persist_cache(&CacheState::paused(
                    stop.usage.account_name.clone(),
                    stop.games.clone(),
                    plan_id.clone(),
                    stop.usage.created_at,
                ))
                .await;
                drop(client);
                self.emit_completed(
                    registry.user_id(),
                    username,
                    &plan_id,
                    StopReason::SessionFinalize,
                    vec![stop.usage],
                )
                .await;
            }
        }
        self.storage.evict(username).await;
        Ok(report)
    }

    /// Shuts every registered user down. Per-user failures are logged.
    pub async fn shutdown_all(&self) -> Vec<(String, PauseReport)> {
        let mut reports = Vec::new();
        for username in self.storage.usernames().await {
            match self.shutdown_user(&username).await {
                Ok(report) => reports.push((username, report)),
                Err(e) => tracing::warn!(
                    username = %username,
                    error = %e,
                    "[FarmingUseCase] Shutdown failed"
                ),
            }
        }
        reports
    }

    // ============================================================================
    // Helpers
    // ============================================================================

    async fn client(&self, username: &str, account_name: &str) -> Result<SharedClient> {
        self.storage
            .get(username)
            .await?
            .get_account_client_or_err(account_name)
            .await
    }

    async fn load_user(&self, user_id: &str) -> Result<User> {
        self.users_repository
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| HourboostError::not_found("User", user_id))
    }

    async fn load_plan(&self, plan_id: &str) -> Result<Plan> {
        self.plan_repository
            .get_by_id(plan_id)
            .await?
            .ok_or_else(|| HourboostError::not_found("Plan", plan_id))
    }

    async fn remaining_for(&self, registry: &AccountRegistry) -> Result<Remaining> {
        let plan = self.load_plan(&registry.plan().await.plan_id).await?;
        let remaining = plan.remaining();
        if remaining == Remaining::Unlimited {
            return Ok(remaining);
        }
        Ok(remaining.minus(registry.in_flight_secs().await))
    }

    async fn cached_refresh_token(&self, account_name: &str) -> Option<String> {
        match self.cache_repository.get_refresh_token(account_name).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(
                    account_name,
                    error = %e,
                    "[FarmingUseCase] Could not read refresh token"
                );
                None
            }
        }
    }

    async fn save_user(&self, user: &User) {
        if let Err(e) = self.users_repository.save(user).await {
            tracing::error!(
                user_id = %user.id,
                error = %e,
                "[FarmingUseCase] Failed to save user"
            );
        }
    }

    async fn detach_from_user(&self, user_id: &str, account_names: &[String]) {
        match self.load_user(user_id).await {
            Ok(mut user) => {
                let before = user.steam_accounts.len();
                user.steam_accounts
                    .retain(|a| !account_names.contains(&a.account_name));
                if user.steam_accounts.len() != before {
                    self.save_user(&user).await;
                }
            }
            Err(e) => tracing::warn!(
                user_id,
                error = %e,
                "[FarmingUseCase] Could not detach accounts from user"
            ),
        }
    }

    async fn persist_cache(&self, cache: &CacheState) {
        if let Err(e) = self.cache_repository.save(cache).await {
            tracing::error!(
                account_name = %cache.account_name,
                code = e.code(),
                error = %e,
                "[FarmingUseCase] Failed to save cache state"
            );
        }
    }

    async fn persist_refresh_token(&self, account: &AccountRef, token: &str) {
        let result = async {
            self.cache_repository
                .set_refresh_token(&account.account_name, token)
                .await?;
            self.cache_repository
                .set_refresh_token_plan_id(&account.account_name, &account.plan_id)
                .await
        }
        .await;
        if let Err(e) = result {
            tracing::error!(
                account_name = %account.account_name,
                error = %e,
                "[FarmingUseCase] Failed to save refresh token"
            );
        }
    }

    async fn sync_caches(&self, registry: &AccountRegistry) {
        for client in registry.clients().await {
            let cache = client.lock().await.cache();
            self.persist_cache(&cache).await;
        }
    }

    async fn emit_completed(
        &self,
        user_id: &str,
        username: &str,
        plan_id: &str,
        reason: StopReason,
        usages: Vec<UsageEntry>,
    ) {
        if usages.is_empty() {
            return;
        }
        self.dispatcher
            .emit(FarmEvent::UserCompleteFarmSession {
                user_id: user_id.to_string(),
                username: username.to_string(),
                plan_id: plan_id.to_string(),
                reason,
                usages,
            })
            .await;
    }
}

#[cfg(test)]
#[path = "farming_usecase_test.rs"]
mod tests;
