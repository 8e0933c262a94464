use super::cache_state::CacheState;
use super::connection::{ConnectionEvent, GameClientConnection, GameId, TransportErrorCode};
use super::credentials::LoginCredentials;
use super::state::{PersonaStatus, SessionState, StopReason};
use crate::clock::Clock;
use crate::error::{HourboostError, Result};
use crate::plan::PlanSnapshot;
use crate::usage::{Remaining, UsageEntry, compute_usage, elapsed_secs};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Everything needed to build a [`SessionClient`].
pub struct SessionClientParams {
    pub user_id: String,
    pub username: String,
    pub plan: PlanSnapshot,
    pub credentials: LoginCredentials,
    pub auto_restart: bool,
    pub connection: Arc<dyn GameClientConnection>,
    pub clock: Arc<dyn Clock>,
    pub guard_timeout: Duration,
}

/// Result of one login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Logged on. `resumed_games` is set when an interrupted farm was resumed.
    LoggedOn { resumed_games: Option<Vec<GameId>> },
    /// A guard code is needed; call `provide_guard`.
    SteamGuardRequired { domain: Option<String> },
    /// The client reported an error; the session is now `erroring`.
    Failed {
        code: TransportErrorCode,
        message: String,
    },
    /// Nothing happened within the guard timeout. The session is back to
    /// `idle` and the caller may retry.
    Timeout,
}

/// A farm that stopped, with the usage it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarmStop {
    pub usage: UsageEntry,
    pub reason: StopReason,
    pub games: Vec<GameId>,
}

/// What happened when the connection failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub code: TransportErrorCode,
    /// Usage of the farm the error interrupted, if any.
    pub interrupted: Option<FarmStop>,
    /// Auto-restart is enabled and the code is reconnect-eligible.
    pub restart_eligible: bool,
}

/// Farm waiting for the next successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingResume {
    games: Vec<GameId>,
    /// Original start time restored from cache; `None` starts fresh.
    started_at: Option<DateTime<Utc>>,
}

/// Read-only view for monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub account_name: String,
    pub state: SessionState,
    pub is_farming: bool,
    pub farm_started_at: Option<DateTime<Utc>>,
    pub games: Vec<GameId>,
    pub requires_steam_guard: bool,
}

/// Wraps one third-party account connection and owns its state machine.
///
/// Transitions are plain `&mut self` methods; callers serialize access per
/// account (the registry keeps every client behind its own mutex), so no
/// transition can interleave with another on the same account.
pub struct SessionClient {
    user_id: String,
    username: String,
    account_name: String,
    plan_id: String,
    max_games_allowed: usize,
    state: SessionState,
    auto_restart: bool,
    is_requiring_steam_guard: bool,
    guard_domain: Option<String>,
    farm_started_at: Option<DateTime<Utc>>,
    staged_game_list: Vec<GameId>,
    playing_games: Vec<GameId>,
    last_known_games: Option<BTreeSet<GameId>>,
    refresh_token: Option<String>,
    refresh_token_plan_id: Option<String>,
    persona_status: PersonaStatus,
    last_error: Option<TransportErrorCode>,
    pending_resume: Option<PendingResume>,
    credentials: LoginCredentials,
    connection: Arc<dyn GameClientConnection>,
    clock: Arc<dyn Clock>,
    guard_timeout: Duration,
}

impl SessionClient {
    pub fn new(params: SessionClientParams) -> Self {
        let refresh_token = params.credentials.refresh_token.clone();
        Self {
            user_id: params.user_id,
            username: params.username,
            account_name: params.credentials.account_name.clone(),
            plan_id: params.plan.plan_id.clone(),
            max_games_allowed: params.plan.max_games_allowed,
            state: SessionState::Idle,
            auto_restart: params.auto_restart,
            is_requiring_steam_guard: false,
            guard_domain: None,
            farm_started_at: None,
            staged_game_list: Vec::new(),
            playing_games: Vec::new(),
            last_known_games: None,
            refresh_token,
            refresh_token_plan_id: None,
            persona_status: PersonaStatus::default(),
            last_error: None,
            pending_resume: None,
            credentials: params.credentials,
            connection: params.connection,
            clock: params.clock,
            guard_timeout: params.guard_timeout,
        }
    }

    // ============================================================================
    // Accessors
    // ============================================================================

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_farming(&self) -> bool {
        self.state == SessionState::Farming
    }

    pub fn is_requiring_steam_guard(&self) -> bool {
        self.is_requiring_steam_guard
    }

    pub fn guard_domain(&self) -> Option<&str> {
        self.guard_domain.as_deref()
    }

    pub fn auto_restart(&self) -> bool {
        self.auto_restart
    }

    pub fn set_auto_restart(&mut self, enabled: bool) {
        self.auto_restart = enabled;
    }

    pub fn farm_started_at(&self) -> Option<DateTime<Utc>> {
        self.farm_started_at
    }

    pub fn staged_game_list(&self) -> &[GameId] {
        &self.staged_game_list
    }

    pub fn playing_games(&self) -> &[GameId] {
        &self.playing_games
    }

    pub fn last_known_games(&self) -> Option<&BTreeSet<GameId>> {
        self.last_known_games.as_ref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn persona_status(&self) -> PersonaStatus {
        self.persona_status
    }

    pub fn last_error(&self) -> Option<TransportErrorCode> {
        self.last_error
    }

    pub fn has_pending_resume(&self) -> bool {
        self.pending_resume.is_some()
    }

    pub fn connection(&self) -> Arc<dyn GameClientConnection> {
        Arc::clone(&self.connection)
    }

    /// Seconds farmed so far in the running session, 0 when not farming.
    pub fn farming_elapsed_secs(&self) -> u64 {
        self.farm_started_at
            .map(|started| elapsed_secs(started, self.clock.now()).unwrap_or(0))
            .unwrap_or(0)
    }

    /// True when a restart should be attempted after `code`.
    pub fn restart_eligible(&self, code: TransportErrorCode) -> bool {
        self.auto_restart && code.is_reconnect_eligible()
    }

    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            account_name: self.account_name.clone(),
            state: self.state,
            is_farming: self.is_farming(),
            farm_started_at: self.farm_started_at,
            games: if self.is_farming() {
                self.playing_games.clone()
            } else {
                self.staged_game_list.clone()
            },
            requires_steam_guard: self.is_requiring_steam_guard,
        }
    }

    /// Durable snapshot for the cache repository.
    pub fn cache(&self) -> CacheState {
        CacheState {
            account_name: self.account_name.clone(),
            is_farming: self.is_farming(),
            farm_started_at: self.farm_started_at,
            staged_game_list: self.staged_game_list.clone(),
            refresh_token_plan_id: self.refresh_token_plan_id.clone(),
            usage_flushed: false,
        }
    }

    // ============================================================================
    // Login / guard
    // ============================================================================

    /// Starts a login and waits for its first outcome.
    ///
    /// Races `loggedOn`, `steamGuard` and `error` against the guard timeout.
    /// Events that are already queued when the first one arrives are compared
    /// by priority `error > loggedOn > steamGuard`, so the result does not
    /// depend on delivery order within one tick.
    pub async fn login(&mut self) -> Result<LoginOutcome> {
        if !self.state.can_login() {
            return Err(self.invalid_state("login"));
        }

        let mut events = self.connection.subscribe();
        let credentials = self.login_credentials();
        self.transition(SessionState::Connecting);

        if let Err(e) = self.connection.log_on(&credentials).await {
            tracing::warn!(
                account_name = %self.account_name,
                error = %e,
                "[SessionClient] log_on call failed"
            );
            self.last_error = Some(TransportErrorCode::NoConnection);
            self.transition(SessionState::Erroring);
            return Ok(LoginOutcome::Failed {
                code: TransportErrorCode::NoConnection,
                message: e.to_string(),
            });
        }

        let race = race_login_events(&mut events, self.guard_timeout).await;
        Ok(self.apply_login_race(race).await)
    }

    /// Re-attempts the pending login with a guard code.
    pub async fn provide_guard(&mut self, code: impl Into<String>) -> Result<LoginOutcome> {
        if self.state != SessionState::AwaitingGuard {
            return Err(self.invalid_state("provide a guard code"));
        }
        self.credentials.auth_code = Some(code.into());
        self.login().await
    }

    fn login_credentials(&self) -> LoginCredentials {
        let mut credentials = self.credentials.clone();
        if credentials.auth_code.is_none() && self.refresh_token.is_some() {
            credentials.refresh_token = self.refresh_token.clone();
            credentials.password = None;
        }
        credentials
    }

    async fn apply_login_race(&mut self, race: LoginRace) -> LoginOutcome {
        match race {
            LoginRace::LoggedOn { refresh_token } => {
                self.is_requiring_steam_guard = false;
                self.guard_domain = None;
                self.credentials.auth_code = None;
                self.last_error = None;
                if let Some(token) = refresh_token {
                    self.refresh_token = Some(token);
                    self.refresh_token_plan_id = Some(self.plan_id.clone());
                }
                self.transition(SessionState::LoggedIn);
                let resumed_games = self.resume_pending_farm().await;
                LoginOutcome::LoggedOn { resumed_games }
            }
            LoginRace::SteamGuard { domain } => {
                self.is_requiring_steam_guard = true;
                self.guard_domain = domain.clone();
                self.credentials.auth_code = None;
                self.transition(SessionState::AwaitingGuard);
                LoginOutcome::SteamGuardRequired { domain }
            }
            LoginRace::Error { code, message } => {
                self.credentials.auth_code = None;
                self.last_error = Some(code);
                self.transition(SessionState::Erroring);
                LoginOutcome::Failed { code, message }
            }
            LoginRace::Timeout => {
                tracing::warn!(
                    account_name = %self.account_name,
                    timeout_secs = self.guard_timeout.as_secs(),
                    "[SessionClient] Login timed out"
                );
                // A guard prompt stays answerable after a timed-out retry.
                let next = if self.is_requiring_steam_guard {
                    SessionState::AwaitingGuard
                } else {
                    SessionState::Idle
                };
                self.transition(next);
                LoginOutcome::Timeout
            }
        }
    }

    async fn resume_pending_farm(&mut self) -> Option<Vec<GameId>> {
        let pending = self.pending_resume.take()?;
        let mut games = pending.games;
        games.truncate(self.max_games_allowed);
        if games.is_empty() {
            return None;
        }

        if let Err(e) = self.connection.games_played(&games).await {
            tracing::warn!(
                account_name = %self.account_name,
                error = %e,
                "[SessionClient] Could not resume farm after login"
            );
            self.pending_resume = Some(PendingResume {
                games,
                started_at: pending.started_at,
            });
            return None;
        }

        let now = self.clock.now();
        self.farm_started_at = Some(pending.started_at.unwrap_or(now));
        self.staged_game_list = games.clone();
        self.playing_games = games.clone();
        self.transition(SessionState::Farming);
        Some(games)
    }

    // ============================================================================
    // Farming
    // ============================================================================

    /// Replaces the staged game list without starting a farm.
    pub fn stage_games(&mut self, game_ids: Vec<GameId>) -> Result<()> {
        self.check_game_limit(game_ids.len())?;
        self.staged_game_list = game_ids;
        Ok(())
    }

    /// `loggedIn -> farming`.
    ///
    /// `remaining` is the plan's time left; capped plans with nothing left
    /// fail with `UsageExhausted`.
    pub async fn start_farm(&mut self, game_ids: Vec<GameId>, remaining: Remaining) -> Result<()> {
        if self.state != SessionState::LoggedIn {
            return Err(self.invalid_state("start farming"));
        }
        if game_ids.is_empty() {
            return Err(self.invalid_state("farm an empty game list"));
        }
        self.check_game_limit(game_ids.len())?;
        if remaining.is_exhausted() {
            return Err(HourboostError::UsageExhausted {
                plan_id: self.plan_id.clone(),
            });
        }

        self.connection.games_played(&game_ids).await?;

        self.farm_started_at = Some(self.clock.now());
        self.staged_game_list = game_ids.clone();
        self.playing_games = game_ids;
        self.pending_resume = None;
        self.transition(SessionState::Farming);
        Ok(())
    }

    /// `farming -> loggedIn`, producing the usage of the stopped interval.
    ///
    /// If the client rejects the stop, nothing changes and the error is
    /// returned; the session keeps farming.
    pub async fn stop_farm(&mut self, reason: StopReason) -> Result<FarmStop> {
        if self.state != SessionState::Farming {
            return Err(self.invalid_state("stop farming"));
        }
        self.connection.games_played(&[]).await?;

        let stop = self.take_farm(reason);
        self.transition(SessionState::LoggedIn);
        Ok(stop)
    }

    /// Clears the running farm and returns its usage. Caller sets the next state.
    fn take_farm(&mut self, reason: StopReason) -> FarmStop {
        let end = self.clock.now();
        let start = self.farm_started_at.take().unwrap_or(end);
        let usage = compute_usage(&self.account_name, start, end);
        let games = std::mem::take(&mut self.playing_games);
        tracing::info!(
            target: "hourboost::lifecycle",
            account_name = %self.account_name,
            amount_time_secs = usage.amount_time_secs,
            reason = ?reason,
            "[SessionClient] Farm stopped"
        );
        FarmStop {
            usage,
            reason,
            games,
        }
    }

    fn check_game_limit(&self, requested: usize) -> Result<()> {
        if requested > self.max_games_allowed {
            return Err(HourboostError::TooManyGames {
                requested,
                max: self.max_games_allowed,
            });
        }
        Ok(())
    }

    // ============================================================================
    // Errors / teardown
    // ============================================================================

    /// `* -> erroring` after the connection reported `code`.
    ///
    /// A running farm is closed locally (the connection is gone, so it is not
    /// asked to stop playing) and remembered so the next login resumes it.
    /// A pending guard prompt is dropped.
    pub fn handle_transport_error(&mut self, code: TransportErrorCode) -> TransportFailure {
        let interrupted = if self.is_farming() {
            let stop = self.take_farm(StopReason::ClientError);
            self.pending_resume = Some(PendingResume {
                games: stop.games.clone(),
                started_at: None,
            });
            Some(stop)
        } else {
            None
        };

        // A guard prompt does not survive the connection it was issued on.
        self.is_requiring_steam_guard = false;
        self.guard_domain = None;
        self.credentials.auth_code = None;
        self.last_error = Some(code);
        self.transition(SessionState::Erroring);

        TransportFailure {
            code,
            interrupted,
            restart_eligible: self.restart_eligible(code),
        }
    }

    /// `* -> disconnected`. Returns the usage of a farm that was running.
    pub async fn disconnect(&mut self, reason: StopReason) -> Option<FarmStop> {
        let stop = if self.is_farming() {
            if let Err(e) = self.connection.games_played(&[]).await {
                tracing::debug!(
                    account_name = %self.account_name,
                    error = %e,
                    "[SessionClient] Ignoring stop failure during disconnect"
                );
            }
            Some(self.take_farm(reason))
        } else {
            None
        };

        self.connection.disconnect().await;
        self.pending_resume = None;
        self.is_requiring_steam_guard = false;
        self.guard_domain = None;
        self.transition(SessionState::Disconnected);
        stop
    }

    // ============================================================================
    // Misc operations
    // ============================================================================

    pub async fn set_status(&mut self, status: PersonaStatus) -> Result<()> {
        if !self.state.is_logged_in() {
            return Err(self.invalid_state("change persona status"));
        }
        self.connection.set_persona(status).await?;
        self.persona_status = status;
        Ok(())
    }

    /// Asks the client for the owned game list and remembers its ids.
    pub async fn refresh_owned_games(&mut self) -> Result<Vec<super::connection::OwnedGame>> {
        if !self.state.is_logged_in() {
            return Err(self.invalid_state("request owned games"));
        }
        let games = self.connection.request_owned_games().await?;
        self.last_known_games = Some(games.iter().map(|g| g.app_id).collect());
        Ok(games)
    }

    /// Applies new plan limits. Returns staged games dropped by a smaller
    /// `max_games_allowed`. A running farm is left alone; the caller restarts
    /// it when [`SessionClient::exceeds_game_limit`] reports true.
    pub fn apply_plan(&mut self, plan: &PlanSnapshot) -> Vec<GameId> {
        self.plan_id = plan.plan_id.clone();
        self.max_games_allowed = plan.max_games_allowed;
        if self.staged_game_list.len() > plan.max_games_allowed {
            self.staged_game_list.split_off(plan.max_games_allowed)
        } else {
            Vec::new()
        }
    }

    pub fn exceeds_game_limit(&self) -> bool {
        self.playing_games.len() > self.max_games_allowed
    }

    /// Seeds an idle client from a persisted snapshot.
    ///
    /// No connection is made. An interrupted farm is kept as pending and
    /// resumes, with its original start time, on the next successful login.
    pub fn restore_from_cache(&mut self, cache: &CacheState) {
        let mut staged = cache.staged_game_list.clone();
        staged.truncate(self.max_games_allowed);
        self.staged_game_list = staged.clone();
        self.refresh_token_plan_id = cache.refresh_token_plan_id.clone();
        if cache.is_resumable() {
            // Flushed snapshots already billed up to the pause; the time the
            // process was down is not farmed.
            let started_at = if cache.usage_flushed {
                None
            } else {
                cache.farm_started_at
            };
            self.pending_resume = Some(PendingResume {
                games: staged,
                started_at,
            });
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        tracing::info!(
            target: "hourboost::lifecycle",
            username = %self.username,
            account_name = %self.account_name,
            from = %self.state,
            to = %next,
            "[SessionClient] State transition"
        );
        self.state = next;
        debug_assert_eq!(
            self.farm_started_at.is_some(),
            self.state == SessionState::Farming,
            "farm_started_at must be set exactly while farming"
        );
    }

    fn invalid_state(&self, action: &'static str) -> HourboostError {
        HourboostError::InvalidState {
            account_name: self.account_name.clone(),
            state: self.state.to_string(),
            action,
        }
    }
}

/// First login-relevant event, after tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoginRace {
    LoggedOn { refresh_token: Option<String> },
    SteamGuard { domain: Option<String> },
    Error {
        code: TransportErrorCode,
        message: String,
    },
    Timeout,
}

impl LoginRace {
    fn from_event(event: ConnectionEvent) -> Self {
        match event {
            ConnectionEvent::LoggedOn { refresh_token } => LoginRace::LoggedOn { refresh_token },
            ConnectionEvent::SteamGuard { domain, .. } => LoginRace::SteamGuard { domain },
            ConnectionEvent::Error { code, message } => LoginRace::Error { code, message },
            ConnectionEvent::Disconnected { message } => LoginRace::Error {
                code: TransportErrorCode::NoConnection,
                message,
            },
        }
    }

    fn priority(&self) -> u8 {
        match self {
            LoginRace::Error { .. } => 3,
            LoginRace::LoggedOn { .. } => 2,
            LoginRace::SteamGuard { .. } => 1,
            LoginRace::Timeout => 0,
        }
    }
}

async fn race_login_events(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    timeout: Duration,
) -> LoginRace {
    let first = match tokio::time::timeout(timeout, next_event(events)).await {
        Err(_) => return LoginRace::Timeout,
        Ok(None) => {
            return LoginRace::Error {
                code: TransportErrorCode::NoConnection,
                message: "connection event stream closed".to_string(),
            };
        }
        Ok(Some(event)) => LoginRace::from_event(event),
    };

    let mut winner = first;
    loop {
        match events.try_recv() {
            Ok(event) => {
                let candidate = LoginRace::from_event(event);
                if candidate.priority() > winner.priority() {
                    winner = candidate;
                }
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    winner
}

async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> Option<ConnectionEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "[SessionClient] Lagged behind connection events");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
