use super::*;
use crate::clock::ManualClock;
use crate::plan::PlanKind;
use crate::session::connection::OwnedGame;
use async_trait::async_trait;
use chrono::TimeZone;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Connection double that replays one scripted batch of events per `log_on`.
struct ScriptedConnection {
    events: broadcast::Sender<ConnectionEvent>,
    script: Mutex<VecDeque<Vec<ConnectionEvent>>>,
    played: Mutex<Vec<Vec<GameId>>>,
    credentials: Mutex<Vec<LoginCredentials>>,
    fail_games_played: AtomicBool,
    disconnected: AtomicBool,
}

impl ScriptedConnection {
    fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            events,
            script: Mutex::new(VecDeque::new()),
            played: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
            fail_games_played: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        })
    }

    fn on_next_login(&self, events: Vec<ConnectionEvent>) {
        self.script.lock().unwrap().push_back(events);
    }

    fn last_played(&self) -> Option<Vec<GameId>> {
        self.played.lock().unwrap().last().cloned()
    }

    fn last_credentials(&self) -> LoginCredentials {
        self.credentials.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl GameClientConnection for ScriptedConnection {
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    async fn log_on(&self, credentials: &LoginCredentials) -> crate::error::Result<()> {
        self.credentials.lock().unwrap().push(credentials.clone());
        let batch = self.script.lock().unwrap().pop_front().unwrap_or_default();
        for event in batch {
            let _ = self.events.send(event);
        }
        Ok(())
    }

    async fn games_played(&self, game_ids: &[GameId]) -> crate::error::Result<()> {
        if self.fail_games_played.load(Ordering::SeqCst) {
            return Err(HourboostError::transport("NoConnection", "socket closed"));
        }
        self.played.lock().unwrap().push(game_ids.to_vec());
        Ok(())
    }

    async fn set_persona(&self, _status: PersonaStatus) -> crate::error::Result<()> {
        Ok(())
    }

    async fn request_owned_games(&self) -> crate::error::Result<Vec<OwnedGame>> {
        Ok(vec![
            OwnedGame {
                app_id: 730,
                name: "Counter-Strike 2".to_string(),
                playtime_forever_mins: 10,
            },
            OwnedGame {
                app_id: 570,
                name: "Dota 2".to_string(),
                playtime_forever_mins: 0,
            },
        ])
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn plan(max_games: usize) -> PlanSnapshot {
    PlanSnapshot {
        plan_id: "plan-1".to_string(),
        name: "Usage".to_string(),
        kind: PlanKind::Usage {
            max_usage_time: 3600,
        },
        max_steam_accounts: 3,
        max_games_allowed: max_games,
        auto_restarter: true,
    }
}

fn build(
    connection: Arc<ScriptedConnection>,
    clock: Arc<ManualClock>,
    auto_restart: bool,
) -> SessionClient {
    SessionClient::new(SessionClientParams {
        user_id: "user-1".to_string(),
        username: "alice".to_string(),
        plan: plan(2),
        credentials: LoginCredentials::with_password("acc1", "hunter2"),
        auto_restart,
        connection,
        clock,
        guard_timeout: Duration::from_secs(30),
    })
}

fn logged_on() -> ConnectionEvent {
    ConnectionEvent::LoggedOn {
        refresh_token: Some("token-1".to_string()),
    }
}

fn guard() -> ConnectionEvent {
    ConnectionEvent::SteamGuard {
        domain: Some("mail.example".to_string()),
        last_code_wrong: false,
    }
}

async fn logged_in_client() -> (SessionClient, Arc<ScriptedConnection>, Arc<ManualClock>) {
    let connection = ScriptedConnection::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut client = build(connection.clone(), clock.clone(), true);
    connection.on_next_login(vec![logged_on()]);
    client.login().await.unwrap();
    assert_eq!(client.state(), SessionState::LoggedIn);
    (client, connection, clock)
}

#[tokio::test]
async fn test_guard_flow_ends_logged_in() {
    let connection = ScriptedConnection::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut client = build(connection.clone(), clock, false);

    connection.on_next_login(vec![guard()]);
    let outcome = client.login().await.unwrap();
    assert_eq!(
        outcome,
        LoginOutcome::SteamGuardRequired {
            domain: Some("mail.example".to_string())
        }
    );
    assert_eq!(client.state(), SessionState::AwaitingGuard);
    assert!(client.is_requiring_steam_guard());

    connection.on_next_login(vec![logged_on()]);
    let outcome = client.provide_guard("ABCDE").await.unwrap();
    assert_eq!(outcome, LoginOutcome::LoggedOn { resumed_games: None });
    assert_eq!(client.state(), SessionState::LoggedIn);
    assert!(!client.is_requiring_steam_guard());
    assert_eq!(
        connection.last_credentials().auth_code.as_deref(),
        Some("ABCDE")
    );
    assert_eq!(client.refresh_token(), Some("token-1"));
    assert_eq!(client.cache().refresh_token_plan_id.as_deref(), Some("plan-1"));
}

#[tokio::test]
async fn test_provide_guard_requires_awaiting_guard() {
    let connection = ScriptedConnection::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut client = build(connection, clock, false);

    let err = client.provide_guard("ABCDE").await.unwrap_err();
    assert!(matches!(err, HourboostError::InvalidState { .. }));
    assert_eq!(client.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_queued_events_are_tie_broken_by_priority() {
    let connection = ScriptedConnection::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut client = build(connection.clone(), clock, false);

    connection.on_next_login(vec![guard(), logged_on()]);
    let outcome = client.login().await.unwrap();
    assert_eq!(outcome, LoginOutcome::LoggedOn { resumed_games: None });

    client.disconnect(StopReason::SessionFinalize).await;
    connection.on_next_login(vec![
        logged_on(),
        ConnectionEvent::Error {
            code: TransportErrorCode::InvalidPassword,
            message: "bad password".to_string(),
        },
    ]);
    let outcome = client.login().await.unwrap();
    assert!(matches!(
        outcome,
        LoginOutcome::Failed {
            code: TransportErrorCode::InvalidPassword,
            ..
        }
    ));
    assert_eq!(client.state(), SessionState::Erroring);
}

#[tokio::test(start_paused = true)]
async fn test_login_timeout_is_retryable() {
    let connection = ScriptedConnection::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut client = build(connection.clone(), clock, false);

    let outcome = client.login().await.unwrap();
    assert_eq!(outcome, LoginOutcome::Timeout);
    assert_eq!(client.state(), SessionState::Idle);

    connection.on_next_login(vec![logged_on()]);
    let outcome = client.login().await.unwrap();
    assert_eq!(outcome, LoginOutcome::LoggedOn { resumed_games: None });
}

#[tokio::test]
async fn test_stop_under_negative_skew_clamps_to_zero() {
    let (mut client, connection, clock) = logged_in_client().await;

    client
        .start_farm(vec![730], Remaining::Unlimited)
        .await
        .unwrap();
    assert_eq!(client.state(), SessionState::Farming);
    assert_eq!(client.farm_started_at(), Some(t0()));
    assert_eq!(connection.last_played(), Some(vec![730]));

    clock.advance(chrono::Duration::seconds(-45));
    let stop = client.stop_farm(StopReason::Manual).await.unwrap();

    assert_eq!(stop.usage.amount_time_secs, 0);
    assert_eq!(stop.games, vec![730]);
    assert_eq!(client.state(), SessionState::LoggedIn);
    assert_eq!(client.farm_started_at(), None);
    assert_eq!(connection.last_played(), Some(vec![]));
}

#[tokio::test]
async fn test_stop_measures_elapsed_time() {
    let (mut client, _connection, clock) = logged_in_client().await;

    client
        .start_farm(vec![730, 570], Remaining::Limited(10_000))
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(900));
    assert_eq!(client.farming_elapsed_secs(), 900);

    let stop = client.stop_farm(StopReason::Manual).await.unwrap();
    assert_eq!(stop.usage.amount_time_secs, 900);
    assert_eq!(stop.usage.account_name, "acc1");
    assert_eq!(stop.usage.created_at, t0() + chrono::Duration::seconds(900));
}

#[tokio::test]
async fn test_start_farm_enforces_plan_limits() {
    let (mut client, _connection, _clock) = logged_in_client().await;

    let err = client
        .start_farm(vec![1, 2, 3], Remaining::Unlimited)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HourboostError::TooManyGames {
            requested: 3,
            max: 2
        }
    ));

    let err = client
        .start_farm(vec![730], Remaining::Limited(0))
        .await
        .unwrap_err();
    assert!(err.is_usage_exhausted());
    assert_eq!(client.state(), SessionState::LoggedIn);
    assert_eq!(client.farm_started_at(), None);
}

#[tokio::test]
async fn test_start_farm_requires_logged_in() {
    let connection = ScriptedConnection::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut client = build(connection, clock, false);

    let err = client
        .start_farm(vec![730], Remaining::Unlimited)
        .await
        .unwrap_err();
    assert!(matches!(err, HourboostError::InvalidState { .. }));
}

#[tokio::test]
async fn test_rejected_stop_keeps_farming() {
    let (mut client, connection, _clock) = logged_in_client().await;
    client
        .start_farm(vec![730], Remaining::Unlimited)
        .await
        .unwrap();

    connection.fail_games_played.store(true, Ordering::SeqCst);
    let err = client.stop_farm(StopReason::Manual).await.unwrap_err();

    assert!(err.is_transport());
    assert!(client.is_farming());
    assert_eq!(client.farm_started_at(), Some(t0()));
}

#[tokio::test]
async fn test_transport_error_interrupts_and_next_login_resumes() {
    let (mut client, connection, clock) = logged_in_client().await;
    client
        .start_farm(vec![730], Remaining::Unlimited)
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(120));

    let failure = client.handle_transport_error(TransportErrorCode::NoConnection);
    assert!(failure.restart_eligible);
    assert_eq!(
        failure.interrupted.as_ref().map(|s| s.usage.amount_time_secs),
        Some(120)
    );
    assert_eq!(client.state(), SessionState::Erroring);
    assert!(client.has_pending_resume());

    connection.on_next_login(vec![logged_on()]);
    let outcome = client.login().await.unwrap();
    assert_eq!(
        outcome,
        LoginOutcome::LoggedOn {
            resumed_games: Some(vec![730])
        }
    );
    assert!(client.is_farming());
    assert_eq!(
        client.farm_started_at(),
        Some(t0() + chrono::Duration::seconds(120))
    );
}

#[tokio::test]
async fn test_non_eligible_error_does_not_restart() {
    let (mut client, _connection, _clock) = logged_in_client().await;

    let failure = client.handle_transport_error(TransportErrorCode::InvalidPassword);
    assert!(!failure.restart_eligible);
    assert!(failure.interrupted.is_none());
    assert_eq!(client.state(), SessionState::Erroring);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_drops_pending_guard() {
    let connection = ScriptedConnection::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut client = build(connection.clone(), clock, false);

    connection.on_next_login(vec![guard()]);
    client.login().await.unwrap();
    assert_eq!(client.state(), SessionState::AwaitingGuard);

    client.handle_transport_error(TransportErrorCode::NoConnection);
    assert_eq!(client.state(), SessionState::Erroring);
    assert!(!client.is_requiring_steam_guard());
    assert_eq!(client.guard_domain(), None);

    let outcome = client.login().await.unwrap();
    assert_eq!(outcome, LoginOutcome::Timeout);
    assert_eq!(client.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_flushed_snapshot_resumes_from_login_time() {
    let connection = ScriptedConnection::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut client = build(connection.clone(), clock.clone(), true);

    let paused_at = t0() - chrono::Duration::seconds(1800);
    client.restore_from_cache(&CacheState::paused("acc1", vec![730], "plan-1", paused_at));

    connection.on_next_login(vec![logged_on()]);
    let outcome = client.login().await.unwrap();
    assert_eq!(
        outcome,
        LoginOutcome::LoggedOn {
            resumed_games: Some(vec![730])
        }
    );
    assert_eq!(client.farm_started_at(), Some(t0()));

    clock.advance(chrono::Duration::seconds(60));
    let stop = client.stop_farm(StopReason::Manual).await.unwrap();
    assert_eq!(stop.usage.amount_time_secs, 60);
}

#[tokio::test]
async fn test_restored_farm_resumes_with_cached_start() {
    let connection = ScriptedConnection::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut client = build(connection.clone(), clock.clone(), true);

    let started = t0() - chrono::Duration::seconds(300);
    client.restore_from_cache(&CacheState {
        account_name: "acc1".to_string(),
        is_farming: true,
        farm_started_at: Some(started),
        staged_game_list: vec![730, 570, 440],
        refresh_token_plan_id: Some("plan-1".to_string()),
        usage_flushed: false,
    });
    assert_eq!(client.state(), SessionState::Idle);
    assert!(!client.is_farming());
    assert_eq!(client.staged_game_list(), &[730, 570]);

    connection.on_next_login(vec![logged_on()]);
    client.login().await.unwrap();

    assert!(client.is_farming());
    assert_eq!(client.farm_started_at(), Some(started));
    assert_eq!(client.farming_elapsed_secs(), 300);
    assert_eq!(connection.last_played(), Some(vec![730, 570]));
}

#[tokio::test]
async fn test_disconnect_returns_running_usage() {
    let (mut client, connection, clock) = logged_in_client().await;
    client
        .start_farm(vec![730], Remaining::Unlimited)
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(60));

    let stop = client.disconnect(StopReason::SessionFinalize).await.unwrap();
    assert_eq!(stop.usage.amount_time_secs, 60);
    assert_eq!(stop.reason, StopReason::SessionFinalize);
    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(connection.disconnected.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_apply_plan_drops_excess_staged_games() {
    let (mut client, _connection, _clock) = logged_in_client().await;
    client.stage_games(vec![10, 20]).unwrap();

    let mut smaller = plan(1);
    smaller.plan_id = "plan-2".to_string();
    let dropped = client.apply_plan(&smaller);

    assert_eq!(dropped, vec![20]);
    assert_eq!(client.staged_game_list(), &[10]);
    assert_eq!(client.plan_id(), "plan-2");
}

#[tokio::test]
async fn test_refresh_owned_games_tracks_ids() {
    let (mut client, _connection, _clock) = logged_in_client().await;

    let games = client.refresh_owned_games().await.unwrap();
    assert_eq!(games.len(), 2);
    let known = client.last_known_games().unwrap();
    assert!(known.contains(&730) && known.contains(&570));
}
