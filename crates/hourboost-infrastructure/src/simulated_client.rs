//! Offline game-client connection.
//!
//! Behaves like the real client from the cluster's point of view: logins
//! answer through connection events, guard codes are checked, and errors can
//! be injected at any time. Used by the CLI and by tests.

use async_trait::async_trait;
use hourboost_core::error::{HourboostError, Result};
use hourboost_core::session::{
    ConnectionEvent, ConnectionFactory, GameClientConnection, GameId, LoginCredentials,
    OwnedGame, PersonaStatus, TransportErrorCode,
};
use hourboost_core::sync::lock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 32;

/// Scriptable behavior of a [`SimulatedConnection`].
#[derive(Debug, Clone, Default)]
pub struct SimulatedBehavior {
    /// Guard code required on password logins.
    pub guard_code: Option<String>,
    /// Every login fails with this code.
    pub login_error: Option<TransportErrorCode>,
    /// Logins never answer.
    pub silent: bool,
    /// `games_played` fails.
    pub fail_games_played: bool,
    pub owned_games: Vec<OwnedGame>,
}

pub struct SimulatedConnection {
    account_name: String,
    events: broadcast::Sender<ConnectionEvent>,
    behavior: Mutex<SimulatedBehavior>,
    playing: Mutex<Vec<GameId>>,
    persona: Mutex<PersonaStatus>,
    logged_on: AtomicBool,
    issued_tokens: AtomicU32,
}

impl SimulatedConnection {
    pub fn new(account_name: impl Into<String>, behavior: SimulatedBehavior) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            account_name: account_name.into(),
            events,
            behavior: Mutex::new(behavior),
            playing: Mutex::new(Vec::new()),
            persona: Mutex::new(PersonaStatus::Offline),
            logged_on: AtomicBool::new(false),
            issued_tokens: AtomicU32::new(0),
        }
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn configure(&self, f: impl FnOnce(&mut SimulatedBehavior)) {
        f(&mut lock(&self.behavior));
    }

    pub fn is_logged_on(&self) -> bool {
        self.logged_on.load(Ordering::SeqCst)
    }

    /// Games currently marked as played.
    pub fn playing(&self) -> Vec<GameId> {
        lock(&self.playing).clone()
    }

    pub fn persona(&self) -> PersonaStatus {
        *lock(&self.persona)
    }

    /// Drops the session as if the client had reported `code`.
    pub fn inject_error(&self, code: TransportErrorCode, message: impl Into<String>) {
        self.logged_on.store(false, Ordering::SeqCst);
        lock(&self.playing).clear();
        let _ = self.events.send(ConnectionEvent::Error {
            code,
            message: message.into(),
        });
    }

    fn answer(&self, credentials: &LoginCredentials) -> Option<ConnectionEvent> {
        let behavior = lock(&self.behavior).clone();
        if behavior.silent {
            return None;
        }
        if let Some(code) = behavior.login_error {
            return Some(ConnectionEvent::Error {
                code,
                message: format!("simulated login failure for {}", self.account_name),
            });
        }

        let has_token = credentials.refresh_token.is_some();
        if let (Some(expected), false) = (&behavior.guard_code, has_token) {
            match credentials.auth_code.as_deref() {
                Some(code) if code == expected => {}
                supplied => {
                    return Some(ConnectionEvent::SteamGuard {
                        domain: Some("simulated.example".to_string()),
                        last_code_wrong: supplied.is_some(),
                    });
                }
            }
        }

        self.logged_on.store(true, Ordering::SeqCst);
        *lock(&self.persona) = PersonaStatus::Online;
        let n = self.issued_tokens.fetch_add(1, Ordering::SeqCst) + 1;
        Some(ConnectionEvent::LoggedOn {
            refresh_token: Some(format!("sim-{}-{}", self.account_name, n)),
        })
    }

    fn ensure_logged_on(&self) -> Result<()> {
        if self.is_logged_on() {
            Ok(())
        } else {
            Err(HourboostError::transport(
                TransportErrorCode::NoConnection.as_str(),
                format!("{} is not logged on", self.account_name),
            ))
        }
    }
}

#[async_trait]
impl GameClientConnection for SimulatedConnection {
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    async fn log_on(&self, credentials: &LoginCredentials) -> Result<()> {
        tracing::debug!(
            account_name = %self.account_name,
            "[SimulatedConnection] log_on"
        );
        if let Some(event) = self.answer(credentials) {
            let _ = self.events.send(event);
        }
        Ok(())
    }

    async fn games_played(&self, game_ids: &[GameId]) -> Result<()> {
        self.ensure_logged_on()?;
        if lock(&self.behavior).fail_games_played {
            return Err(HourboostError::transport(
                TransportErrorCode::ServiceUnavailable.as_str(),
                "simulated games_played failure",
            ));
        }
        *lock(&self.playing) = game_ids.to_vec();
        Ok(())
    }

    async fn set_persona(&self, status: PersonaStatus) -> Result<()> {
        self.ensure_logged_on()?;
        *lock(&self.persona) = status;
        Ok(())
    }

    async fn request_owned_games(&self) -> Result<Vec<OwnedGame>> {
        self.ensure_logged_on()?;
        Ok(lock(&self.behavior).owned_games.clone())
    }

    async fn disconnect(&self) {
        self.logged_on.store(false, Ordering::SeqCst);
        lock(&self.playing).clear();
        *lock(&self.persona) = PersonaStatus::Offline;
    }
}

/// Creates [`SimulatedConnection`]s and keeps them reachable by account name.
#[derive(Default)]
pub struct SimulatedConnectionFactory {
    defaults: SimulatedBehavior,
    connections: Mutex<HashMap<String, Arc<SimulatedConnection>>>,
}

impl SimulatedConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `behavior` to every connection created afterwards.
    pub fn with_defaults(behavior: SimulatedBehavior) -> Self {
        Self {
            defaults: behavior,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the connection of `account_name`, creating it with `behavior`
    /// if it does not exist yet.
    pub fn prepare(&self, account_name: &str, behavior: SimulatedBehavior) -> Arc<SimulatedConnection> {
        Arc::clone(
            lock(&self.connections)
                .entry(account_name.to_string())
                .or_insert_with(|| Arc::new(SimulatedConnection::new(account_name, behavior))),
        )
    }

    pub fn connection(&self, account_name: &str) -> Option<Arc<SimulatedConnection>> {
        lock(&self.connections).get(account_name).cloned()
    }
}

impl ConnectionFactory for SimulatedConnectionFactory {
    fn create(&self, account_name: &str) -> Arc<dyn GameClientConnection> {
        self.prepare(account_name, self.defaults.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(auth_code: Option<&str>) -> LoginCredentials {
        let mut credentials = LoginCredentials::with_password("acc1", "pw");
        credentials.auth_code = auth_code.map(str::to_string);
        credentials
    }

    #[tokio::test]
    async fn test_guard_code_is_checked() {
        let connection = SimulatedConnection::new(
            "acc1",
            SimulatedBehavior {
                guard_code: Some("ABCDE".to_string()),
                ..Default::default()
            },
        );
        let mut events = connection.subscribe();

        connection.log_on(&credentials(None)).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::SteamGuard {
                last_code_wrong: false,
                ..
            }
        ));

        connection.log_on(&credentials(Some("WRONG"))).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::SteamGuard {
                last_code_wrong: true,
                ..
            }
        ));

        connection.log_on(&credentials(Some("ABCDE"))).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::LoggedOn {
                refresh_token: Some(_)
            }
        ));
        assert!(connection.is_logged_on());
    }

    #[tokio::test]
    async fn test_games_played_requires_login() {
        let connection = SimulatedConnection::new("acc1", SimulatedBehavior::default());
        assert!(connection.games_played(&[730]).await.is_err());

        connection.log_on(&credentials(None)).await.unwrap();
        connection.games_played(&[730]).await.unwrap();
        assert_eq!(connection.playing(), vec![730]);

        connection.inject_error(TransportErrorCode::NoConnection, "lost");
        assert!(!connection.is_logged_on());
        assert!(connection.playing().is_empty());
    }

    #[test]
    fn test_factory_reuses_prepared_connection() {
        let factory = SimulatedConnectionFactory::new();
        let prepared = factory.prepare(
            "acc1",
            SimulatedBehavior {
                silent: true,
                ..Default::default()
            },
        );
        let _created = factory.create("acc1");

        let found = factory.connection("acc1").unwrap();
        assert!(Arc::ptr_eq(&prepared, &found));
    }
}
