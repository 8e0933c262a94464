//! Test doubles shared by the unit tests of this crate.

use crate::error::{HourboostError, Result};
use crate::session::{
    ConnectionEvent, ConnectionFactory, GameClientConnection, GameId, LoginCredentials,
    OwnedGame, PersonaStatus,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Logs on immediately; `games_played` can be made to fail.
pub struct StubConnection {
    events: broadcast::Sender<ConnectionEvent>,
    pub fail_games_played: AtomicBool,
}

impl StubConnection {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            events,
            fail_games_played: AtomicBool::new(false),
        }
    }

    pub fn fail_next_stops(&self) {
        self.fail_games_played.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GameClientConnection for StubConnection {
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    async fn log_on(&self, _credentials: &LoginCredentials) -> Result<()> {
        let _ = self.events.send(ConnectionEvent::LoggedOn {
            refresh_token: None,
        });
        Ok(())
    }

    async fn games_played(&self, _game_ids: &[GameId]) -> Result<()> {
        if self.fail_games_played.load(Ordering::SeqCst) {
            return Err(HourboostError::transport("NoConnection", "client gone"));
        }
        Ok(())
    }

    async fn set_persona(&self, _status: PersonaStatus) -> Result<()> {
        Ok(())
    }

    async fn request_owned_games(&self) -> Result<Vec<OwnedGame>> {
        Ok(Vec::new())
    }

    async fn disconnect(&self) {}
}

/// Hands out one [`StubConnection`] per account and keeps them reachable.
#[derive(Default)]
pub struct StubFactory {
    created: Mutex<HashMap<String, Arc<StubConnection>>>,
}

impl StubFactory {
    pub fn connection(&self, account_name: &str) -> Arc<StubConnection> {
        self.created
            .lock()
            .unwrap()
            .get(account_name)
            .cloned()
            .expect("connection created")
    }
}

impl ConnectionFactory for StubFactory {
    fn create(&self, account_name: &str) -> Arc<dyn GameClientConnection> {
        let connection = Arc::new(StubConnection::new());
        self.created
            .lock()
            .unwrap()
            .insert(account_name.to_string(), Arc::clone(&connection));
        connection
    }
}
