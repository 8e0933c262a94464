//! Boundary to the third-party game client.
//!
//! The real client lives outside this crate. It is driven through
//! [`GameClientConnection`] and reports asynchronous outcomes (logged on,
//! guard required, errors) as [`ConnectionEvent`]s on a broadcast channel.

use super::credentials::LoginCredentials;
use super::state::PersonaStatus;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

pub type GameId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedGame {
    pub app_id: GameId,
    pub name: String,
    #[serde(default)]
    pub playtime_forever_mins: u64,
}

/// Error codes reported by the game client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorCode {
    NoConnection,
    ServiceUnavailable,
    Timeout,
    TryAnotherCm,
    LoggedInElsewhere,
    InvalidPassword,
    InvalidAuthCode,
    RateLimitExceeded,
    AccountLoginDeniedThrottle,
    Other(i32),
}

impl TransportErrorCode {
    /// Codes after which an auto-restart is worth attempting.
    pub fn is_reconnect_eligible(&self) -> bool {
        matches!(
            self,
            TransportErrorCode::NoConnection
                | TransportErrorCode::ServiceUnavailable
                | TransportErrorCode::Timeout
                | TransportErrorCode::TryAnotherCm
                | TransportErrorCode::LoggedInElsewhere
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorCode::NoConnection => "NoConnection",
            TransportErrorCode::ServiceUnavailable => "ServiceUnavailable",
            TransportErrorCode::Timeout => "Timeout",
            TransportErrorCode::TryAnotherCm => "TryAnotherCM",
            TransportErrorCode::LoggedInElsewhere => "LoggedInElsewhere",
            TransportErrorCode::InvalidPassword => "InvalidPassword",
            TransportErrorCode::InvalidAuthCode => "InvalidAuthCode",
            TransportErrorCode::RateLimitExceeded => "RateLimitExceeded",
            TransportErrorCode::AccountLoginDeniedThrottle => "AccountLoginDeniedThrottle",
            TransportErrorCode::Other(_) => "Other",
        }
    }
}

impl fmt::Display for TransportErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorCode::Other(code) => write!(f, "Other({})", code),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Asynchronous notifications emitted by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    LoggedOn {
        refresh_token: Option<String>,
    },
    SteamGuard {
        domain: Option<String>,
        last_code_wrong: bool,
    },
    Error {
        code: TransportErrorCode,
        message: String,
    },
    Disconnected {
        message: String,
    },
}

/// One live connection for one account.
#[async_trait]
pub trait GameClientConnection: Send + Sync {
    /// Subscribes to events emitted from now on.
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Starts a login attempt. The outcome arrives as a [`ConnectionEvent`].
    async fn log_on(&self, credentials: &LoginCredentials) -> Result<()>;

    /// Marks `game_ids` as being played. An empty slice stops playing.
    async fn games_played(&self, game_ids: &[GameId]) -> Result<()>;

    async fn set_persona(&self, status: PersonaStatus) -> Result<()>;

    async fn request_owned_games(&self) -> Result<Vec<OwnedGame>>;

    async fn disconnect(&self);
}

/// Creates connections for newly registered accounts.
pub trait ConnectionFactory: Send + Sync {
    fn create(&self, account_name: &str) -> Arc<dyn GameClientConnection>;
}
