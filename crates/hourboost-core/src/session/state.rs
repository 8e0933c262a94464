use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one game-client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingGuard,
    LoggedIn,
    Farming,
    Erroring,
    Disconnected,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::AwaitingGuard => "awaiting_guard",
            SessionState::LoggedIn => "logged_in",
            SessionState::Farming => "farming",
            SessionState::Erroring => "erroring",
            SessionState::Disconnected => "disconnected",
        }
    }

    /// States from which `login()` may start a new attempt.
    pub fn can_login(&self) -> bool {
        matches!(
            self,
            SessionState::Idle
                | SessionState::AwaitingGuard
                | SessionState::Erroring
                | SessionState::Disconnected
        )
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, SessionState::LoggedIn | SessionState::Farming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a farm was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Manual,
    PlanDowngrade,
    UsageExhausted,
    SessionFinalize,
    /// The connection failed while farming.
    ClientError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaStatus {
    #[default]
    Online,
    Offline,
    Away,
    Invisible,
    Snooze,
}
