use crate::plan::PlanSnapshot;
use crate::session::{GameId, StopReason, TransportErrorCode};
use crate::usage::UsageEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of the lifecycle events. The string forms are the stable vocabulary
/// shared with billing and notification code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "account_required_steam_guard")]
    AccountRequiredSteamGuard,
    #[serde(rename = "account_logged_in")]
    AccountLoggedIn,
    #[serde(rename = "user-has-start-farming")]
    UserHasStartFarming,
    #[serde(rename = "user-complete-farm-session")]
    UserCompleteFarmSession,
    #[serde(rename = "error-occured-on-steam-client")]
    ErrorOccuredOnSteamClient,
    #[serde(rename = "user-changed-plan")]
    UserChangedPlan,
    #[serde(rename = "account-removed")]
    AccountRemoved,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::AccountRequiredSteamGuard,
        EventKind::AccountLoggedIn,
        EventKind::UserHasStartFarming,
        EventKind::UserCompleteFarmSession,
        EventKind::ErrorOccuredOnSteamClient,
        EventKind::UserChangedPlan,
        EventKind::AccountRemoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AccountRequiredSteamGuard => "account_required_steam_guard",
            EventKind::AccountLoggedIn => "account_logged_in",
            EventKind::UserHasStartFarming => "user-has-start-farming",
            EventKind::UserCompleteFarmSession => "user-complete-farm-session",
            EventKind::ErrorOccuredOnSteamClient => "error-occured-on-steam-client",
            EventKind::UserChangedPlan => "user-changed-plan",
            EventKind::AccountRemoved => "account-removed",
        }
    }

    pub fn parse(name: &str) -> Option<EventKind> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle event with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum FarmEvent {
    #[serde(rename = "account_required_steam_guard")]
    AccountRequiredSteamGuard {
        user_id: String,
        username: String,
        account_name: String,
        domain: Option<String>,
    },
    #[serde(rename = "account_logged_in")]
    AccountLoggedIn {
        user_id: String,
        username: String,
        account_name: String,
        /// Games resumed right after login, if any.
        resumed_games: Option<Vec<GameId>>,
    },
    #[serde(rename = "user-has-start-farming")]
    UserHasStartFarming {
        user_id: String,
        username: String,
        account_name: String,
        game_ids: Vec<GameId>,
        started_at: DateTime<Utc>,
    },
    /// Farming time was produced and must be charged to `plan_id`.
    #[serde(rename = "user-complete-farm-session")]
    UserCompleteFarmSession {
        user_id: String,
        username: String,
        plan_id: String,
        reason: StopReason,
        usages: Vec<UsageEntry>,
    },
    #[serde(rename = "error-occured-on-steam-client")]
    ErrorOccuredOnSteamClient {
        user_id: String,
        username: String,
        account_name: String,
        code: TransportErrorCode,
        message: String,
        restart_eligible: bool,
    },
    #[serde(rename = "user-changed-plan")]
    UserChangedPlan {
        user_id: String,
        username: String,
        previous_plan_id: String,
        plan: PlanSnapshot,
        trimmed_accounts: Vec<String>,
    },
    #[serde(rename = "account-removed")]
    AccountRemoved {
        user_id: String,
        username: String,
        account_name: String,
    },
}

impl FarmEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            FarmEvent::AccountRequiredSteamGuard { .. } => EventKind::AccountRequiredSteamGuard,
            FarmEvent::AccountLoggedIn { .. } => EventKind::AccountLoggedIn,
            FarmEvent::UserHasStartFarming { .. } => EventKind::UserHasStartFarming,
            FarmEvent::UserCompleteFarmSession { .. } => EventKind::UserCompleteFarmSession,
            FarmEvent::ErrorOccuredOnSteamClient { .. } => EventKind::ErrorOccuredOnSteamClient,
            FarmEvent::UserChangedPlan { .. } => EventKind::UserChangedPlan,
            FarmEvent::AccountRemoved { .. } => EventKind::AccountRemoved,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            FarmEvent::AccountRequiredSteamGuard { username, .. }
            | FarmEvent::AccountLoggedIn { username, .. }
            | FarmEvent::UserHasStartFarming { username, .. }
            | FarmEvent::UserCompleteFarmSession { username, .. }
            | FarmEvent::ErrorOccuredOnSteamClient { username, .. }
            | FarmEvent::UserChangedPlan { username, .. }
            | FarmEvent::AccountRemoved { username, .. } => username,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("unknown"), None);
    }

    #[test]
    fn test_event_serializes_with_wire_name() {
        let event = FarmEvent::AccountRemoved {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            account_name: "acc1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "account-removed");
        assert_eq!(json["account_name"], "acc1");
        assert_eq!(event.kind().to_string(), "account-removed");
    }
}
