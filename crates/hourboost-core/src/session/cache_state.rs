use super::connection::GameId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable snapshot of a session's farming-relevant fields.
///
/// This is the only structure the farming core persists itself; it survives
/// process restarts through a [`CacheRepository`](super::CacheRepository).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheState {
    pub account_name: String,
    pub is_farming: bool,
    #[serde(default)]
    pub farm_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub staged_game_list: Vec<GameId>,
    #[serde(default)]
    pub refresh_token_plan_id: Option<String>,
    /// Set when the farm was paused and its usage already recorded up to
    /// `farm_started_at`; a resume starts counting again from the login.
    #[serde(default)]
    pub usage_flushed: bool,
}

impl CacheState {
    /// An empty, not-farming snapshot.
    pub fn idle(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            is_farming: false,
            farm_started_at: None,
            staged_game_list: Vec::new(),
            refresh_token_plan_id: None,
            usage_flushed: false,
        }
    }

    /// Snapshot of a farm that was paused at `paused_at` with its usage
    /// flushed. It stays resumable.
    pub fn paused(
        account_name: impl Into<String>,
        games: Vec<GameId>,
        plan_id: impl Into<String>,
        paused_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            is_farming: true,
            farm_started_at: Some(paused_at),
            staged_game_list: games,
            refresh_token_plan_id: Some(plan_id.into()),
            usage_flushed: true,
        }
    }

    /// True when the snapshot describes an interrupted farm that can resume.
    pub fn is_resumable(&self) -> bool {
        self.is_farming && self.farm_started_at.is_some() && !self.staged_game_list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_is_camel_case() {
        let state = CacheState {
            account_name: "acc1".to_string(),
            is_farming: true,
            farm_started_at: None,
            staged_game_list: vec![730, 570],
            refresh_token_plan_id: Some("plan-1".to_string()),
            usage_flushed: false,
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["accountName"], "acc1");
        assert_eq!(json["isFarming"], true);
        assert_eq!(json["stagedGameList"], serde_json::json!([730, 570]));
        assert_eq!(json["refreshTokenPlanId"], "plan-1");
        assert_eq!(json["usageFlushed"], false);
    }

    #[test]
    fn test_older_snapshots_default_to_unflushed() {
        let state: CacheState = serde_json::from_value(serde_json::json!({
            "accountName": "acc1",
            "isFarming": true,
            "farmStartedAt": "2024-01-01T00:00:00Z",
            "stagedGameList": [730]
        }))
        .unwrap();
        assert!(!state.usage_flushed);
        assert!(state.is_resumable());
    }

    #[test]
    fn test_paused_snapshot_is_resumable_and_flushed() {
        let state = CacheState::paused("acc1", vec![730], "plan-1", Utc::now());
        assert!(state.is_resumable());
        assert!(state.usage_flushed);
        assert_eq!(state.refresh_token_plan_id.as_deref(), Some("plan-1"));
    }

    #[test]
    fn test_resumable_requires_start_and_games() {
        let mut state = CacheState::idle("acc1");
        state.is_farming = true;
        assert!(!state.is_resumable());

        state.farm_started_at = Some(Utc::now());
        state.staged_game_list = vec![10];
        assert!(state.is_resumable());
    }
}
