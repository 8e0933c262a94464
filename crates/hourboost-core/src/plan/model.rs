use crate::usage::{Remaining, UsageLedger};
use serde::{Deserialize, Serialize};

/// How farming time is billed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanKind {
    /// Capped plan: `max_usage_time` seconds in total.
    Usage { max_usage_time: u64 },
    /// No time ceiling.
    Infinity,
}

/// A subscription tier bounding account count, concurrent games and, for
/// capped tiers, total farming time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub kind: PlanKind,
    pub max_steam_accounts: usize,
    pub max_games_allowed: usize,
    #[serde(default)]
    pub auto_restarter: bool,
    #[serde(default)]
    pub usages: UsageLedger,
}

impl Plan {
    pub fn is_capped(&self) -> bool {
        matches!(self.kind, PlanKind::Usage { .. })
    }

    pub fn max_usage_time(&self) -> Option<u64> {
        match self.kind {
            PlanKind::Usage { max_usage_time } => Some(max_usage_time),
            PlanKind::Infinity => None,
        }
    }

    pub fn remaining(&self) -> Remaining {
        self.usages.remaining(&self.kind)
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            plan_id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind.clone(),
            max_steam_accounts: self.max_steam_accounts,
            max_games_allowed: self.max_games_allowed,
            auto_restarter: self.auto_restarter,
        }
    }
}

/// Immutable limits view of a plan, held by account registries.
///
/// Carries no usage entries: the ledger lives with the stored plan and is
/// re-read whenever a quota decision needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub plan_id: String,
    pub name: String,
    pub kind: PlanKind,
    pub max_steam_accounts: usize,
    pub max_games_allowed: usize,
    pub auto_restarter: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_kind_serializes_with_tag() {
        let json = serde_json::to_string(&PlanKind::Usage { max_usage_time: 3600 }).unwrap();
        assert_eq!(json, r#"{"type":"usage","max_usage_time":3600}"#);

        let parsed: PlanKind = serde_json::from_str(r#"{"type":"infinity"}"#).unwrap();
        assert_eq!(parsed, PlanKind::Infinity);
    }
}
