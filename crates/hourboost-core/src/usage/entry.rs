use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One finished farming interval for an account.
///
/// Created only when a farm stops (or is flushed) and never mutated afterwards.
/// `(account_name, created_at)` is the natural key used for dedupe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub id: String,
    pub account_name: String,
    pub amount_time_secs: u64,
    pub created_at: DateTime<Utc>,
}

impl UsageEntry {
    pub fn new(account_name: impl Into<String>, amount_time_secs: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            account_name: account_name.into(),
            amount_time_secs,
            created_at,
        }
    }

    pub fn natural_key(&self) -> (&str, DateTime<Utc>) {
        (self.account_name.as_str(), self.created_at)
    }

    pub fn same_session_as(&self, other: &UsageEntry) -> bool {
        self.natural_key() == other.natural_key()
    }
}
