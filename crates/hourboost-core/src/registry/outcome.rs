use crate::error::HourboostError;
use crate::session::FarmStop;
use crate::usage::UsageEntry;

/// An account evicted from a registry.
#[derive(Debug, Clone)]
pub struct RemovedAccount {
    pub account_name: String,
    /// Set when the account was farming at removal time.
    pub stop: Option<FarmStop>,
}

impl RemovedAccount {
    pub fn usage(&self) -> Option<&UsageEntry> {
        self.stop.as_ref().map(|s| &s.usage)
    }
}

/// Per-account failure inside a batch operation.
#[derive(Debug, Clone)]
pub struct AccountError {
    pub account_name: String,
    pub error: HourboostError,
}

/// Result of `trim_to_limit`: removed accounts, oldest first.
#[derive(Debug, Clone, Default)]
pub struct TrimReport {
    pub removed: Vec<RemovedAccount>,
}

impl TrimReport {
    pub fn removed_names(&self) -> Vec<String> {
        self.removed.iter().map(|r| r.account_name.clone()).collect()
    }

    pub fn usages(&self) -> Vec<UsageEntry> {
        self.removed.iter().filter_map(|r| r.usage().cloned()).collect()
    }
}

/// Result of `pause_all`. Every farming account appears exactly once, either
/// in `stopped` or in `errors`.
#[derive(Debug, Clone, Default)]
pub struct PauseReport {
    pub stopped: Vec<FarmStop>,
    pub errors: Vec<AccountError>,
}

impl PauseReport {
    pub fn total(&self) -> usize {
        self.stopped.len() + self.errors.len()
    }

    pub fn usages(&self) -> Vec<UsageEntry> {
        self.stopped.iter().map(|s| s.usage.clone()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
