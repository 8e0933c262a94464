//! Usage accounting.
//!
//! Converts farming intervals into [`UsageEntry`] values and applies them
//! against a plan's allowance.

mod entry;
mod ledger;

pub use entry::UsageEntry;
pub use ledger::{
    NegativeDuration, Remaining, UsageLedger, compute_usage, elapsed_secs, ensure_usage_left,
    persist_usages_on_database,
};
