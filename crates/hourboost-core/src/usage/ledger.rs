use super::entry::UsageEntry;
use crate::error::{HourboostError, Result};
use crate::plan::{Plan, PlanKind, PlanRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The interval ends before it starts (clock skew).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("farming interval ends {skew_secs}s before it starts")]
pub struct NegativeDuration {
    pub skew_secs: u64,
}

/// Elapsed whole seconds between `start` and `end`.
pub fn elapsed_secs(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> std::result::Result<u64, NegativeDuration> {
    let secs = (end - start).num_seconds();
    if secs < 0 {
        Err(NegativeDuration {
            skew_secs: secs.unsigned_abs(),
        })
    } else {
        Ok(secs as u64)
    }
}

/// Converts a farming interval into a [`UsageEntry`] stamped at `end`.
///
/// A negative interval is clamped to zero seconds. Stopping a farm must never
/// fail because the clock went backwards.
pub fn compute_usage(account_name: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> UsageEntry {
    let amount = match elapsed_secs(start, end) {
        Ok(secs) => secs,
        Err(skew) => {
            tracing::warn!(
                account_name,
                skew_secs = skew.skew_secs,
                "[UsageLedger] Negative farming interval, clamping to zero"
            );
            0
        }
    };
    UsageEntry::new(account_name, amount, end)
}

/// Time left on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Unlimited,
    Limited(i64),
}

impl Remaining {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Remaining::Limited(secs) if *secs <= 0)
    }

    /// Subtracts time that is being farmed right now but not yet recorded.
    pub fn minus(self, in_flight_secs: u64) -> Remaining {
        match self {
            Remaining::Unlimited => Remaining::Unlimited,
            Remaining::Limited(secs) => {
                let in_flight = i64::try_from(in_flight_secs).unwrap_or(i64::MAX);
                Remaining::Limited(secs.saturating_sub(in_flight))
            }
        }
    }
}

/// Append-only list of usage entries consumed by a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageLedger {
    entries: Vec<UsageEntry>,
}

impl UsageLedger {
    pub fn new(entries: Vec<UsageEntry>) -> Self {
        let mut ledger = Self::default();
        for entry in entries {
            ledger.append(entry);
        }
        ledger
    }

    pub fn entries(&self) -> &[UsageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entry: &UsageEntry) -> bool {
        self.entries.iter().any(|e| e.same_session_as(entry))
    }

    /// Appends `entry` unless an entry with the same natural key exists.
    ///
    /// Returns `true` when the entry was appended.
    pub fn append(&mut self, entry: UsageEntry) -> bool {
        if self.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn total_secs(&self) -> u64 {
        self.entries.iter().map(|e| e.amount_time_secs).sum()
    }

    pub fn total_for_account(&self, account_name: &str) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.account_name == account_name)
            .map(|e| e.amount_time_secs)
            .sum()
    }

    pub fn remaining(&self, kind: &PlanKind) -> Remaining {
        match kind {
            PlanKind::Infinity => Remaining::Unlimited,
            PlanKind::Usage { max_usage_time } => {
                let max = i64::try_from(*max_usage_time).unwrap_or(i64::MAX);
                let used = i64::try_from(self.total_secs()).unwrap_or(i64::MAX);
                Remaining::Limited(max.saturating_sub(used))
            }
        }
    }
}

/// Fails with `UsageExhausted` when a capped plan has no time left.
pub fn ensure_usage_left(plan: &Plan) -> Result<()> {
    if plan.remaining().is_exhausted() {
        return Err(HourboostError::UsageExhausted {
            plan_id: plan.id.clone(),
        });
    }
    Ok(())
}

/// Appends `entries` to the stored ledger of `plan_id`.
///
/// Entries already present (same account and creation time) are skipped, so a
/// retried stop never double-counts. Returns how many entries were appended.
pub async fn persist_usages_on_database(
    plan_id: &str,
    entries: &[UsageEntry],
    plan_repository: &dyn PlanRepository,
) -> Result<usize> {
    if entries.is_empty() {
        return Ok(0);
    }

    let mut plan = plan_repository
        .get_by_id(plan_id)
        .await?
        .ok_or_else(|| HourboostError::not_found("Plan", plan_id))?;

    let appended = entries
        .iter()
        .filter(|entry| plan.usages.append((*entry).clone()))
        .count();

    if appended == 0 {
        tracing::debug!(plan_id, "[UsageLedger] All usages already persisted");
        return Ok(0);
    }

    plan_repository
        .save(&plan)
        .await
        .map_err(|e| {
            HourboostError::persistence(format!(
                "Failed to save usages for plan {}: {}",
                plan_id, e
            ))
        })?;

    tracing::info!(
        plan_id,
        appended,
        total_secs = plan.usages.total_secs(),
        "[UsageLedger] Persisted usages"
    );
    Ok(appended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_compute_usage_measures_interval() {
        let entry = compute_usage("acc1", at(0), at(125));
        assert_eq!(entry.amount_time_secs, 125);
        assert_eq!(entry.created_at, at(125));
    }

    #[test]
    fn test_negative_interval_is_rejected_then_clamped() {
        assert_eq!(
            elapsed_secs(at(100), at(40)),
            Err(NegativeDuration { skew_secs: 60 })
        );

        let entry = compute_usage("acc1", at(100), at(40));
        assert_eq!(entry.amount_time_secs, 0);
    }

    #[test]
    fn test_append_dedupes_by_natural_key() {
        let mut ledger = UsageLedger::default();
        let entry = compute_usage("acc1", at(0), at(60));
        let mut retry = entry.clone();
        retry.id = "another-id".to_string();

        assert!(ledger.append(entry));
        assert!(!ledger.append(retry));
        assert_eq!(ledger.total_secs(), 60);

        let later = compute_usage("acc1", at(60), at(60) + Duration::seconds(30));
        assert!(ledger.append(later));
        assert_eq!(ledger.total_for_account("acc1"), 90);
    }

    #[test]
    fn test_remaining_for_capped_and_infinite_plans() {
        let ledger = UsageLedger::new(vec![
            compute_usage("acc1", at(0), at(3000)),
            compute_usage("acc2", at(0), at(600)),
        ]);

        let capped = PlanKind::Usage { max_usage_time: 3600 };
        assert_eq!(ledger.remaining(&capped), Remaining::Limited(0));
        assert!(ledger.remaining(&capped).is_exhausted());

        assert_eq!(ledger.remaining(&PlanKind::Infinity), Remaining::Unlimited);
        assert!(!ledger.remaining(&PlanKind::Infinity).minus(u64::MAX).is_exhausted());
    }

    #[test]
    fn test_remaining_minus_in_flight() {
        let remaining = Remaining::Limited(100);
        assert_eq!(remaining.minus(40), Remaining::Limited(60));
        assert!(remaining.minus(100).is_exhausted());
    }
}
