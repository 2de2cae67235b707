//! Daily revenue persistence port.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::foundation::DomainError;
use crate::domain::revenue::{DailyRevenueSnapshot, RevenueContribution};

/// Result of adding a payment to a bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum ContributionOutcome {
    /// The amount was added; carries the updated snapshot.
    Applied(DailyRevenueSnapshot),
    /// This event was already counted; carries the current snapshot.
    AlreadyCounted(DailyRevenueSnapshot),
}

impl ContributionOutcome {
    pub fn snapshot(&self) -> &DailyRevenueSnapshot {
        match self {
            ContributionOutcome::Applied(s) | ContributionOutcome::AlreadyCounted(s) => s,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, ContributionOutcome::Applied(_))
    }
}

/// Per-date running totals.
///
/// `add_contribution` is one atomic step: record the event id as counted and
/// increment the bucket, or do nothing if the id was already counted. No
/// read-modify-write window may exist, and contention is limited to the one
/// business date.
#[async_trait]
pub trait DailyRevenueRepository: Send + Sync {
    async fn add_contribution(
        &self,
        contribution: &RevenueContribution,
    ) -> Result<ContributionOutcome, DomainError>;

    async fn find_by_date(
        &self,
        business_date: NaiveDate,
    ) -> Result<Option<DailyRevenueSnapshot>, DomainError>;

    /// Stored snapshots with `from <= date <= to`, ordered by date.
    async fn find_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyRevenueSnapshot>, DomainError>;
}
