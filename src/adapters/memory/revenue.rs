//! In-memory daily revenue buckets, one mutex per business date.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;

use crate::domain::foundation::{Cents, DomainError, ErrorCode, EventId, Timestamp};
use crate::domain::revenue::{DailyRevenueSnapshot, RevenueContribution};
use crate::ports::{ContributionOutcome, DailyRevenueRepository};

use super::keyed::KeyedCells;

struct Bucket {
    business_date: NaiveDate,
    total: Cents,
    target: Cents,
    payment_count: u64,
    counted: HashSet<EventId>,
    updated_at: Option<Timestamp>,
}

impl Bucket {
    fn snapshot(&self) -> DailyRevenueSnapshot {
        DailyRevenueSnapshot::compute(
            self.business_date,
            self.total,
            self.target,
            self.payment_count,
            self.updated_at,
        )
    }
}

pub struct InMemoryDailyRevenueRepository {
    buckets: KeyedCells<NaiveDate, Bucket>,
}

impl InMemoryDailyRevenueRepository {
    pub fn new() -> Self {
        Self {
            buckets: KeyedCells::new(),
        }
    }
}

impl Default for InMemoryDailyRevenueRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DailyRevenueRepository for InMemoryDailyRevenueRepository {
    async fn add_contribution(
        &self,
        contribution: &RevenueContribution,
    ) -> Result<ContributionOutcome, DomainError> {
        let (cell, _) = self
            .buckets
            .get_or_insert_with(contribution.business_date, || Bucket {
                business_date: contribution.business_date,
                total: Cents::ZERO,
                target: contribution.target,
                payment_count: 0,
                counted: HashSet::new(),
                updated_at: None,
            })
            .await;

        let mut bucket = cell.lock().await;
        if bucket.counted.contains(&contribution.event_id) {
            return Ok(ContributionOutcome::AlreadyCounted(bucket.snapshot()));
        }
        let total = bucket.total.checked_add(contribution.amount).ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("total for {} would overflow", contribution.business_date),
            )
        })?;
        bucket.counted.insert(contribution.event_id.clone());
        bucket.total = total;
        bucket.payment_count += 1;
        bucket.updated_at = Some(Timestamp::now());
        Ok(ContributionOutcome::Applied(bucket.snapshot()))
    }

    async fn find_by_date(
        &self,
        business_date: NaiveDate,
    ) -> Result<Option<DailyRevenueSnapshot>, DomainError> {
        match self.buckets.get(&business_date).await {
            Some(cell) => Ok(Some(cell.lock().await.snapshot())),
            None => Ok(None),
        }
    }

    async fn find_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyRevenueSnapshot>, DomainError> {
        let mut snapshots = Vec::new();
        for (date, cell) in self.buckets.cells().await {
            if date >= from && date <= to {
                snapshots.push(cell.lock().await.snapshot());
            }
        }
        snapshots.sort_by_key(|s| s.business_date());
        Ok(snapshots)
    }
}
