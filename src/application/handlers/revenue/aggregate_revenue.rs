//! DailyRevenueAggregator - buckets successful payments by business date.

use std::sync::Arc;

use crate::domain::foundation::Cents;
use crate::domain::revenue::{
    BusinessCalendar, DailyRevenueSnapshot, IngestError, PaymentEvent, RevenueContribution,
    RevenueEvent,
};
use crate::ports::{ContributionOutcome, DailyRevenueRepository};

/// What applying one event did to the daily totals.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateResult {
    /// Not a positive payment; totals untouched.
    NotContributing,
    /// Added to the bucket.
    Counted {
        snapshot: DailyRevenueSnapshot,
        /// This payment carried the day over its target.
        newly_achieved: bool,
    },
    /// Already counted by an earlier apply.
    AlreadyCounted(DailyRevenueSnapshot),
}

impl AggregateResult {
    pub fn snapshot(&self) -> Option<&DailyRevenueSnapshot> {
        match self {
            AggregateResult::NotContributing => None,
            AggregateResult::Counted { snapshot, .. } | AggregateResult::AlreadyCounted(snapshot) => {
                Some(snapshot)
            }
        }
    }
}

pub struct DailyRevenueAggregator {
    repository: Arc<dyn DailyRevenueRepository>,
    calendar: BusinessCalendar,
    daily_target: Cents,
}

impl DailyRevenueAggregator {
    pub fn new(
        repository: Arc<dyn DailyRevenueRepository>,
        calendar: BusinessCalendar,
        daily_target: Cents,
    ) -> Self {
        Self {
            repository,
            calendar,
            daily_target,
        }
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    pub fn daily_target(&self) -> Cents {
        self.daily_target
    }

    /// Adds a successful payment to the bucket of its business date.
    ///
    /// The bucket is chosen from `occurred_at` in the business timezone, not
    /// from when the webhook arrived.
    pub async fn apply(
        &self,
        record: &RevenueEvent,
        event: &PaymentEvent,
    ) -> Result<AggregateResult, IngestError> {
        let amount = match event {
            PaymentEvent::PaymentSucceeded(payment) if payment.amount.is_positive() => {
                payment.amount
            }
            _ => return Ok(AggregateResult::NotContributing),
        };

        let contribution = RevenueContribution {
            event_id: record.event_id.clone(),
            business_date: self.calendar.business_date(&record.occurred_at),
            amount,
            target: self.daily_target,
        };

        let outcome = self.repository.add_contribution(&contribution).await?;

        Ok(match outcome {
            ContributionOutcome::Applied(snapshot) => {
                let before = snapshot.total_amount().value() - amount.value();
                let newly_achieved =
                    snapshot.achieved_flag() && before < snapshot.target_amount().value();
                AggregateResult::Counted {
                    snapshot,
                    newly_achieved,
                }
            }
            ContributionOutcome::AlreadyCounted(snapshot) => AggregateResult::AlreadyCounted(snapshot),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryDailyRevenueRepository;
    use crate::domain::revenue::{test_support, EventValidator};
    use crate::domain::foundation::Timestamp;
    use chrono::NaiveDate;

    fn aggregator(tz: &str, target: i64) -> DailyRevenueAggregator {
        DailyRevenueAggregator::new(
            Arc::new(InMemoryDailyRevenueRepository::new()),
            BusinessCalendar::from_name(tz).unwrap(),
            Cents::new(target).unwrap(),
        )
    }

    fn payment(id: &str, created: i64, amount: i64) -> (RevenueEvent, PaymentEvent) {
        let body = test_support::payment(id, created, amount, None);
        let v = EventValidator::parse(body.as_bytes(), Timestamp::now()).unwrap();
        (v.record, v.event)
    }

    #[tokio::test]
    async fn eight_payments_exceed_target() {
        let agg = aggregator("UTC", 60_000);
        let mut last = None;
        for i in 0..8 {
            let (record, event) = payment(&format!("evt_{}", i), 1_710_000_000, 7900);
            last = Some(agg.apply(&record, &event).await.unwrap());
        }

        let snapshot = last.unwrap().snapshot().cloned().unwrap();
        assert_eq!(snapshot.total_amount().value(), 63_200);
        assert!(snapshot.achieved_flag());
        assert!((snapshot.progress_pct() - 105.3).abs() < 0.05);
    }

    #[tokio::test]
    async fn crossing_the_target_is_reported_once() {
        let agg = aggregator("UTC", 10_000);
        let (r1, e1) = payment("evt_1", 1_710_000_000, 6_000);
        let (r2, e2) = payment("evt_2", 1_710_000_000, 6_000);
        let (r3, e3) = payment("evt_3", 1_710_000_000, 6_000);

        let first = agg.apply(&r1, &e1).await.unwrap();
        let second = agg.apply(&r2, &e2).await.unwrap();
        let third = agg.apply(&r3, &e3).await.unwrap();

        assert!(matches!(first, AggregateResult::Counted { newly_achieved: false, .. }));
        assert!(matches!(second, AggregateResult::Counted { newly_achieved: true, .. }));
        assert!(matches!(third, AggregateResult::Counted { newly_achieved: false, .. }));
    }

    #[tokio::test]
    async fn replay_is_already_counted() {
        let agg = aggregator("UTC", 60_000);
        let (record, event) = payment("evt_1", 1_710_000_000, 7900);

        agg.apply(&record, &event).await.unwrap();
        let again = agg.apply(&record, &event).await.unwrap();

        match again {
            AggregateResult::AlreadyCounted(s) => assert_eq!(s.total_amount().value(), 7900),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn zero_amount_does_not_contribute() {
        let agg = aggregator("UTC", 60_000);
        let (record, event) = payment("evt_0", 1_710_000_000, 0);
        assert_eq!(agg.apply(&record, &event).await.unwrap(), AggregateResult::NotContributing);
    }

    #[tokio::test]
    async fn bucket_uses_business_timezone() {
        let agg = aggregator("America/Los_Angeles", 60_000);
        // 2024-03-15T05:00:00Z is 22:00 PDT on the 14th.
        let (record, event) = payment("evt_la", 1_710_478_800, 500);

        let result = agg.apply(&record, &event).await.unwrap();
        assert_eq!(
            result.snapshot().unwrap().business_date(),
            NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
        );
    }
}
