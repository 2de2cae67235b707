//! ProgressQueryService - read side for dashboards and the live channel.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::domain::foundation::{Cents, DomainError, SubscriptionId, ValidationError};
use crate::domain::revenue::{BusinessCalendar, DailyRevenueSnapshot, WeeklyProgress};
use crate::domain::trial::TrialSubscription;
use crate::ports::{DailyRevenueRepository, TrialRepository};

/// Longest window the weekly query accepts.
pub const MAX_WINDOW_DAYS: u32 = 31;

pub const DEFAULT_WINDOW_DAYS: u32 = 7;

pub struct ProgressQueryService {
    revenue: Arc<dyn DailyRevenueRepository>,
    trials: Arc<dyn TrialRepository>,
    calendar: BusinessCalendar,
    daily_target: Cents,
    window_days: u32,
}

impl ProgressQueryService {
    pub fn new(
        revenue: Arc<dyn DailyRevenueRepository>,
        trials: Arc<dyn TrialRepository>,
        calendar: BusinessCalendar,
        daily_target: Cents,
    ) -> Self {
        Self {
            revenue,
            trials,
            calendar,
            daily_target,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    /// Window used by the weekly query when the caller gives none.
    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days.clamp(1, MAX_WINDOW_DAYS);
        self
    }

    /// Current business date in the configured zone.
    pub fn today(&self) -> NaiveDate {
        self.calendar.today()
    }

    /// Progress for one business date, today when `date` is `None`.
    ///
    /// Dates with no payments report a zero total against the configured target.
    pub async fn get_progress(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<DailyRevenueSnapshot, DomainError> {
        let date = date.unwrap_or_else(|| self.today());
        Ok(self
            .revenue
            .find_by_date(date)
            .await?
            .unwrap_or_else(|| DailyRevenueSnapshot::empty(date, self.daily_target)))
    }

    /// Progress over `days` business dates ending on `end` (today by default).
    pub async fn get_weekly_progress(
        &self,
        end: Option<NaiveDate>,
        days: Option<u32>,
    ) -> Result<WeeklyProgress, DomainError> {
        let days = days.unwrap_or(self.window_days);
        if days == 0 || days > MAX_WINDOW_DAYS {
            return Err(ValidationError::out_of_range(
                "days",
                1,
                i64::from(MAX_WINDOW_DAYS),
                i64::from(days),
            )
            .into());
        }

        let end = end.unwrap_or_else(|| self.today());
        let start = WeeklyProgress::window_start(end, days)?;
        let stored = self.revenue.find_range(start, end).await?;

        Ok(WeeklyProgress::from_days(end, days, self.daily_target, stored)?)
    }

    pub async fn get_trial(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<TrialSubscription>, DomainError> {
        self.trials.find(subscription_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryDailyRevenueRepository, InMemoryTrialRepository};
    use crate::domain::foundation::{ErrorCode, EventId};
    use crate::domain::revenue::RevenueContribution;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    async fn service_with(amounts: &[(u32, i64)]) -> ProgressQueryService {
        let revenue = Arc::new(InMemoryDailyRevenueRepository::new());
        for (i, (d, amount)) in amounts.iter().enumerate() {
            revenue
                .add_contribution(&RevenueContribution {
                    event_id: EventId::new(format!("evt_{}", i)).unwrap(),
                    business_date: day(*d),
                    amount: Cents::new(*amount).unwrap(),
                    target: Cents::new(60_000).unwrap(),
                })
                .await
                .unwrap();
        }
        ProgressQueryService::new(
            revenue,
            Arc::new(InMemoryTrialRepository::new()),
            BusinessCalendar::from_name("Europe/Berlin").unwrap(),
            Cents::new(60_000).unwrap(),
        )
    }

    #[tokio::test]
    async fn stored_date_reports_totals() {
        let service = service_with(&[(14, 7900), (14, 7900)]).await;
        let snapshot = service.get_progress(Some(day(14))).await.unwrap();
        assert_eq!(snapshot.total_amount().value(), 15_800);
        assert!(!snapshot.achieved_flag());
    }

    #[tokio::test]
    async fn date_without_payments_is_zero() {
        let service = service_with(&[]).await;
        let snapshot = service.get_progress(Some(day(1))).await.unwrap();
        assert_eq!(snapshot.total_amount(), Cents::ZERO);
        assert_eq!(snapshot.target_amount().value(), 60_000);
        assert_eq!(snapshot.progress_pct(), 0.0);
    }

    #[tokio::test]
    async fn default_date_is_business_today() {
        let service = service_with(&[]).await;
        let snapshot = service.get_progress(None).await.unwrap();
        assert_eq!(snapshot.business_date(), service.today());
    }

    #[tokio::test]
    async fn weekly_window_fills_gaps() {
        let service = service_with(&[(10, 30_000), (12, 30_000), (20, 99_999)]).await;

        let weekly = service
            .get_weekly_progress(Some(day(14)), None)
            .await
            .unwrap();

        assert_eq!(weekly.start_date, day(8));
        assert_eq!(weekly.days.len(), 7);
        assert_eq!(weekly.total_amount.value(), 60_000);
        assert_eq!(weekly.target_amount.value(), 7 * 60_000);
        assert!(!weekly.achieved_flag);
    }

    #[tokio::test]
    async fn window_before_the_earliest_date_is_a_validation_error() {
        let service = service_with(&[]).await;
        let err = service
            .get_weekly_progress(Some(NaiveDate::MIN), Some(7))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn weekly_window_is_bounded() {
        let service = service_with(&[]).await;
        for bad in [0, MAX_WINDOW_DAYS + 1] {
            let err = service
                .get_weekly_progress(Some(day(14)), Some(bad))
                .await
                .unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationFailed);
        }
    }
}
