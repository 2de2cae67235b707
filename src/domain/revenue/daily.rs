//! Business-date bucketing and the derived progress snapshots.

use chrono::{Days, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

use crate::domain::foundation::{Cents, EventId, Timestamp, ValidationError};

/// Maps instants onto business dates in one configured IANA timezone.
///
/// The host clock's zone never participates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessCalendar {
    tz: Tz,
}

impl BusinessCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Builds a calendar from an IANA name such as `America/New_York`.
    pub fn from_name(name: &str) -> Result<Self, ValidationError> {
        let tz: Tz = name
            .parse()
            .map_err(|e| ValidationError::invalid_format("business_timezone", format!("{}", e)))?;
        Ok(Self { tz })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Business date of an instant.
    pub fn business_date(&self, at: &Timestamp) -> NaiveDate {
        at.as_datetime().with_timezone(&self.tz).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.business_date(&Timestamp::now())
    }

    /// Half-open UTC interval `[start, end)` covered by a business date.
    ///
    /// Days are 23 or 25 hours long across daylight-saving changes.
    #[cfg(test)]
    fn day_bounds(&self, date: NaiveDate) -> (Timestamp, Timestamp) {
        let next = date.succ_opt().unwrap_or(date);
        (self.start_of(date), self.start_of(next))
    }

    /// First instant of `date`; when local midnight falls in a DST gap the day
    /// starts at the first representable hour.
    #[cfg(test)]
    fn start_of(&self, date: NaiveDate) -> Timestamp {
        use chrono::TimeZone;

        for hour in 0..24 {
            let local = match date.and_hms_opt(hour, 0, 0) {
                Some(local) => local,
                None => continue,
            };
            if let Some(start) = self.tz.from_local_datetime(&local).earliest() {
                return Timestamp::from_datetime(start.with_timezone(&chrono::Utc));
            }
        }
        Timestamp::from_datetime(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}

/// One counted payment for a business date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevenueContribution {
    pub event_id: EventId,
    pub business_date: NaiveDate,
    pub amount: Cents,
    pub target: Cents,
}

/// Running total for one business date.
///
/// `progress_pct` and `achieved_flag` are derived from the total and the
/// target whenever a snapshot is built; they cannot be set independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRevenueSnapshot {
    business_date: NaiveDate,
    total_amount: Cents,
    target_amount: Cents,
    progress_pct: f64,
    achieved_flag: bool,
    payment_count: u64,
    updated_at: Option<Timestamp>,
}

impl DailyRevenueSnapshot {
    pub fn compute(
        business_date: NaiveDate,
        total_amount: Cents,
        target_amount: Cents,
        payment_count: u64,
        updated_at: Option<Timestamp>,
    ) -> Self {
        Self {
            business_date,
            total_amount,
            target_amount,
            progress_pct: total_amount.percent_of(target_amount),
            achieved_flag: total_amount >= target_amount,
            payment_count,
            updated_at,
        }
    }

    /// Snapshot for a date with no payments yet.
    pub fn empty(business_date: NaiveDate, target_amount: Cents) -> Self {
        Self::compute(business_date, Cents::ZERO, target_amount, 0, None)
    }

    pub fn business_date(&self) -> NaiveDate {
        self.business_date
    }

    pub fn total_amount(&self) -> Cents {
        self.total_amount
    }

    pub fn target_amount(&self) -> Cents {
        self.target_amount
    }

    /// Exact progress, may exceed 100.
    pub fn progress_pct(&self) -> f64 {
        self.progress_pct
    }

    /// Progress clamped to `[0, 100]` for display.
    pub fn display_progress_pct(&self) -> f64 {
        self.progress_pct.clamp(0.0, 100.0)
    }

    pub fn achieved_flag(&self) -> bool {
        self.achieved_flag
    }

    pub fn payment_count(&self) -> u64 {
        self.payment_count
    }

    pub fn updated_at(&self) -> Option<Timestamp> {
        self.updated_at
    }
}

/// Progress over consecutive business dates ending on `end_date`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyProgress {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_amount: Cents,
    pub target_amount: Cents,
    pub progress_pct: f64,
    pub achieved_flag: bool,
    pub days: Vec<DailyRevenueSnapshot>,
}

impl WeeklyProgress {
    /// First date of a `length_days` window ending on `end_date`.
    ///
    /// Fails when the window would start before the earliest representable date.
    pub fn window_start(end_date: NaiveDate, length_days: u32) -> Result<NaiveDate, ValidationError> {
        let back = u64::from(length_days.max(1) - 1);
        end_date.checked_sub_days(Days::new(back)).ok_or_else(|| {
            ValidationError::invalid_format(
                "end",
                format!("a {}-day window cannot end on {}", length_days, end_date),
            )
        })
    }

    /// Builds the window, filling dates without a bucket with empty snapshots.
    pub fn from_days(
        end_date: NaiveDate,
        length_days: u32,
        daily_target: Cents,
        stored: Vec<DailyRevenueSnapshot>,
    ) -> Result<Self, ValidationError> {
        let length = length_days.max(1);
        let start_date = Self::window_start(end_date, length)?;

        let days: Vec<DailyRevenueSnapshot> = start_date
            .iter_days()
            .take(length as usize)
            .map(|date| {
                stored
                    .iter()
                    .find(|s| s.business_date() == date)
                    .cloned()
                    .unwrap_or_else(|| DailyRevenueSnapshot::empty(date, daily_target))
            })
            .collect();

        let total_amount = sum_amounts("total_amount", days.iter().map(|d| d.total_amount()))?;
        let target_amount = sum_amounts("target_amount", days.iter().map(|d| d.target_amount()))?;

        Ok(Self {
            start_date,
            end_date,
            total_amount,
            target_amount,
            progress_pct: total_amount.percent_of(target_amount),
            achieved_flag: total_amount >= target_amount,
            days,
        })
    }
}

fn sum_amounts(
    field: &str,
    mut amounts: impl Iterator<Item = Cents>,
) -> Result<Cents, ValidationError> {
    amounts.try_fold(Cents::ZERO, |acc, amount| {
        acc.checked_add(amount)
            .ok_or_else(|| ValidationError::out_of_range(field, 0, i64::MAX, acc.value()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        Timestamp::from_datetime(Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn cents(v: i64) -> Cents {
        Cents::new(v).unwrap()
    }

    // ══════════════════════════════════════════════════════════════
    // Business Calendar
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn rejects_unknown_zone() {
        assert!(BusinessCalendar::from_name("Mars/Olympus_Mons").is_err());
        assert!(BusinessCalendar::from_name("").is_err());
    }

    #[test]
    fn utc_calendar_uses_utc_midnight() {
        let cal = BusinessCalendar::from_name("UTC").unwrap();
        assert_eq!(cal.business_date(&ts(2024, 3, 10, 23, 59)), date(2024, 3, 10));
        assert_eq!(cal.business_date(&ts(2024, 3, 11, 0, 0)), date(2024, 3, 11));
    }

    #[test]
    fn new_york_evening_belongs_to_previous_utc_day() {
        let cal = BusinessCalendar::from_name("America/New_York").unwrap();
        // 03:30 UTC on the 15th is 23:30 EDT on the 14th.
        assert_eq!(cal.business_date(&ts(2024, 6, 15, 3, 30)), date(2024, 6, 14));
        assert_eq!(cal.business_date(&ts(2024, 6, 15, 4, 0)), date(2024, 6, 15));
    }

    #[test]
    fn tokyo_morning_belongs_to_next_utc_day() {
        let cal = BusinessCalendar::from_name("Asia/Tokyo").unwrap();
        // 15:00 UTC is 00:00 JST the next day.
        assert_eq!(cal.business_date(&ts(2024, 6, 14, 14, 59)), date(2024, 6, 14));
        assert_eq!(cal.business_date(&ts(2024, 6, 14, 15, 0)), date(2024, 6, 15));
    }

    #[test]
    fn spring_forward_day_is_23_hours() {
        let cal = BusinessCalendar::from_name("America/New_York").unwrap();
        let (start, end) = cal.day_bounds(date(2024, 3, 10));

        assert_eq!(start, ts(2024, 3, 10, 5, 0));
        assert_eq!(end, ts(2024, 3, 11, 4, 0));
        assert_eq!(end.duration_since(&start), Duration::hours(23));
    }

    #[test]
    fn fall_back_day_is_25_hours() {
        let cal = BusinessCalendar::from_name("America/New_York").unwrap();
        let (start, end) = cal.day_bounds(date(2024, 11, 3));

        assert_eq!(end.duration_since(&start), Duration::hours(25));
        // 05:30 UTC is 01:30 EDT, the first of two 01:30s that day.
        assert_eq!(cal.business_date(&ts(2024, 11, 3, 5, 30)), date(2024, 11, 3));
    }

    #[test]
    fn bounds_agree_with_business_date() {
        let cal = BusinessCalendar::from_name("Europe/Berlin").unwrap();
        let d = date(2024, 3, 31);
        let (start, end) = cal.day_bounds(d);

        assert_eq!(cal.business_date(&start), d);
        assert_eq!(cal.business_date(&end.minus_secs(1)), d);
        assert_eq!(cal.business_date(&end), date(2024, 4, 1));
        assert_eq!(cal.business_date(&start.minus_secs(1)), date(2024, 3, 30));
    }

    #[test]
    fn midnight_gap_starts_day_at_first_valid_hour() {
        // Santiago springs forward at local midnight.
        let cal = BusinessCalendar::from_name("America/Santiago").unwrap();
        let d = date(2024, 9, 8);
        let (start, _) = cal.day_bounds(d);

        assert_eq!(cal.business_date(&start), d);
        assert_eq!(cal.business_date(&start.minus_secs(1)), date(2024, 9, 7));
    }

    // ══════════════════════════════════════════════════════════════
    // Snapshot Derivation
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn achieved_flag_boundary() {
        let below = DailyRevenueSnapshot::compute(date(2024, 1, 1), cents(59_999), cents(60_000), 1, None);
        let at = DailyRevenueSnapshot::compute(date(2024, 1, 1), cents(60_000), cents(60_000), 1, None);

        assert!(!below.achieved_flag());
        assert!(at.achieved_flag());
    }

    #[test]
    fn progress_exceeds_100_but_display_is_clamped() {
        let snap = DailyRevenueSnapshot::compute(date(2024, 1, 1), cents(63_200), cents(60_000), 8, None);

        assert!((snap.progress_pct() - 105.33).abs() < 0.01);
        assert_eq!(snap.display_progress_pct(), 100.0);
        assert_eq!(snap.total_amount().value(), 63_200);
    }

    #[test]
    fn empty_snapshot_has_zero_progress() {
        let snap = DailyRevenueSnapshot::empty(date(2024, 1, 1), cents(60_000));
        assert_eq!(snap.total_amount(), Cents::ZERO);
        assert_eq!(snap.progress_pct(), 0.0);
        assert!(!snap.achieved_flag());
    }

    // ══════════════════════════════════════════════════════════════
    // Weekly Window
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn weekly_fills_gaps_and_sums() {
        let target = cents(10_000);
        let stored = vec![
            DailyRevenueSnapshot::compute(date(2024, 1, 3), cents(12_000), target, 2, None),
            DailyRevenueSnapshot::compute(date(2024, 1, 7), cents(30_000), target, 4, None),
            // Outside the window, ignored.
            DailyRevenueSnapshot::compute(date(2023, 12, 31), cents(99_999), target, 9, None),
        ];

        let week = WeeklyProgress::from_days(date(2024, 1, 7), 7, target, stored).unwrap();

        assert_eq!(week.start_date, date(2024, 1, 1));
        assert_eq!(week.days.len(), 7);
        assert_eq!(week.total_amount.value(), 42_000);
        assert_eq!(week.target_amount.value(), 70_000);
        assert!((week.progress_pct - 60.0).abs() < 1e-9);
        assert!(!week.achieved_flag);
    }

    #[test]
    fn window_reaching_before_the_first_date_is_rejected() {
        let earliest = NaiveDate::MIN;
        let err = WeeklyProgress::from_days(earliest, 7, cents(10_000), Vec::new()).unwrap_err();
        assert!(err.to_string().contains("end"));

        let single = WeeklyProgress::from_days(earliest, 1, cents(10_000), Vec::new()).unwrap();
        assert_eq!(single.start_date, earliest);
    }

    #[test]
    fn window_total_that_overflows_is_an_error() {
        let target = cents(1);
        let stored = vec![
            DailyRevenueSnapshot::compute(date(2024, 1, 6), cents(i64::MAX), target, 1, None),
            DailyRevenueSnapshot::compute(date(2024, 1, 7), cents(1), target, 1, None),
        ];
        assert!(WeeklyProgress::from_days(date(2024, 1, 7), 2, target, stored).is_err());
    }
}
