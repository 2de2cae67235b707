//! Revenue target and business calendar configuration

use serde::Deserialize;

use crate::application::handlers::revenue::{DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};
use crate::domain::foundation::Cents;
use crate::domain::revenue::BusinessCalendar;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct RevenueConfig {
    /// Daily target in minor units (cents)
    pub daily_target_cents: i64,

    /// IANA zone that defines business dates, e.g. `America/New_York`.
    /// Required: the host clock's zone is never used.
    pub business_timezone: Option<String>,

    /// Default window of the weekly progress query
    #[serde(default = "default_week_length")]
    pub week_length_days: u32,
}

impl RevenueConfig {
    pub fn calendar(&self) -> Result<BusinessCalendar, ValidationError> {
        let name = self
            .business_timezone
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::MissingRequired("REVENUE__BUSINESS_TIMEZONE"))?;
        BusinessCalendar::from_name(name)
            .map_err(|_| ValidationError::InvalidTimezone(name.to_string()))
    }

    pub fn daily_target(&self) -> Result<Cents, ValidationError> {
        match Cents::new(self.daily_target_cents) {
            Ok(target) if target.is_positive() => Ok(target),
            _ => Err(ValidationError::InvalidDailyTarget),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.calendar()?;
        self.daily_target()?;
        if self.week_length_days == 0 || self.week_length_days > MAX_WINDOW_DAYS {
            return Err(ValidationError::InvalidWeekLength(MAX_WINDOW_DAYS));
        }
        Ok(())
    }
}

fn default_week_length() -> u32 {
    DEFAULT_WINDOW_DAYS
}
