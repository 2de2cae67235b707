//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresEventLog` - Idempotency claims and the append-only event log
//! - `PostgresTrialRepository` / `PostgresCustomerRepository` - Versioned trial state
//! - `PostgresDailyRevenueRepository` - Per-date totals with atomic increments
//! - `PostgresNotificationRepository` - Deduplicated notification records
//!
//! Schema lives in `migrations/` and is applied at startup.

mod event_log;
mod notifications;
mod revenue;
mod trial;

pub use event_log::PostgresEventLog;
pub use notifications::PostgresNotificationRepository;
pub use revenue::PostgresDailyRevenueRepository;
pub use trial::{PostgresCustomerRepository, PostgresTrialRepository};

use std::fmt::Display;

use crate::domain::foundation::{Cents, DomainError, ErrorCode};

/// Maps a sqlx failure to a `DatabaseError` with context.
fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, e))
}

/// A stored value that no longer parses into its domain type.
fn corrupt(field: &'static str, err: impl Display) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Invalid {}: {}", field, err))
        .with_detail("field", field)
}

fn cents(field: &'static str, value: i64) -> Result<Cents, DomainError> {
    Cents::new(value).map_err(|e| corrupt(field, e))
}

fn to_u32(field: &'static str, value: i64) -> Result<u32, DomainError> {
    u32::try_from(value).map_err(|e| corrupt(field, e))
}
