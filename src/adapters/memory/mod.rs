//! In-memory adapters for every persistence port.
//!
//! Each store keeps one mutex per key (event id, subscription, business
//! date, dedupe key). State does not survive the process, so these back the
//! test suite and local development; production uses `postgres`.

mod event_log;
mod keyed;
mod notifications;
mod revenue;
mod trial;

pub use event_log::InMemoryEventLog;
pub use notifications::InMemoryNotificationRepository;
pub use revenue::InMemoryDailyRevenueRepository;
pub use trial::{InMemoryCustomerRepository, InMemoryTrialRepository};
