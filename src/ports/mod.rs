//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Ingestion Ports
//!
//! - `IdempotencyStore` - Atomic claim of gateway event ids
//! - `RevenueEventLog` - Append-only audit log with processing status
//!
//! ## State Ports
//!
//! - `TrialRepository` / `CustomerRepository` - Lifecycle state, versioned writes
//! - `DailyRevenueRepository` - Per-date totals with atomic increments
//!
//! ## Fan-out Ports
//!
//! - `NotificationQueue` / `NotificationRepository` / `NotificationSink` -
//!   durable, at-least-once notification delivery
//! - `ProgressBroadcaster` - Non-blocking live progress updates

mod event_log;
mod notifications;
mod progress_broadcaster;
mod revenue_repository;
mod trial_repository;

pub use event_log::{ClaimResult, IdempotencyStore, RevenueEventLog};
pub use notifications::{
    DeliveryError, InsertOutcome, NotificationQueue, NotificationRepository, NotificationSink,
};
pub use progress_broadcaster::{NoopBroadcaster, ProgressBroadcaster};
pub use revenue_repository::{ContributionOutcome, DailyRevenueRepository};
pub use trial_repository::{CustomerRepository, SaveOutcome, TrialRepository};
