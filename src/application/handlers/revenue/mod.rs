//! Revenue handlers - webhook ingestion, apply, recovery and progress queries.

mod aggregate_revenue;
mod apply_event;
mod get_progress;
mod ingest_webhook;
mod recover_unapplied;

pub use aggregate_revenue::{AggregateResult, DailyRevenueAggregator};
pub use apply_event::EventApplier;
pub use get_progress::{ProgressQueryService, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};
pub use ingest_webhook::{IngestResult, IngestWebhookCommand, IngestWebhookHandler};
pub use recover_unapplied::{RecoveryConfig, RecoveryReport, RecoveryWorker};
