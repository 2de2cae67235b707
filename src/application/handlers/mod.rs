//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod revenue;
pub mod trial;

pub use revenue::{
    AggregateResult, DailyRevenueAggregator, EventApplier, IngestResult, IngestWebhookCommand,
    IngestWebhookHandler, ProgressQueryService, RecoveryConfig, RecoveryReport, RecoveryWorker,
};
pub use trial::{ExpirySweepConfig, LifecycleOutcome, TrialExpirySweeper, TrialLifecycleEngine};
