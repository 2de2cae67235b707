//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Writes flow through `IngestWebhookHandler` and the background workers;
//! reads go through `ProgressQueryService`.

pub mod handlers;

pub use handlers::{
    AggregateResult, DailyRevenueAggregator, EventApplier, ExpirySweepConfig, IngestResult,
    IngestWebhookCommand, IngestWebhookHandler, LifecycleOutcome, ProgressQueryService,
    RecoveryConfig, RecoveryReport, RecoveryWorker, TrialExpirySweeper, TrialLifecycleEngine,
};
