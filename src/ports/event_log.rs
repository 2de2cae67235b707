//! Event log ports - idempotency claims and the append-only audit log.
//!
//! A claim and the log entry are the same durable row: claiming an event id
//! writes the immutable event, and only the processing columns change after
//! that. Gateways redeliver on timeouts and for days afterwards, so the claim
//! must hold across restarts.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventId, Timestamp};
use crate::domain::revenue::{ApplyOutcome, EventLogEntry, RevenueEvent};

/// Result of claiming an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimResult {
    /// First delivery; the caller owns processing.
    Claimed,
    /// Already claimed by an earlier or concurrent delivery.
    AlreadyProcessed,
}

/// Gate in front of all downstream processing.
///
/// Implementations must be atomic per event id: under concurrent delivery
/// exactly one caller observes `Claimed` (`INSERT .. ON CONFLICT DO NOTHING`
/// or an equivalent per-key lock).
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Claims the event id and appends the event to the log.
    async fn try_claim(&self, event: &RevenueEvent) -> Result<ClaimResult, DomainError>;
}

/// Append-only audit log with processing status.
#[async_trait]
pub trait RevenueEventLog: Send + Sync {
    async fn find(&self, event_id: &EventId) -> Result<Option<EventLogEntry>, DomainError>;

    /// Settles an event with its outcome; sets `processed_at`.
    async fn record_outcome(
        &self,
        event_id: &EventId,
        outcome: &ApplyOutcome,
        at: Timestamp,
    ) -> Result<(), DomainError>;

    /// Records a failed apply attempt; the event stays claimed for recovery.
    async fn record_failure(&self, event_id: &EventId, error: &str) -> Result<(), DomainError>;

    /// Claimed-but-unapplied events received before `claimed_before`,
    /// oldest first.
    async fn find_unapplied(
        &self,
        claimed_before: Timestamp,
        limit: u32,
    ) -> Result<Vec<EventLogEntry>, DomainError>;

    /// Deletes settled entries received before `before`.
    ///
    /// Only used with a retention window longer than any gateway retry window.
    async fn purge_settled_before(&self, before: Timestamp) -> Result<u64, DomainError>;
}
