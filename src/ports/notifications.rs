//! Notification ports - durable records, the enqueue seam and outbound delivery.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{DomainError, NotificationId, Timestamp};
use crate::domain::notification::{NotificationRecord, NotificationRequest};

/// Result of inserting a notification record.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same dedupe key exists; carries it.
    Existing(NotificationRecord),
}

/// Durable notification records.
///
/// Every attempt is recorded, successful or not.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Inserts unless a record with the same dedupe key exists.
    async fn insert_if_absent(
        &self,
        record: &NotificationRecord,
    ) -> Result<InsertOutcome, DomainError>;

    async fn find(&self, id: NotificationId) -> Result<Option<NotificationRecord>, DomainError>;

    /// Appends one attempt and returns the updated record.
    async fn record_attempt(
        &self,
        id: NotificationId,
        result: &Result<(), String>,
        at: Timestamp,
    ) -> Result<NotificationRecord, DomainError>;

    /// Marks the record permanently failed.
    async fn mark_failed(&self, id: NotificationId, at: Timestamp) -> Result<(), DomainError>;

    /// Pending records, oldest first.
    async fn find_pending(&self, limit: u32) -> Result<Vec<NotificationRecord>, DomainError>;
}

/// Enqueue seam used by the core.
///
/// Enqueueing persists the record and hands it to background delivery; it
/// never waits for delivery.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, request: NotificationRequest)
        -> Result<NotificationRecord, DomainError>;
}

/// Delivery failure reported by a sink.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator rejected notification: {0}")]
    Rejected(String),

    #[error("Delivery timed out")]
    Timeout,
}

impl DeliveryError {
    /// Unavailable and timed-out deliveries are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Unavailable(_) | DeliveryError::Timeout)
    }
}

/// Outbound delivery to a downstream collaborator (CRM, email, dashboard).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, record: &NotificationRecord) -> Result<(), DeliveryError>;
}
