//! Ingestion error taxonomy.
//!
//! Every failure on the webhook path lands in one of these variants. The
//! status code decides what the gateway sees: signature problems are
//! rejected, problems with an authentic payload are acknowledged so the
//! gateway does not retry forever, and storage failures before the claim is
//! durable ask the gateway to redeliver.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::{DomainError, EventId, SubscriptionId};
use crate::domain::trial::TrialState;

#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// HMAC over the payload did not match the signature header.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature header missing or not in `t=..,v1=..` form.
    #[error("Malformed signature header: {0}")]
    MalformedSignature(String),

    /// Signature timestamp outside the replay tolerance window.
    #[error("Signature timestamp outside tolerance")]
    SignatureExpired,

    /// Authentic payload that is not JSON or lacks required fields.
    #[error("Unparseable event: {0}")]
    UnparseableEvent(String),

    /// Event id already claimed by an earlier delivery.
    #[error("Duplicate event: {0}")]
    DuplicateEvent(EventId),

    /// Event is valid but the subscription cannot move to the requested state.
    #[error("Illegal transition for {subscription_id}: {from} -> {attempted}")]
    IllegalTransition {
        subscription_id: SubscriptionId,
        from: TrialState,
        attempted: TrialState,
    },

    /// Lifecycle event for a subscription whose creation has not arrived yet.
    #[error("Subscription {0} not created yet")]
    SubscriptionPending(SubscriptionId),

    /// Durable storage rejected a read or write.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// A downstream collaborator could not be reached.
    #[error("Notification delivery failure: {0}")]
    NotificationDeliveryFailure(String),
}

impl IngestError {
    /// True for failures that affect authentication of the request.
    pub fn is_signature_failure(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidSignature
                | IngestError::MalformedSignature(_)
                | IngestError::SignatureExpired
        )
    }

    /// Returns true if the operation may succeed when attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestError::PersistenceFailure(_)
                | IngestError::NotificationDeliveryFailure(_)
                | IngestError::SubscriptionPending(_)
        )
    }

    /// Maps the error to the HTTP status returned to the gateway.
    ///
    /// - 2xx: acknowledged, the gateway stops retrying
    /// - 4xx: unauthenticated request
    /// - 5xx: nothing durable happened, the gateway should redeliver
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::InvalidSignature
            | IngestError::MalformedSignature(_)
            | IngestError::SignatureExpired => StatusCode::BAD_REQUEST,

            IngestError::UnparseableEvent(_)
            | IngestError::DuplicateEvent(_)
            | IngestError::IllegalTransition { .. }
            | IngestError::SubscriptionPending(_)
            | IngestError::NotificationDeliveryFailure(_) => StatusCode::OK,

            IngestError::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::InvalidSignature => "INVALID_SIGNATURE",
            IngestError::MalformedSignature(_) => "MALFORMED_SIGNATURE",
            IngestError::SignatureExpired => "SIGNATURE_EXPIRED",
            IngestError::UnparseableEvent(_) => "UNPARSEABLE_EVENT",
            IngestError::DuplicateEvent(_) => "DUPLICATE_EVENT",
            IngestError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            IngestError::SubscriptionPending(_) => "SUBSCRIPTION_PENDING",
            IngestError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            IngestError::NotificationDeliveryFailure(_) => "NOTIFICATION_DELIVERY_FAILURE",
        }
    }
}

impl From<DomainError> for IngestError {
    fn from(err: DomainError) -> Self {
        IngestError::PersistenceFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;

    // ══════════════════════════════════════════════════════════════
    // Status Code Mapping
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn signature_failures_are_bad_request() {
        for err in [
            IngestError::InvalidSignature,
            IngestError::MalformedSignature("missing v1".into()),
            IngestError::SignatureExpired,
        ] {
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert!(err.is_signature_failure());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn authentic_but_unusable_events_are_acknowledged() {
        let dup = IngestError::DuplicateEvent(EventId::new("evt_1").unwrap());
        let bad = IngestError::UnparseableEvent("missing field `id`".into());
        let illegal = IngestError::IllegalTransition {
            subscription_id: SubscriptionId::new("sub_1").unwrap(),
            from: TrialState::Expired,
            attempted: TrialState::Converted,
        };

        assert_eq!(dup.status_code(), StatusCode::OK);
        assert_eq!(bad.status_code(), StatusCode::OK);
        assert_eq!(illegal.status_code(), StatusCode::OK);
    }

    #[test]
    fn pending_subscription_is_acknowledged_and_retried_locally() {
        let err = IngestError::SubscriptionPending(SubscriptionId::new("sub_1").unwrap());
        assert_eq!(err.status_code(), StatusCode::OK);
        assert!(err.is_retryable());
        assert_eq!(err.code(), "SUBSCRIPTION_PENDING");
    }

    #[test]
    fn persistence_failure_asks_for_redelivery() {
        let err = IngestError::PersistenceFailure("connection refused".into());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_retryable());
    }

    // ══════════════════════════════════════════════════════════════
    // Conversions and Display
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn domain_error_becomes_persistence_failure() {
        let err: IngestError = DomainError::new(ErrorCode::DatabaseError, "timeout").into();
        assert!(matches!(err, IngestError::PersistenceFailure(msg) if msg.contains("timeout")));
    }

    #[test]
    fn illegal_transition_display_names_states() {
        let err = IngestError::IllegalTransition {
            subscription_id: SubscriptionId::new("sub_9").unwrap(),
            from: TrialState::Canceled,
            attempted: TrialState::Active,
        };
        assert_eq!(
            err.to_string(),
            "Illegal transition for sub_9: canceled -> active"
        );
    }
}
