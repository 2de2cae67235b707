//! Validated revenue events and their processing record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Cents, CustomerId, EventId, Timestamp, ValidationError};

use super::errors::IngestError;
use super::gateway_event::{GatewayEnvelope, PaymentEvent};
use super::webhook_verifier::WebhookVerifier;

/// An authenticated gateway event as written to the append-only log.
///
/// The raw payload is the source of truth; the typed event is re-derived from
/// it when the event is replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub customer_id: Option<CustomerId>,
    pub amount: Cents,
    pub occurred_at: Timestamp,
    pub raw_payload: serde_json::Value,
    pub received_at: Timestamp,
}

impl RevenueEvent {
    /// Re-derives the typed event from the stored payload.
    pub fn payment_event(&self) -> Result<PaymentEvent, IngestError> {
        GatewayEnvelope::from_value(&self.raw_payload)?.to_event()
    }
}

/// Output of the validator: the log record plus its typed form.
#[derive(Debug, Clone)]
pub struct ValidatedEvent {
    pub record: RevenueEvent,
    pub event: PaymentEvent,
}

/// Authenticates inbound webhooks and turns them into typed events.
pub struct EventValidator {
    verifier: WebhookVerifier,
}

impl EventValidator {
    pub fn new(verifier: WebhookVerifier) -> Self {
        Self { verifier }
    }

    /// Verifies the signature, then parses the body.
    ///
    /// Signature failures surface as `InvalidSignature`/`MalformedSignature`/
    /// `SignatureExpired`. An authentic body that cannot be understood is
    /// `UnparseableEvent`. Unknown event types succeed as
    /// [`PaymentEvent::Unknown`].
    pub fn validate(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<ValidatedEvent, IngestError> {
        let header = signature_header
            .ok_or_else(|| IngestError::MalformedSignature("missing signature header".into()))?;
        self.verifier.verify(payload, header)?;
        Self::parse(payload, Timestamp::now())
    }

    /// Parses an already-authenticated body.
    pub fn parse(payload: &[u8], received_at: Timestamp) -> Result<ValidatedEvent, IngestError> {
        let envelope = GatewayEnvelope::parse(payload)?;
        let event = envelope.to_event()?;
        let raw_payload: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| IngestError::UnparseableEvent(e.to_string()))?;

        let record = RevenueEvent {
            event_id: envelope.event_id()?,
            event_type: envelope.event_type.clone(),
            customer_id: event.customer_id().cloned(),
            amount: event.amount(),
            occurred_at: envelope.occurred_at()?,
            raw_payload,
            received_at,
        };

        Ok(ValidatedEvent { record, event })
    }
}

/// Where an event stands in the apply pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Durably claimed, effects not yet applied.
    Claimed,
    Applied,
    /// Authentic but nothing to do (unknown type, unrelated payload).
    Ignored,
    /// Kept for audit; the lifecycle refused the transition.
    Rejected,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Claimed => "claimed",
            ProcessingStatus::Applied => "applied",
            ProcessingStatus::Ignored => "ignored",
            ProcessingStatus::Rejected => "rejected",
        }
    }

    /// Claimed events are the only ones recovery picks up.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ProcessingStatus::Claimed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claimed" => Ok(ProcessingStatus::Claimed),
            "applied" => Ok(ProcessingStatus::Applied),
            "ignored" => Ok(ProcessingStatus::Ignored),
            "rejected" => Ok(ProcessingStatus::Rejected),
            other => Err(ValidationError::invalid_format(
                "processing_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Result of applying an event to state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { detail: String },
    Ignored { reason: String },
    Rejected { reason: String },
}

impl ApplyOutcome {
    pub fn status(&self) -> ProcessingStatus {
        match self {
            ApplyOutcome::Applied { .. } => ProcessingStatus::Applied,
            ApplyOutcome::Ignored { .. } => ProcessingStatus::Ignored,
            ApplyOutcome::Rejected { .. } => ProcessingStatus::Rejected,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ApplyOutcome::Applied { detail } => detail,
            ApplyOutcome::Ignored { reason } | ApplyOutcome::Rejected { reason } => reason,
        }
    }
}

/// One row of the event log: the immutable event plus processing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLogEntry {
    pub event: RevenueEvent,
    pub status: ProcessingStatus,
    pub outcome_detail: Option<String>,
    pub apply_attempts: u32,
    pub last_error: Option<String>,
    pub processed_at: Option<Timestamp>,
}

impl EventLogEntry {
    /// A freshly claimed entry.
    pub fn claimed(event: RevenueEvent) -> Self {
        Self {
            event,
            status: ProcessingStatus::Claimed,
            outcome_detail: None,
            apply_attempts: 0,
            last_error: None,
            processed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::revenue::gateway_event::test_support;
    use crate::domain::revenue::webhook_verifier::sign_payload;
    use secrecy::SecretString;

    const SECRET: &str = "whsec_validator";

    fn validator() -> EventValidator {
        EventValidator::new(WebhookVerifier::new(SecretString::new(SECRET.to_string())))
    }

    #[test]
    fn validate_builds_record() {
        let body = test_support::payment("evt_1", 1_710_000_000, 7900, Some("sub_1"));
        let header = sign_payload(SECRET, chrono::Utc::now().timestamp(), body.as_bytes());

        let validated = validator().validate(body.as_bytes(), Some(&header)).unwrap();

        assert_eq!(validated.record.event_id.as_str(), "evt_1");
        assert_eq!(validated.record.event_type, "invoice.payment_succeeded");
        assert_eq!(validated.record.amount.value(), 7900);
        assert_eq!(validated.record.customer_id.as_ref().unwrap().as_str(), "cus_1");
        assert_eq!(validated.record.occurred_at.as_unix_secs(), 1_710_000_000);
        assert!(matches!(validated.event, PaymentEvent::PaymentSucceeded(_)));
    }

    #[test]
    fn validate_requires_header() {
        let body = test_support::payment("evt_1", 1, 7900, None);
        let result = validator().validate(body.as_bytes(), None);
        assert!(matches!(result, Err(IngestError::MalformedSignature(_))));
    }

    #[test]
    fn signature_is_checked_before_parsing() {
        let header = sign_payload("whsec_wrong", chrono::Utc::now().timestamp(), b"garbage");
        let result = validator().validate(b"garbage", Some(&header));
        assert!(matches!(result, Err(IngestError::InvalidSignature)));
    }

    #[test]
    fn authentic_garbage_is_unparseable() {
        let header = sign_payload(SECRET, chrono::Utc::now().timestamp(), b"garbage");
        let result = validator().validate(b"garbage", Some(&header));
        assert!(matches!(result, Err(IngestError::UnparseableEvent(_))));
    }

    #[test]
    fn stored_payload_replays_to_same_event() {
        let body = test_support::payment("evt_2", 1, 500, Some("sub_2"));
        let validated = EventValidator::parse(body.as_bytes(), Timestamp::now()).unwrap();

        assert_eq!(validated.record.payment_event().unwrap(), validated.event);
    }

    #[test]
    fn processing_status_round_trips_through_str() {
        for status in [
            ProcessingStatus::Claimed,
            ProcessingStatus::Applied,
            ProcessingStatus::Ignored,
            ProcessingStatus::Rejected,
        ] {
            assert_eq!(status.as_str().parse::<ProcessingStatus>().unwrap(), status);
        }
        assert!(!ProcessingStatus::Claimed.is_settled());
        assert!(ProcessingStatus::Rejected.is_settled());
    }
}
