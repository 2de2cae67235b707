//! IngestWebhookHandler - the webhook endpoint's command handler.
//!
//! Order matters: authenticate, parse, claim, then apply. Once the claim
//! commits the gateway gets a success response whatever happens during apply;
//! a failed apply is left for recovery instead of being retried by the gateway.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::domain::foundation::EventId;
use crate::domain::revenue::{ApplyOutcome, EventValidator, IngestError};
use crate::ports::{ClaimResult, IdempotencyStore};

use super::apply_event::EventApplier;

/// A raw webhook delivery.
#[derive(Debug, Clone)]
pub struct IngestWebhookCommand {
    /// Body bytes exactly as received; the signature covers them.
    pub payload: Vec<u8>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestResult {
    pub event_id: EventId,
    /// `None` when apply failed and the event awaits recovery.
    pub outcome: Option<ApplyOutcome>,
}

pub struct IngestWebhookHandler {
    validator: EventValidator,
    idempotency: Arc<dyn IdempotencyStore>,
    applier: Arc<EventApplier>,
}

impl IngestWebhookHandler {
    pub fn new(
        validator: EventValidator,
        idempotency: Arc<dyn IdempotencyStore>,
        applier: Arc<EventApplier>,
    ) -> Self {
        Self {
            validator,
            idempotency,
            applier,
        }
    }

    /// Handles one delivery.
    ///
    /// # Errors
    ///
    /// - signature failures: nothing was stored
    /// - `UnparseableEvent`: authentic but unreadable, nothing was stored
    /// - `DuplicateEvent`: the id was claimed before, nothing was applied
    /// - `PersistenceFailure`: the claim itself could not be written
    pub async fn handle(&self, cmd: IngestWebhookCommand) -> Result<IngestResult, IngestError> {
        let validated = match self
            .validator
            .validate(&cmd.payload, cmd.signature.as_deref())
        {
            Ok(validated) => validated,
            Err(e) if e.is_signature_failure() => {
                warn!(error = %e, "Rejected webhook signature");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "Authentic webhook could not be parsed");
                return Err(e);
            }
        };

        let event_id = validated.record.event_id.clone();

        match self.idempotency.try_claim(&validated.record).await {
            Ok(ClaimResult::Claimed) => {}
            Ok(ClaimResult::AlreadyProcessed) => {
                debug!(event_id = %event_id, "Duplicate webhook delivery");
                return Err(IngestError::DuplicateEvent(event_id));
            }
            Err(e) => {
                error!(event_id = %event_id, error = %e, "Failed to claim event");
                return Err(e.into());
            }
        }

        let outcome = self
            .applier
            .process(&validated.record, &validated.event)
            .await
            .ok();

        Ok(IngestResult { event_id, outcome })
    }
}
