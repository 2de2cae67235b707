//! Trial subscription aggregate.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    Cents, CustomerId, EventId, StateMachine, SubscriptionId, Timestamp,
};
use crate::domain::revenue::{IngestError, PaymentEvent, SubscriptionCreated, SubscriptionStatus};

use super::state::TrialState;

/// One subscription's trial, keyed by the gateway subscription id.
///
/// # Invariants
///
/// - `state` only moves along [`TrialState`] edges, never backward
/// - terminal states accept no further transitions
/// - `version` increases by one with every transition and guards concurrent saves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialSubscription {
    pub subscription_id: SubscriptionId,
    pub customer_id: CustomerId,
    pub state: TrialState,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub plan_amount: Cents,

    /// Optimistic concurrency token.
    pub version: u32,

    /// Event that produced the current state; replaying it is a no-op.
    pub last_event_id: Option<EventId>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TrialSubscription {
    /// Starts a subscription in `CREATED`.
    pub fn create(event: &SubscriptionCreated, event_id: &EventId, at: Timestamp) -> Self {
        Self {
            subscription_id: event.subscription_id.clone(),
            customer_id: event.customer_id.clone(),
            state: TrialState::Created,
            trial_start: event.trial_start,
            trial_end: event.trial_end,
            plan_amount: event.plan_amount,
            version: 0,
            last_event_id: Some(event_id.clone()),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Decides which transition, if any, an event asks for.
    ///
    /// - `Ok(Some(state))`: a legal forward transition
    /// - `Ok(None)`: nothing to do (stale, repeated, or not a lifecycle signal)
    /// - `Err(IllegalTransition)`: the subscription is terminal, or the event
    ///   skips a required step
    pub fn decide(&self, event: &PaymentEvent) -> Result<Option<TrialState>, IngestError> {
        let desired = match desired_state(event) {
            Some(desired) => desired,
            None => return Ok(None),
        };

        if self.state.is_terminal() {
            return Err(self.rejection(desired));
        }
        if desired == self.state || desired.rank() < self.state.rank() {
            return Ok(None);
        }
        if self.state.can_transition_to(&desired) {
            return Ok(Some(desired));
        }
        // A payment before the trial winds down is revenue, not a conversion.
        if matches!(event, PaymentEvent::PaymentSucceeded(_)) {
            return Ok(None);
        }
        Err(self.rejection(desired))
    }

    /// Moves to `target`, recording the causing event.
    pub fn transition(
        &mut self,
        target: TrialState,
        event_id: Option<EventId>,
        at: Timestamp,
    ) -> Result<(), IngestError> {
        self.state = self
            .state
            .transition_to(target)
            .map_err(|_| self.rejection(target))?;
        self.version += 1;
        self.last_event_id = event_id;
        self.updated_at = at;
        Ok(())
    }

    /// Takes the latest trial end the gateway reported.
    pub fn refresh_trial_end(&mut self, event: &PaymentEvent) {
        let reported = match event {
            PaymentEvent::TrialEnding(e) => e.trial_end,
            PaymentEvent::SubscriptionUpdated(e) => e.trial_end,
            _ => None,
        };
        if let Some(end) = reported {
            self.trial_end = Some(end);
        }
    }

    /// True when an ending-soon trial has run past its end plus `grace_secs`.
    pub fn is_lapsed(&self, now: &Timestamp, grace_secs: i64) -> bool {
        self.state == TrialState::EndingSoon
            && self
                .trial_end
                .map(|end| now.is_after(&end.plus_secs(grace_secs)))
                .unwrap_or(false)
    }

    fn rejection(&self, attempted: TrialState) -> IngestError {
        IngestError::IllegalTransition {
            subscription_id: self.subscription_id.clone(),
            from: self.state,
            attempted,
        }
    }
}

/// Lifecycle state an event points at, regardless of where the subscription is.
fn desired_state(event: &PaymentEvent) -> Option<TrialState> {
    match event {
        PaymentEvent::SubscriptionUpdated(update) => match update.status {
            ref status if status.confirms_trial() => Some(TrialState::Active),
            SubscriptionStatus::Canceled => Some(TrialState::Canceled),
            SubscriptionStatus::Lapsed => Some(TrialState::Expired),
            _ => None,
        },
        PaymentEvent::TrialEnding(_) => Some(TrialState::EndingSoon),
        PaymentEvent::PaymentSucceeded(payment)
            if payment.amount.is_positive() && payment.is_cycle_invoice() =>
        {
            Some(TrialState::Converted)
        }
        PaymentEvent::PaymentSucceeded(_)
        | PaymentEvent::SubscriptionCreated(_)
        | PaymentEvent::Unknown { .. } => None,
    }
}
