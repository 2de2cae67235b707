//! TrialLifecycleEngine - drives each subscription's state machine from events.
//!
//! Every write is a compare-and-swap on the subscription version. A writer
//! that loses the race reloads and decides again, so two events for the same
//! subscription can never both apply against the same prior state.

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::foundation::{EventId, SubscriptionId, Timestamp};
use crate::domain::revenue::{IngestError, PaymentEvent, SubscriptionCreated};
use crate::domain::trial::{Customer, TrialState, TrialSubscription};
use crate::ports::{CustomerRepository, SaveOutcome, TrialRepository};

/// Default number of reload-and-retry rounds after a version conflict.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 8;

/// What the engine did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleOutcome {
    /// A new subscription was stored; `activated` when the gateway already
    /// confirmed the trial had begun.
    Started {
        subscription: TrialSubscription,
        activated: bool,
    },
    Transitioned {
        subscription: TrialSubscription,
        from: TrialState,
        to: TrialState,
    },
    /// The subscription already reflects this event.
    Replayed {
        subscription: TrialSubscription,
    },
    Unchanged {
        reason: String,
    },
}

impl LifecycleOutcome {
    fn unchanged(reason: impl Into<String>) -> Self {
        LifecycleOutcome::Unchanged {
            reason: reason.into(),
        }
    }
}

/// How `advance` treats a subscription that is not stored.
#[derive(Debug, Clone, Copy)]
enum Missing {
    Unchanged,
    Pending,
}

pub struct TrialLifecycleEngine {
    trials: Arc<dyn TrialRepository>,
    customers: Arc<dyn CustomerRepository>,
    conflict_retries: u32,
}

impl TrialLifecycleEngine {
    pub fn new(trials: Arc<dyn TrialRepository>, customers: Arc<dyn CustomerRepository>) -> Self {
        Self {
            trials,
            customers,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Applies one event.
    ///
    /// `Err(IllegalTransition)` means the event was valid but the subscription
    /// refused it; nothing was written. `Err(SubscriptionPending)` means a
    /// lifecycle event outran its `subscription.created`; it is retried later.
    pub async fn apply(
        &self,
        event_id: &EventId,
        event: &PaymentEvent,
        at: Timestamp,
    ) -> Result<LifecycleOutcome, IngestError> {
        match event {
            PaymentEvent::SubscriptionCreated(created) => self.start(event_id, created, at).await,
            PaymentEvent::Unknown { .. } => Ok(LifecycleOutcome::unchanged("not a lifecycle event")),
            other => match other.subscription_id() {
                Some(subscription_id) => {
                    let missing = match other {
                        PaymentEvent::PaymentSucceeded(_) => Missing::Unchanged,
                        _ => Missing::Pending,
                    };
                    self.advance(subscription_id, Some(event_id), at, missing, |sub| {
                        let target = sub.decide(other)?;
                        if target.is_some() {
                            sub.refresh_trial_end(other);
                        }
                        Ok(target)
                    })
                    .await
                }
                None => Ok(LifecycleOutcome::unchanged("payment without subscription")),
            },
        }
    }

    /// Expires an ending-soon subscription whose trial window has closed.
    pub async fn expire_if_lapsed(
        &self,
        subscription_id: &SubscriptionId,
        now: Timestamp,
        grace_secs: i64,
    ) -> Result<LifecycleOutcome, IngestError> {
        self.advance(subscription_id, None, now, Missing::Unchanged, |sub| {
            Ok(sub
                .is_lapsed(&now, grace_secs)
                .then_some(TrialState::Expired))
        })
        .await
    }

    async fn start(
        &self,
        event_id: &EventId,
        created: &SubscriptionCreated,
        at: Timestamp,
    ) -> Result<LifecycleOutcome, IngestError> {
        self.register_customer(created, at).await?;

        if let Some(existing) = self.trials.find(&created.subscription_id).await? {
            if existing.last_event_id.as_ref() == Some(event_id) {
                return Ok(LifecycleOutcome::Replayed {
                    subscription: existing,
                });
            }
            debug!(
                subscription_id = %created.subscription_id,
                state = %existing.state,
                "Subscription already known"
            );
            return Ok(LifecycleOutcome::unchanged("subscription already exists"));
        }

        let mut subscription = TrialSubscription::create(created, event_id, at);
        let activated = created.status.confirms_trial();
        if activated {
            subscription.transition(TrialState::Active, Some(event_id.clone()), at)?;
        }

        match self.trials.insert(&subscription).await? {
            SaveOutcome::Saved => {
                info!(
                    subscription_id = %subscription.subscription_id,
                    state = %subscription.state,
                    "Trial subscription created"
                );
                Ok(LifecycleOutcome::Started {
                    subscription,
                    activated,
                })
            }
            SaveOutcome::Conflict => Ok(LifecycleOutcome::unchanged("subscription already exists")),
        }
    }

    async fn register_customer(
        &self,
        created: &SubscriptionCreated,
        at: Timestamp,
    ) -> Result<(), IngestError> {
        let customer = Customer::new(
            created.customer_id.clone(),
            created.customer_email.clone(),
            created.acquisition_tags.clone(),
            at,
        );
        if !self.customers.register(&customer).await? && !created.acquisition_tags.is_empty() {
            self.customers
                .annotate(&created.customer_id, &created.acquisition_tags)
                .await?;
        }
        Ok(())
    }

    /// Load, decide, compare-and-swap; repeat on conflict.
    async fn advance<F>(
        &self,
        subscription_id: &SubscriptionId,
        event_id: Option<&EventId>,
        at: Timestamp,
        missing: Missing,
        decide: F,
    ) -> Result<LifecycleOutcome, IngestError>
    where
        F: Fn(&mut TrialSubscription) -> Result<Option<TrialState>, IngestError>,
    {
        for _ in 0..=self.conflict_retries {
            let mut subscription = match self.trials.find(subscription_id).await? {
                Some(subscription) => subscription,
                None => {
                    return match missing {
                        Missing::Unchanged => Ok(LifecycleOutcome::unchanged("unknown subscription")),
                        Missing::Pending => {
                            debug!(subscription_id = %subscription_id, "Lifecycle event ahead of creation");
                            Err(IngestError::SubscriptionPending(subscription_id.clone()))
                        }
                    }
                }
            };

            if event_id.is_some() && subscription.last_event_id.as_ref() == event_id {
                return Ok(LifecycleOutcome::Replayed { subscription });
            }

            let target = match decide(&mut subscription)? {
                Some(target) => target,
                None => return Ok(LifecycleOutcome::unchanged("no transition")),
            };

            let from = subscription.state;
            let expected_version = subscription.version;
            subscription.transition(target, event_id.cloned(), at)?;

            match self.trials.update(&subscription, expected_version).await? {
                SaveOutcome::Saved => {
                    info!(
                        subscription_id = %subscription_id,
                        from = %from,
                        to = %target,
                        "Trial transitioned"
                    );
                    return Ok(LifecycleOutcome::Transitioned {
                        subscription,
                        from,
                        to: target,
                    });
                }
                SaveOutcome::Conflict => {
                    debug!(subscription_id = %subscription_id, "Version conflict, reloading");
                }
            }
        }

        Err(IngestError::PersistenceFailure(format!(
            "subscription {} kept changing after {} retries",
            subscription_id, self.conflict_retries
        )))
    }
}
