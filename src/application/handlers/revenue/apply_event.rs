//! EventApplier - applies one claimed event to revenue, lifecycle and fan-out.
//!
//! Shared by webhook ingestion and crash recovery. Every effect is keyed by
//! the event id (revenue contributions, `last_event_id`, notification dedupe
//! keys), so applying the same event twice leaves state unchanged.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::application::handlers::trial::{LifecycleOutcome, TrialLifecycleEngine};
use crate::domain::foundation::Timestamp;
use crate::domain::notification::NotificationRequest;
use crate::domain::revenue::{ApplyOutcome, IngestError, PaymentEvent, RevenueEvent};
use crate::domain::trial::{TrialState, TrialSubscription};
use crate::ports::{NotificationQueue, ProgressBroadcaster, RevenueEventLog};

use super::aggregate_revenue::{AggregateResult, DailyRevenueAggregator};

pub struct EventApplier {
    aggregator: DailyRevenueAggregator,
    lifecycle: TrialLifecycleEngine,
    event_log: Arc<dyn RevenueEventLog>,
    notifications: Arc<dyn NotificationQueue>,
    broadcaster: Arc<dyn ProgressBroadcaster>,
}

impl EventApplier {
    pub fn new(
        aggregator: DailyRevenueAggregator,
        lifecycle: TrialLifecycleEngine,
        event_log: Arc<dyn RevenueEventLog>,
        notifications: Arc<dyn NotificationQueue>,
        broadcaster: Arc<dyn ProgressBroadcaster>,
    ) -> Self {
        Self {
            aggregator,
            lifecycle,
            event_log,
            notifications,
            broadcaster,
        }
    }

    pub fn aggregator(&self) -> &DailyRevenueAggregator {
        &self.aggregator
    }

    pub fn lifecycle(&self) -> &TrialLifecycleEngine {
        &self.lifecycle
    }

    /// Applies the event and records the outcome in the event log.
    ///
    /// On failure the attempt is recorded and the event stays claimed, so
    /// recovery retries it later.
    pub async fn process(
        &self,
        record: &RevenueEvent,
        event: &PaymentEvent,
    ) -> Result<ApplyOutcome, IngestError> {
        match self.apply(record, event).await {
            Ok(outcome) => {
                self.event_log
                    .record_outcome(&record.event_id, &outcome, Timestamp::now())
                    .await?;
                Ok(outcome)
            }
            Err(e) => {
                match &e {
                    IngestError::SubscriptionPending(_) => {
                        warn!(event_id = %record.event_id, error = %e, "Event left for recovery")
                    }
                    _ => error!(event_id = %record.event_id, error = %e, "Failed to apply event"),
                }
                if let Err(log_err) = self
                    .event_log
                    .record_failure(&record.event_id, &e.to_string())
                    .await
                {
                    error!(event_id = %record.event_id, error = %log_err, "Failed to record apply failure");
                }
                Err(e)
            }
        }
    }

    /// Applies the event's effects without touching the event log.
    pub async fn apply(
        &self,
        record: &RevenueEvent,
        event: &PaymentEvent,
    ) -> Result<ApplyOutcome, IngestError> {
        if let PaymentEvent::Unknown { event_type } = event {
            return Ok(ApplyOutcome::Ignored {
                reason: format!("unhandled event type {}", event_type),
            });
        }

        let revenue = self.aggregator.apply(record, event).await?;
        if let AggregateResult::Counted {
            snapshot,
            newly_achieved,
        } = &revenue
        {
            self.broadcaster.publish(snapshot);
            if *newly_achieved {
                info!(
                    business_date = %snapshot.business_date(),
                    total = %snapshot.total_amount(),
                    target = %snapshot.target_amount(),
                    "Daily revenue target achieved"
                );
                self.enqueue(NotificationRequest::target_achieved(snapshot))
                    .await;
            }
        }

        let lifecycle = match self
            .lifecycle
            .apply(&record.event_id, event, Timestamp::now())
            .await
        {
            Ok(outcome) => outcome,
            Err(rejection @ IngestError::IllegalTransition { .. }) => {
                info!(event_id = %record.event_id, reason = %rejection, "Lifecycle transition refused");
                let reason = match revenue {
                    AggregateResult::NotContributing => rejection.to_string(),
                    _ => format!("{} (revenue counted)", rejection),
                };
                return Ok(ApplyOutcome::Rejected { reason });
            }
            Err(e) => return Err(e),
        };

        self.notify_lifecycle(&lifecycle).await;

        Ok(summarize(&revenue, &lifecycle))
    }

    async fn notify_lifecycle(&self, outcome: &LifecycleOutcome) {
        let requests = match outcome {
            LifecycleOutcome::Started {
                subscription,
                activated,
            } => {
                let mut requests = vec![NotificationRequest::crm_sync(subscription)];
                if *activated {
                    requests.push(NotificationRequest::lifecycle_email(subscription, None));
                }
                requests
            }
            LifecycleOutcome::Transitioned {
                subscription, from, ..
            } => transition_requests(subscription, Some(*from)),
            // Re-enqueue in case a crash cut off the first attempt; dedupe
            // keys collapse the repeats.
            LifecycleOutcome::Replayed { subscription } => {
                if subscription.state == TrialState::Created {
                    vec![NotificationRequest::crm_sync(subscription)]
                } else {
                    transition_requests(subscription, None)
                }
            }
            LifecycleOutcome::Unchanged { .. } => Vec::new(),
        };

        for request in requests {
            self.enqueue(request).await;
        }
    }

    /// Notification failures never fail accounting.
    async fn enqueue(&self, request: NotificationRequest) {
        let kind = request.kind;
        let dedupe_key = request.dedupe_key.clone();
        if let Err(e) = self.notifications.enqueue(request).await {
            warn!(kind = %kind, dedupe_key = %dedupe_key, error = %e, "Failed to enqueue notification");
        }
    }
}

fn transition_requests(
    subscription: &TrialSubscription,
    from: Option<TrialState>,
) -> Vec<NotificationRequest> {
    match subscription.state {
        TrialState::EndingSoon => vec![
            NotificationRequest::conversion_nudge(subscription),
            NotificationRequest::lifecycle_email(subscription, from),
        ],
        TrialState::Active | TrialState::Converted => vec![
            NotificationRequest::crm_sync(subscription),
            NotificationRequest::lifecycle_email(subscription, from),
        ],
        _ => vec![NotificationRequest::lifecycle_email(subscription, from)],
    }
}

fn summarize(revenue: &AggregateResult, lifecycle: &LifecycleOutcome) -> ApplyOutcome {
    let mut parts = Vec::new();
    match revenue {
        AggregateResult::Counted { snapshot, .. } => {
            parts.push(format!("counted toward {}", snapshot.business_date()))
        }
        AggregateResult::AlreadyCounted(snapshot) => {
            parts.push(format!("already counted toward {}", snapshot.business_date()))
        }
        AggregateResult::NotContributing => {}
    }
    match lifecycle {
        LifecycleOutcome::Started { subscription, .. } => {
            parts.push(format!("{} started as {}", subscription.subscription_id, subscription.state))
        }
        LifecycleOutcome::Transitioned {
            subscription,
            from,
            to,
        } => parts.push(format!("{} {} -> {}", subscription.subscription_id, from, to)),
        LifecycleOutcome::Replayed { subscription } => parts.push(format!(
            "{} already {}",
            subscription.subscription_id, subscription.state
        )),
        LifecycleOutcome::Unchanged { reason } => {
            if parts.is_empty() {
                return ApplyOutcome::Ignored {
                    reason: reason.clone(),
                };
            }
        }
    }
    ApplyOutcome::Applied {
        detail: parts.join("; "),
    }
}
