//! TrialExpirySweeper - expires ending-soon trials the gateway never closed.
//!
//! The gateway normally reports the end of a trial, but a missed or delayed
//! event would leave a subscription in `ending_soon` forever. The sweeper
//! moves those to `expired` once the trial end plus a grace period has passed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::domain::foundation::Timestamp;
use crate::domain::notification::NotificationRequest;
use crate::domain::revenue::IngestError;
use crate::ports::{NotificationQueue, TrialRepository};

use super::lifecycle_engine::{LifecycleOutcome, TrialLifecycleEngine};

#[derive(Debug, Clone)]
pub struct ExpirySweepConfig {
    pub interval: Duration,
    /// Time after `trial_end` before the trial counts as lapsed.
    pub grace: Duration,
    pub batch_size: u32,
}

impl Default for ExpirySweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            grace: Duration::from_secs(86_400),
            batch_size: 100,
        }
    }
}

pub struct TrialExpirySweeper {
    trials: Arc<dyn TrialRepository>,
    engine: Arc<TrialLifecycleEngine>,
    notifications: Arc<dyn NotificationQueue>,
    config: ExpirySweepConfig,
}

impl TrialExpirySweeper {
    pub fn new(
        trials: Arc<dyn TrialRepository>,
        engine: Arc<TrialLifecycleEngine>,
        notifications: Arc<dyn NotificationQueue>,
        config: ExpirySweepConfig,
    ) -> Self {
        Self {
            trials,
            engine,
            notifications,
            config,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("Expiry sweeper stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once(Timestamp::now()).await {
                        warn!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        }
    }

    /// Expires every lapsed trial as of `now`. Returns how many moved.
    pub async fn run_once(&self, now: Timestamp) -> Result<usize, IngestError> {
        let grace = i64::try_from(self.config.grace.as_secs()).unwrap_or(i64::MAX);
        let lapsed = self
            .trials
            .find_lapsed(now.minus_secs(grace), self.config.batch_size)
            .await?;

        let mut expired = 0;
        for subscription in lapsed {
            match self
                .engine
                .expire_if_lapsed(&subscription.subscription_id, now, grace)
                .await
            {
                Ok(LifecycleOutcome::Transitioned {
                    subscription, from, ..
                }) => {
                    info!(subscription_id = %subscription.subscription_id, "Trial lapsed without conversion");
                    let request = NotificationRequest::lifecycle_email(&subscription, Some(from));
                    if let Err(e) = self.notifications.enqueue(request).await {
                        warn!(subscription_id = %subscription.subscription_id, error = %e, "Failed to enqueue notification");
                    }
                    expired += 1;
                }
                // Converted or canceled since the scan.
                Ok(_) | Err(IngestError::IllegalTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(expired)
    }
}
