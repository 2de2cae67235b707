//! RecoveryWorker - re-applies events that were claimed but never settled.
//!
//! A crash between claim and apply leaves an event in `claimed`. The gateway
//! already received its success response and will not redeliver, so this
//! worker finishes the job from the stored raw payload.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 30s | How often to scan the log |
//! | `min_age` | 60s | Skip claims younger than this (still in flight) |
//! | `batch_size` | 100 | Max events per pass |
//! | `max_attempts` | 50 | Failed applies before an event is settled as ignored |
//! | `retention` | none | Purge settled events older than this |

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::domain::foundation::Timestamp;
use crate::domain::revenue::{ApplyOutcome, IngestError};
use crate::ports::RevenueEventLog;

use super::apply_event::EventApplier;

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub interval: Duration,
    pub min_age: Duration,
    pub batch_size: u32,
    pub max_attempts: u32,
    pub retention: Option<Duration>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            min_age: Duration::from_secs(60),
            batch_size: 100,
            max_attempts: 50,
            retention: None,
        }
    }
}

/// Counts from one recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub recovered: usize,
    pub failed: usize,
    pub purged: u64,
}

pub struct RecoveryWorker {
    event_log: Arc<dyn RevenueEventLog>,
    applier: Arc<EventApplier>,
    config: RecoveryConfig,
}

impl RecoveryWorker {
    pub fn new(
        event_log: Arc<dyn RevenueEventLog>,
        applier: Arc<EventApplier>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            event_log,
            applier,
            config,
        }
    }

    /// Runs passes until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("Recovery worker stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!(error = %e, "Recovery pass failed");
                    }
                }
            }
        }
    }

    /// One pass over claims older than `min_age`, then retention purge.
    pub async fn run_once(&self) -> Result<RecoveryReport, IngestError> {
        let min_age = i64::try_from(self.config.min_age.as_secs()).unwrap_or(i64::MAX);
        let mut report = self.run_pass(Timestamp::now().minus_secs(min_age)).await?;

        if let Some(retention) = self.config.retention {
            let retention = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
            report.purged = self
                .event_log
                .purge_settled_before(Timestamp::now().minus_secs(retention))
                .await?;
            if report.purged > 0 {
                info!(purged = report.purged, "Purged settled events past retention");
            }
        }

        Ok(report)
    }

    /// Re-applies every event claimed before `claimed_before`.
    pub async fn run_pass(&self, claimed_before: Timestamp) -> Result<RecoveryReport, IngestError> {
        let entries = self
            .event_log
            .find_unapplied(claimed_before, self.config.batch_size)
            .await?;
        let mut report = RecoveryReport::default();

        for entry in entries {
            let record = &entry.event;
            if entry.apply_attempts >= self.config.max_attempts {
                let reason = format!(
                    "gave up after {} attempts: {}",
                    entry.apply_attempts,
                    entry.last_error.as_deref().unwrap_or("unknown error")
                );
                warn!(event_id = %record.event_id, %reason, "Abandoning claimed event");
                self.event_log
                    .record_outcome(&record.event_id, &ApplyOutcome::Ignored { reason }, Timestamp::now())
                    .await?;
                report.failed += 1;
                continue;
            }

            let event = match record.payment_event() {
                Ok(event) => event,
                Err(e) => {
                    warn!(event_id = %record.event_id, error = %e, "Stored payload no longer parses");
                    self.event_log
                        .record_outcome(
                            &record.event_id,
                            &ApplyOutcome::Ignored {
                                reason: e.to_string(),
                            },
                            Timestamp::now(),
                        )
                        .await?;
                    continue;
                }
            };

            match self.applier.process(record, &event).await {
                Ok(outcome) => {
                    info!(
                        event_id = %record.event_id,
                        status = %outcome.status(),
                        attempts = entry.apply_attempts + 1,
                        "Recovered claimed event"
                    );
                    report.recovered += 1;
                }
                Err(_) => report.failed += 1,
            }
        }

        Ok(report)
    }
}
