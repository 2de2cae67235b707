//! Durable notification dispatch with bounded retries.
//!
//! `NotificationDispatcher` is the producer side: it stores each request once
//! per dedupe key and hands the id to the worker without waiting on delivery.
//! `DeliveryWorker` is the consumer side: it delivers with exponential
//! backoff, records every attempt, and marks a record failed once its attempt
//! budget is spent. A periodic scan picks up pending records whose hand-off
//! was lost (full channel, restart).
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `max_attempts` | 5 | Attempts per notification, across restarts |
//! | `base_delay` | 500ms | First backoff delay |
//! | `max_delay` | 30s | Backoff ceiling |
//! | `attempt_timeout` | 10s | Per-attempt deadline |
//! | `scan_interval` | 30s | Pending-record rescue interval |

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

use crate::domain::foundation::{DomainError, ErrorCode, NotificationId, Timestamp};
use crate::domain::notification::{DeliveryStatus, NotificationRecord, NotificationRequest};
use crate::ports::{
    DeliveryError, InsertOutcome, NotificationQueue, NotificationRepository, NotificationSink,
};

/// Retry and scheduling knobs for delivery.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
    pub scan_interval: Duration,
    pub batch_size: u32,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(10),
            scan_interval: Duration::from_secs(30),
            batch_size: 100,
        }
    }
}

impl DeliveryPolicy {
    /// Delays between attempts; `remaining` attempts need `remaining - 1` waits.
    fn backoff(&self, remaining: u32) -> impl Iterator<Item = Duration> {
        // ExponentialBackoff yields factor * 2^n milliseconds.
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        ExponentialBackoff::from_millis(2)
            .factor((base_ms / 2).max(1))
            .max_delay(self.max_delay)
            .map(jitter)
            .take(remaining.saturating_sub(1) as usize)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Producer
// ════════════════════════════════════════════════════════════════════════════════

pub struct NotificationDispatcher {
    repository: Arc<dyn NotificationRepository>,
    sender: mpsc::Sender<NotificationId>,
}

impl NotificationDispatcher {
    /// Returns the dispatcher and the receiver to hand to [`DeliveryWorker::run`].
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<NotificationId>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { repository, sender }, receiver)
    }
}

#[async_trait]
impl NotificationQueue for NotificationDispatcher {
    async fn enqueue(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationRecord, DomainError> {
        let record = NotificationRecord::from_request(request, Timestamp::now());

        match self.repository.insert_if_absent(&record).await? {
            InsertOutcome::Inserted => {
                if self.sender.try_send(record.notification_id).is_err() {
                    debug!(
                        notification_id = %record.notification_id,
                        "Delivery queue full, leaving notification for the pending scan"
                    );
                }
                Ok(record)
            }
            InsertOutcome::Existing(existing) => {
                debug!(dedupe_key = %existing.dedupe_key, "Notification already enqueued");
                Ok(existing)
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Consumer
// ════════════════════════════════════════════════════════════════════════════════

pub struct DeliveryWorker {
    repository: Arc<dyn NotificationRepository>,
    sink: Arc<dyn NotificationSink>,
    policy: DeliveryPolicy,
    in_flight: Mutex<HashSet<NotificationId>>,
}

impl DeliveryWorker {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        sink: Arc<dyn NotificationSink>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            repository,
            sink,
            policy,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Delivers handed-off ids and rescues pending records until shutdown.
    ///
    /// Each delivery runs on its own task so one slow collaborator does not
    /// hold up the rest.
    pub async fn run(
        self: Arc<Self>,
        mut receiver: mpsc::Receiver<NotificationId>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut scan = time::interval(self.policy.scan_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("Delivery worker stopping");
                        return;
                    }
                }
                Some(id) = receiver.recv() => {
                    self.clone().spawn_delivery(id);
                }
                _ = scan.tick() => {
                    match self.repository.find_pending(self.policy.batch_size).await {
                        Ok(pending) => {
                            for record in pending {
                                self.clone().spawn_delivery(record.notification_id);
                            }
                        }
                        Err(e) => warn!(error = %e, "Pending notification scan failed"),
                    }
                }
            }
        }
    }

    fn spawn_delivery(self: Arc<Self>, id: NotificationId) {
        tokio::spawn(async move {
            if let Err(e) = self.deliver(id).await {
                warn!(notification_id = %id, error = %e, "Notification delivery aborted");
            }
        });
    }

    /// Delivers one notification, retrying transient failures.
    ///
    /// Returns the final status. Already-settled records and ids that are
    /// being delivered by another task are left alone.
    pub async fn deliver(&self, id: NotificationId) -> Result<DeliveryStatus, DomainError> {
        if !self.claim(id) {
            return Ok(DeliveryStatus::Pending);
        }
        let result = self.deliver_claimed(id).await;
        self.release(id);
        result
    }

    async fn deliver_claimed(&self, id: NotificationId) -> Result<DeliveryStatus, DomainError> {
        let record = self.repository.find(id).await?.ok_or_else(|| {
            DomainError::new(ErrorCode::NotificationNotFound, "Notification not found")
                .with_detail("notification_id", id.to_string())
        })?;
        if !record.is_pending() {
            return Ok(record.status);
        }

        let remaining = self
            .policy
            .max_attempts
            .saturating_sub(record.delivery_attempts);
        if remaining == 0 {
            self.give_up(&record, "attempt budget already spent").await?;
            return Ok(DeliveryStatus::Failed);
        }

        let outcome = RetryIf::spawn(
            self.policy.backoff(remaining),
            || self.attempt(&record),
            DeliveryError::is_transient,
        )
        .await;

        match outcome {
            Ok(()) => {
                info!(
                    notification_id = %id,
                    kind = %record.kind,
                    "Notification delivered"
                );
                Ok(DeliveryStatus::Delivered)
            }
            Err(e) => {
                self.give_up(&record, &e.to_string()).await?;
                Ok(DeliveryStatus::Failed)
            }
        }
    }

    async fn attempt(&self, record: &NotificationRecord) -> Result<(), DeliveryError> {
        let result = match time::timeout(self.policy.attempt_timeout, self.sink.deliver(record)).await
        {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        };

        let logged = result.as_ref().map(|_| ()).map_err(|e| e.to_string());
        if let Err(e) = self
            .repository
            .record_attempt(record.notification_id, &logged, Timestamp::now())
            .await
        {
            warn!(notification_id = %record.notification_id, error = %e, "Failed to record delivery attempt");
        }

        if let Err(e) = &result {
            warn!(
                notification_id = %record.notification_id,
                kind = %record.kind,
                error = %e,
                "Notification delivery attempt failed"
            );
        }
        result
    }

    async fn give_up(&self, record: &NotificationRecord, reason: &str) -> Result<(), DomainError> {
        error!(
            notification_id = %record.notification_id,
            kind = %record.kind,
            dedupe_key = %record.dedupe_key,
            reason = %reason,
            "Notification permanently failed"
        );
        self.repository
            .mark_failed(record.notification_id, Timestamp::now())
            .await
    }

    fn claim(&self, id: NotificationId) -> bool {
        match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.insert(id),
            Err(poisoned) => poisoned.into_inner().insert(id),
        }
    }

    fn release(&self, id: NotificationId) {
        match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryNotificationRepository;
    use crate::domain::notification::NotificationKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` deliveries with the given error.
    struct FlakySink {
        failures: u32,
        error: DeliveryError,
        calls: AtomicU32,
    }

    impl FlakySink {
        fn new(failures: u32, error: DeliveryError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn deliver(&self, _: &NotificationRecord) -> Result<(), DeliveryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
            attempt_timeout: Duration::from_millis(200),
            scan_interval: Duration::from_millis(20),
            batch_size: 10,
        }
    }

    fn request(key: &str) -> NotificationRequest {
        NotificationRequest {
            kind: NotificationKind::ConversionNudge,
            dedupe_key: key.to_string(),
            payload: json!({"subscription_id": "sub_1"}),
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Dispatcher
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn enqueue_dedupes_by_key() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let (dispatcher, mut rx) = NotificationDispatcher::new(repo.clone(), 8);

        let first = dispatcher.enqueue(request("nudge:sub_1")).await.unwrap();
        let second = dispatcher.enqueue(request("nudge:sub_1")).await.unwrap();

        assert_eq!(first.notification_id, second.notification_id);
        assert_eq!(repo.all().await.len(), 1);
        assert_eq!(rx.recv().await, Some(first.notification_id));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_channel_still_stores_record() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let (dispatcher, _rx) = NotificationDispatcher::new(repo.clone(), 1);

        dispatcher.enqueue(request("a")).await.unwrap();
        dispatcher.enqueue(request("b")).await.unwrap();

        assert_eq!(repo.find_pending(10).await.unwrap().len(), 2);
    }

    // ══════════════════════════════════════════════════════════════
    // Delivery
    // ══════════════════════════════════════════════════════════════

    async fn stored(repo: &Arc<InMemoryNotificationRepository>, key: &str) -> NotificationId {
        let record = NotificationRecord::from_request(request(key), Timestamp::now());
        repo.insert_if_absent(&record).await.unwrap();
        record.notification_id
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_delivered() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let sink = Arc::new(FlakySink::new(2, DeliveryError::Unavailable("503".into())));
        let worker = DeliveryWorker::new(repo.clone(), sink.clone(), fast_policy(5));
        let id = stored(&repo, "k").await;

        let status = worker.deliver(id).await.unwrap();

        assert_eq!(status, DeliveryStatus::Delivered);
        assert_eq!(sink.calls(), 3);
        let record = repo.find(id).await.unwrap().unwrap();
        assert_eq!(record.delivery_attempts, 3);
        assert!(record.delivered_at.is_some());
    }

    #[tokio::test]
    async fn exhausted_budget_marks_failed() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let sink = Arc::new(FlakySink::new(u32::MAX, DeliveryError::Timeout));
        let worker = DeliveryWorker::new(repo.clone(), sink.clone(), fast_policy(3));
        let id = stored(&repo, "k").await;

        let status = worker.deliver(id).await.unwrap();

        assert_eq!(status, DeliveryStatus::Failed);
        assert_eq!(sink.calls(), 3);
        let record = repo.find(id).await.unwrap().unwrap();
        assert_eq!(record.status, DeliveryStatus::Failed);
        assert_eq!(record.delivery_attempts, 3);
        assert!(repo.find_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let sink = Arc::new(FlakySink::new(
            u32::MAX,
            DeliveryError::Rejected("400 bad payload".into()),
        ));
        let worker = DeliveryWorker::new(repo.clone(), sink.clone(), fast_policy(5));
        let id = stored(&repo, "k").await;

        assert_eq!(worker.deliver(id).await.unwrap(), DeliveryStatus::Failed);
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test]
    async fn settled_records_are_not_redelivered() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let sink = Arc::new(FlakySink::new(0, DeliveryError::Timeout));
        let worker = DeliveryWorker::new(repo.clone(), sink.clone(), fast_policy(5));
        let id = stored(&repo, "k").await;

        worker.deliver(id).await.unwrap();
        assert_eq!(worker.deliver(id).await.unwrap(), DeliveryStatus::Delivered);
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test]
    async fn budget_counts_earlier_attempts() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let sink = Arc::new(FlakySink::new(u32::MAX, DeliveryError::Timeout));
        let worker = DeliveryWorker::new(repo.clone(), sink.clone(), fast_policy(3));
        let id = stored(&repo, "k").await;
        for _ in 0..2 {
            repo.record_attempt(id, &Err("earlier run".into()), Timestamp::now())
                .await
                .unwrap();
        }

        assert_eq!(worker.deliver(id).await.unwrap(), DeliveryStatus::Failed);
        assert_eq!(sink.calls(), 1);
    }

    #[tokio::test]
    async fn run_delivers_handed_off_and_rescued_records() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let sink = Arc::new(FlakySink::new(0, DeliveryError::Timeout));
        let worker = Arc::new(DeliveryWorker::new(repo.clone(), sink.clone(), fast_policy(3)));
        let (dispatcher, rx) = NotificationDispatcher::new(repo.clone(), 8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Stored without a hand-off: only the scan can find it.
        stored(&repo, "orphan").await;
        let handle = tokio::spawn(worker.clone().run(rx, shutdown_rx));
        dispatcher.enqueue(request("fresh")).await.unwrap();

        let deadline = time::Instant::now() + Duration::from_secs(2);
        while !repo.find_pending(10).await.unwrap().is_empty() {
            assert!(time::Instant::now() < deadline, "notifications never delivered");
            time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(sink.calls(), 2);
    }
}
