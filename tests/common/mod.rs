//! Shared fixtures for the integration tests: signed gateway payloads and an
//! in-memory application with a recording notification sink.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::mpsc;

use revenue_pulse::adapters::notifications::DeliveryPolicy;
use revenue_pulse::app::{ServiceSettings, Services, Stores};
use revenue_pulse::application::handlers::revenue::{IngestResult, IngestWebhookCommand};
use revenue_pulse::application::handlers::{ExpirySweepConfig, RecoveryConfig};
use revenue_pulse::domain::foundation::{Cents, NotificationId, Timestamp};
use revenue_pulse::domain::notification::{NotificationKind, NotificationRecord};
use revenue_pulse::domain::revenue::{sign_payload, BusinessCalendar, IngestError};
use revenue_pulse::ports::{DeliveryError, NotificationRepository, NotificationSink};

pub const SECRET: &str = "whsec_integration";
pub const TARGET_CENTS: i64 = 60_000;
pub const TIMEZONE: &str = "America/New_York";

/// 2024-03-14 11:00 in New York.
pub const MARCH_14_MORNING: i64 = 1_710_428_400;

// =============================================================================
// Payloads
// =============================================================================

pub fn envelope(id: &str, event_type: &str, created: i64, object: serde_json::Value) -> String {
    json!({
        "id": id,
        "type": event_type,
        "created": created,
        "data": { "object": object }
    })
    .to_string()
}

/// A renewal-cycle invoice payment.
pub fn payment(id: &str, created: i64, amount: i64, subscription: Option<&str>) -> String {
    invoice(id, created, amount, subscription, "subscription_cycle")
}

pub fn invoice(
    id: &str,
    created: i64,
    amount: i64,
    subscription: Option<&str>,
    billing_reason: &str,
) -> String {
    envelope(
        id,
        "invoice.payment_succeeded",
        created,
        json!({
            "id": format!("in_{}", id),
            "customer": "cus_int",
            "subscription": subscription,
            "amount_paid": amount,
            "billing_reason": billing_reason
        }),
    )
}

pub fn subscription_event(
    id: &str,
    event_type: &str,
    created: i64,
    subscription: &str,
    status: &str,
) -> String {
    envelope(
        id,
        event_type,
        created,
        json!({
            "id": subscription,
            "customer": "cus_int",
            "status": status,
            "trial_start": created,
            "trial_end": created + 14 * 86_400,
            "plan": { "amount": 7900 },
            "metadata": { "email": "grace@example.com", "utm_source": "newsletter" }
        }),
    )
}

/// Signature header for `payload`, timestamped now.
pub fn sign(payload: &str) -> String {
    sign_payload(SECRET, Timestamp::now().as_unix_secs(), payload.as_bytes())
}

pub fn signed(payload: &str) -> IngestWebhookCommand {
    IngestWebhookCommand {
        payload: payload.as_bytes().to_vec(),
        signature: Some(sign(payload)),
    }
}

// =============================================================================
// Recording sink
// =============================================================================

/// Records deliveries; fails the first `fail_first` calls with `Unavailable`.
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<NotificationRecord>>,
    pub calls: Mutex<u32>,
    pub fail_first: u32,
}

impl RecordingSink {
    pub fn failing_first(fail_first: u32) -> Self {
        Self {
            fail_first,
            ..Default::default()
        }
    }

    pub fn delivered_kinds(&self) -> Vec<NotificationKind> {
        self.delivered.lock().unwrap().iter().map(|r| r.kind).collect()
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, record: &NotificationRecord) -> Result<(), DeliveryError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        if call <= self.fail_first {
            return Err(DeliveryError::Unavailable("503 Service Unavailable".to_string()));
        }
        self.delivered.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// =============================================================================
// Application
// =============================================================================

pub fn settings() -> ServiceSettings {
    ServiceSettings {
        calendar: BusinessCalendar::from_name(TIMEZONE).unwrap(),
        daily_target: Cents::new(TARGET_CENTS).unwrap(),
        webhook_secret: SecretString::new(SECRET.to_string()),
        signature_tolerance_secs: 300,
        week_length_days: 7,
        broadcast_capacity: 16,
        notification_queue_capacity: 256,
        delivery: DeliveryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
            attempt_timeout: Duration::from_secs(1),
            scan_interval: Duration::from_millis(50),
            batch_size: 50,
        },
        recovery: RecoveryConfig::default(),
        expiry: ExpirySweepConfig::default(),
    }
}

pub struct TestApp {
    pub stores: Stores,
    pub services: Services,
    pub sink: Arc<RecordingSink>,
    pub delivery_queue: Mutex<Option<mpsc::Receiver<NotificationId>>>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_sink(RecordingSink::default())
    }

    pub fn with_sink(sink: RecordingSink) -> Self {
        let stores = Stores::in_memory();
        let sink = Arc::new(sink);
        let (services, delivery_queue) = Services::build(&stores, sink.clone(), settings());
        Self {
            stores,
            services,
            sink,
            delivery_queue: Mutex::new(Some(delivery_queue)),
        }
    }

    /// Hands the delivery queue to the caller; `None` after the first call.
    pub fn take_delivery_queue(&self) -> Option<mpsc::Receiver<NotificationId>> {
        self.delivery_queue.lock().unwrap().take()
    }

    pub async fn post(&self, payload: &str) -> Result<IngestResult, IngestError> {
        self.services.ingest.handle(signed(payload)).await
    }

    /// Delivers everything pending, one notification at a time.
    pub async fn drain_notifications(&self) {
        let pending = self.stores.notifications.find_pending(1_000).await.unwrap();
        for record in pending {
            self.services
                .delivery
                .deliver(record.notification_id)
                .await
                .unwrap();
        }
    }
}
