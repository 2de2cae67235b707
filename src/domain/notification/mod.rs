//! Notification module - outbound messages to downstream collaborators.
//!
//! The core only decides *that* a notification of a kind with a payload is
//! due. Formatting for CRM, email and dashboards is the receiver's concern.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{NotificationId, Timestamp, ValidationError};
use crate::domain::revenue::DailyRevenueSnapshot;
use crate::domain::trial::{TrialState, TrialSubscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Upsert the customer/subscription in the CRM.
    CrmSync,
    /// Nudge a trial that is about to end towards paying.
    ConversionNudge,
    /// Transactional email for a lifecycle transition.
    LifecycleEmail,
    /// Dashboard alert when a day's target is first reached.
    TargetAchieved,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::CrmSync,
        NotificationKind::ConversionNudge,
        NotificationKind::LifecycleEmail,
        NotificationKind::TargetAchieved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CrmSync => "crm_sync",
            NotificationKind::ConversionNudge => "conversion_nudge",
            NotificationKind::LifecycleEmail => "lifecycle_email",
            NotificationKind::TargetAchieved => "target_achieved",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("notification_kind", format!("unknown kind '{}'", s))
            })
    }
}

/// A notification the core wants delivered.
///
/// `dedupe_key` identifies the logical message; enqueuing the same key twice
/// yields the original record.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub kind: NotificationKind,
    pub dedupe_key: String,
    pub payload: serde_json::Value,
}

impl NotificationRequest {
    pub fn crm_sync(subscription: &TrialSubscription) -> Self {
        Self {
            kind: NotificationKind::CrmSync,
            dedupe_key: format!(
                "crm_sync:{}:{}",
                subscription.subscription_id, subscription.state
            ),
            payload: subscription_payload(subscription),
        }
    }

    /// One nudge per subscription, however often the gateway repeats itself.
    pub fn conversion_nudge(subscription: &TrialSubscription) -> Self {
        Self {
            kind: NotificationKind::ConversionNudge,
            dedupe_key: format!("conversion_nudge:{}", subscription.subscription_id),
            payload: subscription_payload(subscription),
        }
    }

    pub fn lifecycle_email(subscription: &TrialSubscription, from: Option<TrialState>) -> Self {
        let mut payload = subscription_payload(subscription);
        payload["from_state"] = json!(from.map(|s| s.as_str()));
        Self {
            kind: NotificationKind::LifecycleEmail,
            dedupe_key: format!(
                "lifecycle_email:{}:{}",
                subscription.subscription_id, subscription.state
            ),
            payload,
        }
    }

    pub fn target_achieved(snapshot: &DailyRevenueSnapshot) -> Self {
        Self {
            kind: NotificationKind::TargetAchieved,
            dedupe_key: format!("target_achieved:{}", snapshot.business_date()),
            payload: json!({
                "business_date": snapshot.business_date().to_string(),
                "total_amount": snapshot.total_amount().value(),
                "target_amount": snapshot.target_amount().value(),
                "progress_pct": snapshot.progress_pct(),
            }),
        }
    }
}

fn subscription_payload(subscription: &TrialSubscription) -> serde_json::Value {
    json!({
        "subscription_id": subscription.subscription_id.as_str(),
        "customer_id": subscription.customer_id.as_str(),
        "state": subscription.state.as_str(),
        "trial_end": subscription.trial_end.map(|t| t.to_string()),
        "plan_amount": subscription.plan_amount.value(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    /// Retry budget exhausted.
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "delivery_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

/// Durable record of a notification and every attempt to deliver it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub notification_id: NotificationId,
    pub kind: NotificationKind,
    pub dedupe_key: String,
    pub payload: serde_json::Value,
    pub delivery_attempts: u32,
    pub status: DeliveryStatus,
    pub delivered_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NotificationRecord {
    pub fn from_request(request: NotificationRequest, now: Timestamp) -> Self {
        Self {
            notification_id: NotificationId::new(),
            kind: request.kind,
            dedupe_key: request.dedupe_key,
            payload: request.payload,
            delivery_attempts: 0,
            status: DeliveryStatus::Pending,
            delivered_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records one delivery attempt.
    pub fn record_attempt(&mut self, result: &Result<(), String>, at: Timestamp) {
        self.delivery_attempts += 1;
        self.updated_at = at;
        match result {
            Ok(()) => {
                self.status = DeliveryStatus::Delivered;
                self.delivered_at = Some(at);
                self.last_error = None;
            }
            Err(e) => self.last_error = Some(e.clone()),
        }
    }

    pub fn mark_failed(&mut self, at: Timestamp) {
        self.status = DeliveryStatus::Failed;
        self.updated_at = at;
    }

    pub fn is_pending(&self) -> bool {
        self.status == DeliveryStatus::Pending
    }
}
