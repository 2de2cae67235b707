//! Data Transfer Objects for revenue HTTP endpoints.
//!
//! Amounts are integer minor units (cents). Dates are `YYYY-MM-DD` business
//! dates in the configured timezone.

use serde::{Deserialize, Serialize};

use crate::application::handlers::revenue::IngestResult;
use crate::domain::revenue::{DailyRevenueSnapshot, IngestError, WeeklyProgress};
use crate::domain::trial::TrialSubscription;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Query for `GET /revenue/progress`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressQuery {
    /// `YYYY-MM-DD`; today in the business timezone when absent.
    pub date: Option<String>,
}

/// Query for `GET /revenue/progress/weekly`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeeklyProgressQuery {
    /// Last date of the window, inclusive.
    pub end: Option<String>,
    pub days: Option<u32>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Progress for one business date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub business_date: String,
    pub total_amount: i64,
    pub target_amount: i64,
    /// Unclamped; exceeds 100 once the target is passed.
    pub progress_pct: f64,
    /// Clamped to `[0, 100]` for progress bars.
    pub display_progress_pct: f64,
    pub achieved_flag: bool,
    pub payment_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<&DailyRevenueSnapshot> for ProgressResponse {
    fn from(snapshot: &DailyRevenueSnapshot) -> Self {
        Self {
            business_date: snapshot.business_date().to_string(),
            total_amount: snapshot.total_amount().value(),
            target_amount: snapshot.target_amount().value(),
            progress_pct: snapshot.progress_pct(),
            display_progress_pct: snapshot.display_progress_pct(),
            achieved_flag: snapshot.achieved_flag(),
            payment_count: snapshot.payment_count(),
            updated_at: snapshot.updated_at().map(|t| t.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyProgressResponse {
    pub start_date: String,
    pub end_date: String,
    pub total_amount: i64,
    pub target_amount: i64,
    pub progress_pct: f64,
    pub achieved_flag: bool,
    pub days: Vec<ProgressResponse>,
}

impl From<&WeeklyProgress> for WeeklyProgressResponse {
    fn from(weekly: &WeeklyProgress) -> Self {
        Self {
            start_date: weekly.start_date.to_string(),
            end_date: weekly.end_date.to_string(),
            total_amount: weekly.total_amount.value(),
            target_amount: weekly.target_amount.value(),
            progress_pct: weekly.progress_pct,
            achieved_flag: weekly.achieved_flag,
            days: weekly.days.iter().map(ProgressResponse::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResponse {
    pub subscription_id: String,
    pub customer_id: String,
    pub state: String,
    pub is_terminal: bool,
    pub trial_start: Option<String>,
    pub trial_end: Option<String>,
    pub plan_amount: i64,
    pub last_event_id: Option<String>,
    pub updated_at: String,
}

impl From<&TrialSubscription> for TrialResponse {
    fn from(sub: &TrialSubscription) -> Self {
        Self {
            subscription_id: sub.subscription_id.to_string(),
            customer_id: sub.customer_id.to_string(),
            state: sub.state.as_str().to_string(),
            is_terminal: sub.is_terminal(),
            trial_start: sub.trial_start.map(|t| t.to_string()),
            trial_end: sub.trial_end.map(|t| t.to_string()),
            plan_amount: sub.plan_amount.value(),
            last_event_id: sub.last_event_id.as_ref().map(|id| id.to_string()),
            updated_at: sub.updated_at.to_string(),
        }
    }
}

/// Body returned to the gateway for every acknowledged delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// `applied`, `ignored`, `rejected`, `pending`, `duplicate` or `unparseable`.
    pub status: String,
}

impl From<&IngestResult> for WebhookAck {
    fn from(result: &IngestResult) -> Self {
        Self {
            received: true,
            event_id: Some(result.event_id.to_string()),
            status: result
                .outcome
                .as_ref()
                .map(|o| o.status().as_str())
                .unwrap_or("pending")
                .to_string(),
        }
    }
}

impl WebhookAck {
    /// Acknowledgement for an error the gateway should not retry.
    pub fn acknowledged(err: &IngestError) -> Self {
        let (event_id, status) = match err {
            IngestError::DuplicateEvent(id) => (Some(id.to_string()), "duplicate"),
            IngestError::UnparseableEvent(_) => (None, "unparseable"),
            IngestError::IllegalTransition { .. } => (None, "rejected"),
            _ => (None, "pending"),
        };
        Self {
            received: true,
            event_id,
            status: status.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub live_observers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Cents, EventId};
    use crate::domain::revenue::ApplyOutcome;
    use chrono::NaiveDate;

    #[test]
    fn progress_response_carries_required_fields() {
        let snapshot = DailyRevenueSnapshot::compute(
            NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            Cents::new(30_000).unwrap(),
            Cents::new(60_000).unwrap(),
            3,
            None,
        );
        let json = serde_json::to_value(ProgressResponse::from(&snapshot)).unwrap();

        assert_eq!(json["total_amount"], 30_000);
        assert_eq!(json["target_amount"], 60_000);
        assert_eq!(json["progress_pct"], 50.0);
        assert_eq!(json["achieved_flag"], false);
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn over_target_display_is_clamped() {
        let snapshot = DailyRevenueSnapshot::compute(
            NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            Cents::new(90_000).unwrap(),
            Cents::new(60_000).unwrap(),
            3,
            None,
        );
        let response = ProgressResponse::from(&snapshot);
        assert_eq!(response.progress_pct, 150.0);
        assert_eq!(response.display_progress_pct, 100.0);
    }

    #[test]
    fn ack_reports_pending_when_apply_failed() {
        let result = IngestResult {
            event_id: EventId::new("evt_1").unwrap(),
            outcome: None,
        };
        assert_eq!(WebhookAck::from(&result).status, "pending");

        let applied = IngestResult {
            event_id: EventId::new("evt_1").unwrap(),
            outcome: Some(ApplyOutcome::Applied {
                detail: String::new(),
            }),
        };
        assert_eq!(WebhookAck::from(&applied).status, "applied");
    }

    #[test]
    fn duplicate_ack_echoes_event_id() {
        let ack = WebhookAck::acknowledged(&IngestError::DuplicateEvent(
            EventId::new("evt_9").unwrap(),
        ));
        assert_eq!(ack.status, "duplicate");
        assert_eq!(ack.event_id.as_deref(), Some("evt_9"));
    }
}
