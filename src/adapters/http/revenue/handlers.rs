//! HTTP handlers for revenue endpoints.
//!
//! These handlers connect Axum routes to the application layer.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{FromRef, Json, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;

use crate::adapters::http::error::ApiError;
use crate::adapters::websocket::{LiveBroadcaster, LiveState};
use crate::application::handlers::revenue::{
    IngestWebhookCommand, IngestWebhookHandler, ProgressQueryService,
};
use crate::domain::foundation::SubscriptionId;

use super::dto::{
    HealthResponse, ProgressQuery, ProgressResponse, TrialResponse, WebhookAck,
    WeeklyProgressQuery, WeeklyProgressResponse,
};

/// Header carrying `t=<unix>,v1=<hex hmac>`.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared state for every revenue route.
#[derive(Clone)]
pub struct RevenueAppState {
    pub ingest: Arc<IngestWebhookHandler>,
    pub progress: Arc<ProgressQueryService>,
    pub broadcaster: Arc<LiveBroadcaster>,
}

impl FromRef<RevenueAppState> for LiveState {
    fn from_ref(state: &RevenueAppState) -> Self {
        LiveState {
            broadcaster: state.broadcaster.clone(),
            progress: state.progress.clone(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/payments
///
/// 200 once the event is durably claimed (or was already), 400 when the
/// signature does not verify, 500 when the claim could not be stored.
pub async fn receive_payment_webhook(
    State(state): State<RevenueAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let cmd = IngestWebhookCommand {
        payload: body.to_vec(),
        signature,
    };

    match state.ingest.handle(cmd).await {
        Ok(result) => (StatusCode::OK, Json(WebhookAck::from(&result))).into_response(),
        Err(e) if e.status_code().is_success() => {
            (StatusCode::OK, Json(WebhookAck::acknowledged(&e))).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Progress
// ════════════════════════════════════════════════════════════════════════════════

/// GET /revenue/progress?date=YYYY-MM-DD
pub async fn get_progress(
    State(state): State<RevenueAppState>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let date = parse_date("date", query.date.as_deref())?;
    let snapshot = state.progress.get_progress(date).await?;
    Ok(Json(ProgressResponse::from(&snapshot)))
}

/// GET /revenue/progress/weekly?end=YYYY-MM-DD&days=7
pub async fn get_weekly_progress(
    State(state): State<RevenueAppState>,
    Query(query): Query<WeeklyProgressQuery>,
) -> Result<Json<WeeklyProgressResponse>, ApiError> {
    let end = parse_date("end", query.end.as_deref())?;
    let weekly = state.progress.get_weekly_progress(end, query.days).await?;
    Ok(Json(WeeklyProgressResponse::from(&weekly)))
}

/// GET /trials/:subscription_id
pub async fn get_trial(
    State(state): State<RevenueAppState>,
    Path(subscription_id): Path<String>,
) -> Result<Json<TrialResponse>, ApiError> {
    let subscription_id = SubscriptionId::new(subscription_id)
        .map_err(|e| ApiError::bad_request("INVALID_SUBSCRIPTION_ID", e.to_string()))?;

    match state.progress.get_trial(&subscription_id).await? {
        Some(subscription) => Ok(Json(TrialResponse::from(&subscription))),
        None => Err(ApiError::not_found(
            "SUBSCRIPTION_NOT_FOUND",
            format!("No trial for {}", subscription_id),
        )),
    }
}

/// GET /health
pub async fn health(State(state): State<RevenueAppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        live_observers: state.broadcaster.observer_count(),
    })
}

fn parse_date(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(|s| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
                ApiError::bad_request("INVALID_DATE", format!("{} must be YYYY-MM-DD", field))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_iso_dates() {
        assert_eq!(
            parse_date("date", Some("2024-03-14")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 14)
        );
        assert_eq!(parse_date("date", None).unwrap(), None);
        assert_eq!(parse_date("date", Some("")).unwrap(), None);
    }

    #[test]
    fn parse_date_rejects_other_formats() {
        for raw in ["14/03/2024", "2024-13-01", "yesterday"] {
            assert!(parse_date("date", Some(raw)).is_err());
        }
    }
}
