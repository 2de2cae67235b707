//! Axum router configuration for revenue endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use crate::adapters::websocket::live_progress_ws;

use super::handlers::{
    get_progress, get_trial, get_weekly_progress, health, receive_payment_webhook,
    RevenueAppState,
};

/// Create the revenue API router.
///
/// # Routes
///
/// ## Webhook (no auth, signature verified)
/// - `POST /webhooks/payments` - Ingest a payment gateway event
///
/// ## Read side
/// - `GET /revenue/progress` - Progress for one business date
/// - `GET /revenue/progress/weekly` - Progress over a window of dates
/// - `GET /revenue/live` - WebSocket stream of progress updates
/// - `GET /trials/:subscription_id` - Trial lifecycle state
/// - `GET /health` - Liveness
pub fn revenue_router() -> Router<RevenueAppState> {
    Router::new()
        .route("/webhooks/payments", post(receive_payment_webhook))
        .route("/revenue/progress", get(get_progress))
        .route("/revenue/progress/weekly", get(get_weekly_progress))
        .route("/revenue/live", get(live_progress_ws))
        .route("/trials/:subscription_id", get(get_trial))
        .route("/health", get(health))
}
