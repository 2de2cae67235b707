//! HTTP delivery to downstream collaborators.
//!
//! Each notification kind posts its JSON payload to its own endpoint (CRM,
//! email service, dashboard). The dedupe key travels as `Idempotency-Key` so
//! receivers can discard at-least-once repeats.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::notification::{NotificationKind, NotificationRecord};
use crate::ports::{DeliveryError, NotificationSink};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

pub struct HttpNotificationSink {
    client: Client,
    endpoints: HashMap<NotificationKind, String>,
    auth_token: Option<SecretString>,
}

impl HttpNotificationSink {
    pub fn new(
        endpoints: HashMap<NotificationKind, String>,
        auth_token: Option<SecretString>,
        request_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoints,
            auth_token,
        })
    }

    pub fn endpoint(&self, kind: NotificationKind) -> Option<&str> {
        self.endpoints.get(&kind).map(String::as_str)
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn deliver(&self, record: &NotificationRecord) -> Result<(), DeliveryError> {
        let Some(url) = self.endpoint(record.kind) else {
            // Nothing configured for this kind; treat as delivered.
            warn!(kind = %record.kind, "No endpoint configured, skipping notification");
            return Ok(());
        };

        let body = json!({
            "notification_id": record.notification_id.to_string(),
            "kind": record.kind.as_str(),
            "payload": record.payload,
            "created_at": record.created_at.to_string(),
        });

        let mut request = self
            .client
            .post(url)
            .header(IDEMPOTENCY_HEADER, &record.dedupe_key)
            .json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        if status.is_success() {
            debug!(kind = %record.kind, status = %status, "Notification accepted");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_status(status, &text))
    }
}

fn classify_transport_error(err: reqwest::Error) -> DeliveryError {
    if err.is_timeout() {
        DeliveryError::Timeout
    } else {
        DeliveryError::Unavailable(err.to_string())
    }
}

/// 5xx and 429 are worth retrying; any other failure status is final.
fn classify_status(status: StatusCode, body: &str) -> DeliveryError {
    let message = format!("{} {}", status.as_u16(), truncate(body, 200));
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        DeliveryError::Unavailable(message)
    } else {
        DeliveryError::Rejected(message)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
