//! Notification delivery configuration

use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::adapters::notifications::DeliveryPolicy;
use crate::domain::notification::NotificationKind;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    /// Attempts per notification before it is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Per-attempt deadline in seconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// In-process hand-off queue size; overflow waits for the pending scan
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,

    /// Outbound endpoints; unset kinds are logged and skipped
    pub crm_url: Option<String>,
    pub email_url: Option<String>,
    pub nudge_url: Option<String>,
    pub dashboard_url: Option<String>,

    /// Bearer token sent to every endpoint
    pub auth_token: Option<SecretString>,
}

impl NotificationsConfig {
    pub fn policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            scan_interval: Duration::from_secs(self.scan_interval_secs),
            ..DeliveryPolicy::default()
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Endpoint per kind, skipping blanks.
    pub fn endpoints(&self) -> HashMap<NotificationKind, String> {
        [
            (NotificationKind::CrmSync, &self.crm_url),
            (NotificationKind::LifecycleEmail, &self.email_url),
            (NotificationKind::ConversionNudge, &self.nudge_url),
            (NotificationKind::TargetAchieved, &self.dashboard_url),
        ]
        .into_iter()
        .filter_map(|(kind, url)| {
            url.as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(|u| (kind, u.to_string()))
        })
        .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 || self.max_attempts > 50 {
            return Err(ValidationError::InvalidRetryPolicy("max_attempts must be 1..=50"));
        }
        if self.backoff_base_ms == 0 || self.backoff_base_ms > self.backoff_max_ms {
            return Err(ValidationError::InvalidRetryPolicy(
                "backoff_base_ms must be positive and at most backoff_max_ms",
            ));
        }
        if self.attempt_timeout_secs == 0 {
            return Err(ValidationError::InvalidRetryPolicy("attempt_timeout_secs must be positive"));
        }
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidWorkerSetting("queue_capacity"));
        }
        if self.scan_interval_secs == 0 {
            return Err(ValidationError::InvalidWorkerSetting("scan_interval_secs"));
        }
        for (field, url) in [
            ("crm_url", &self.crm_url),
            ("email_url", &self.email_url),
            ("nudge_url", &self.nudge_url),
            ("dashboard_url", &self.dashboard_url),
        ] {
            if let Some(url) = url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ValidationError::InvalidEndpointUrl(field));
                }
            }
        }
        Ok(())
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            attempt_timeout_secs: default_attempt_timeout(),
            queue_capacity: default_queue_capacity(),
            scan_interval_secs: default_scan_interval(),
            crm_url: None,
            email_url: None,
            nudge_url: None,
            dashboard_url: None,
            auth_token: None,
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_attempt_timeout() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_scan_interval() -> u64 {
    30
}
