//! Background worker configuration

use serde::Deserialize;
use std::time::Duration;

use crate::adapters::websocket::DEFAULT_CAPACITY;
use crate::application::handlers::revenue::RecoveryConfig;
use crate::application::handlers::trial::ExpirySweepConfig;

use super::error::ValidationError;

/// Claims must outlive every gateway redelivery.
pub const MIN_RETENTION_DAYS: u32 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_secs: u64,

    /// Claims younger than this are left to the in-flight request
    #[serde(default = "default_recovery_min_age")]
    pub recovery_min_age_secs: u64,

    #[serde(default = "default_batch_size")]
    pub recovery_batch_size: u32,

    /// Failed applies before recovery gives up on a claimed event
    #[serde(default = "default_recovery_max_attempts")]
    pub recovery_max_attempts: u32,

    #[serde(default = "default_expiry_interval")]
    pub expiry_interval_secs: u64,

    /// Time past `trial_end` before an ENDING_SOON trial is expired
    #[serde(default = "default_expiry_grace")]
    pub expiry_grace_secs: u64,

    /// Buffered updates per live observer before the oldest are dropped
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    /// Settled event log entries older than this are purged; unset keeps them forever
    pub idempotency_retention_days: Option<u32>,
}

impl WorkersConfig {
    pub fn recovery(&self) -> RecoveryConfig {
        RecoveryConfig {
            interval: Duration::from_secs(self.recovery_interval_secs),
            min_age: Duration::from_secs(self.recovery_min_age_secs),
            batch_size: self.recovery_batch_size,
            max_attempts: self.recovery_max_attempts,
            retention: self
                .idempotency_retention_days
                .map(|days| Duration::from_secs(u64::from(days) * 86_400)),
        }
    }

    pub fn expiry(&self) -> ExpirySweepConfig {
        ExpirySweepConfig {
            interval: Duration::from_secs(self.expiry_interval_secs),
            grace: Duration::from_secs(self.expiry_grace_secs),
            batch_size: self.recovery_batch_size,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.recovery_interval_secs == 0 {
            return Err(ValidationError::InvalidWorkerSetting("recovery_interval_secs"));
        }
        if self.recovery_batch_size == 0 {
            return Err(ValidationError::InvalidWorkerSetting("recovery_batch_size"));
        }
        if self.recovery_max_attempts == 0 {
            return Err(ValidationError::InvalidWorkerSetting("recovery_max_attempts"));
        }
        if self.expiry_interval_secs == 0 {
            return Err(ValidationError::InvalidWorkerSetting("expiry_interval_secs"));
        }
        if self.broadcast_capacity == 0 {
            return Err(ValidationError::InvalidWorkerSetting("broadcast_capacity"));
        }
        if let Some(days) = self.idempotency_retention_days {
            if days < MIN_RETENTION_DAYS {
                return Err(ValidationError::RetentionTooShort(MIN_RETENTION_DAYS));
            }
        }
        Ok(())
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            recovery_interval_secs: default_recovery_interval(),
            recovery_min_age_secs: default_recovery_min_age(),
            recovery_batch_size: default_batch_size(),
            recovery_max_attempts: default_recovery_max_attempts(),
            expiry_interval_secs: default_expiry_interval(),
            expiry_grace_secs: default_expiry_grace(),
            broadcast_capacity: default_broadcast_capacity(),
            idempotency_retention_days: None,
        }
    }
}

fn default_recovery_interval() -> u64 {
    30
}

fn default_recovery_min_age() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    100
}

fn default_recovery_max_attempts() -> u32 {
    50
}

fn default_expiry_interval() -> u64 {
    300
}

fn default_expiry_grace() -> u64 {
    86_400
}

fn default_broadcast_capacity() -> usize {
    DEFAULT_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkersConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recovery().retention, None);
        assert_eq!(config.expiry().grace, Duration::from_secs(86_400));
    }

    #[test]
    fn test_short_retention_is_rejected() {
        let config = WorkersConfig {
            idempotency_retention_days: Some(7),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::RetentionTooShort(MIN_RETENTION_DAYS))
        );
    }

    #[test]
    fn test_retention_converts_to_duration() {
        let config = WorkersConfig {
            idempotency_retention_days: Some(45),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(
            config.recovery().retention,
            Some(Duration::from_secs(45 * 86_400))
        );
    }
}
