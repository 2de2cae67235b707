//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("A database URL is required in production")]
    DatabaseRequiredInProduction,

    #[error("Invalid webhook secret format")]
    InvalidWebhookSecret,

    #[error("Signature tolerance must be between 1 and 3600 seconds")]
    InvalidSignatureTolerance,

    #[error("Unknown business timezone: {0}")]
    InvalidTimezone(String),

    #[error("Daily target must be positive")]
    InvalidDailyTarget,

    #[error("Week length must be between 1 and {0} days")]
    InvalidWeekLength(u32),

    #[error("Invalid notification endpoint for {0}")]
    InvalidEndpointUrl(&'static str),

    #[error("Invalid notification retry policy: {0}")]
    InvalidRetryPolicy(&'static str),

    #[error("Invalid worker setting: {0}")]
    InvalidWorkerSetting(&'static str),

    #[error("Idempotency retention must be at least {0} days")]
    RetentionTooShort(u32),
}
