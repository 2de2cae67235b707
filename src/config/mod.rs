//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `REVENUE_PULSE` prefix and nested values use `__` as separator.
//!
//! # Example
//!
//! ```no_run
//! use revenue_pulse::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {:?}", config.server.socket_addr());
//! ```

mod database;
mod error;
mod notifications;
mod payment;
mod revenue;
mod server;
mod workers;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use notifications::NotificationsConfig;
pub use payment::PaymentConfig;
pub use revenue::RevenueConfig;
pub use server::{Environment, ServerConfig};
pub use workers::{WorkersConfig, MIN_RETENTION_DAYS};

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration; absent means in-memory stores
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Payment gateway configuration (webhook secret)
    pub payment: PaymentConfig,

    /// Daily target and business timezone
    pub revenue: RevenueConfig,

    /// Notification delivery policy and endpoints
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Recovery, expiry and broadcast workers
    #[serde(default)]
    pub workers: WorkersConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `REVENUE_PULSE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `REVENUE_PULSE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `REVENUE_PULSE__REVENUE__BUSINESS_TIMEZONE=America/New_York`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("REVENUE_PULSE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        if self.is_production() && self.database.url().is_none() {
            return Err(ValidationError::DatabaseRequiredInProduction);
        }
        self.payment.validate()?;
        self.revenue.validate()?;
        self.notifications.validate()?;
        self.workers.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
