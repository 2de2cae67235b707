//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::revenue::DEFAULT_TOLERANCE_SECS;

use super::error::ValidationError;

/// Payment gateway configuration (webhook verification)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Webhook signing secret shared with the gateway
    pub webhook_secret: SecretString,

    /// Maximum age of a signed timestamp, in seconds
    #[serde(default = "default_tolerance")]
    pub signature_tolerance_secs: i64,
}

impl PaymentConfig {
    /// Validate payment configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        let secret = self.webhook_secret.expose_secret();
        if secret.trim().is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__WEBHOOK_SECRET"));
        }
        if !secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidWebhookSecret);
        }
        if !(1..=3600).contains(&self.signature_tolerance_secs) {
            return Err(ValidationError::InvalidSignatureTolerance);
        }
        Ok(())
    }
}

fn default_tolerance() -> i64 {
    DEFAULT_TOLERANCE_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> PaymentConfig {
        PaymentConfig {
            webhook_secret: SecretString::new(secret.to_string()),
            signature_tolerance_secs: default_tolerance(),
        }
    }

    #[test]
    fn test_validation_missing_secret() {
        assert_eq!(
            config("").validate(),
            Err(ValidationError::MissingRequired("PAYMENT__WEBHOOK_SECRET"))
        );
    }

    #[test]
    fn test_validation_invalid_secret_prefix() {
        assert_eq!(
            config("secret_xxx").validate(),
            Err(ValidationError::InvalidWebhookSecret)
        );
    }

    #[test]
    fn test_validation_tolerance_bounds() {
        let mut payment = config("whsec_xyz789");
        assert!(payment.validate().is_ok());

        payment.signature_tolerance_secs = 0;
        assert_eq!(
            payment.validate(),
            Err(ValidationError::InvalidSignatureTolerance)
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", config("whsec_topsecret"));
        assert!(!rendered.contains("topsecret"));
    }
}
