//! Shared-secret verification for inbound callbacks.

use tracing::warn;

use crate::auth::secrets_match;
use crate::config::WebhookConfig;

use super::WebhookError;

/// Checks the `secret` query parameter echoed back by external services.
#[derive(Debug, Clone)]
pub struct SecretVerifier {
    secret: Option<String>,
    dev_mode: bool,
}

impl SecretVerifier {
    pub fn new(secret: Option<String>, dev_mode: bool) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            dev_mode,
        }
    }

    pub fn from_config(config: &WebhookConfig) -> Self {
        Self::new(config.secret.clone(), config.dev_mode)
    }

    /// Accept or reject a delivery.
    ///
    /// With no configured secret, deliveries are only accepted in dev mode.
    pub fn verify(&self, supplied: Option<&str>) -> Result<(), WebhookError> {
        match (&self.secret, supplied) {
            (Some(expected), Some(supplied)) if secrets_match(supplied, expected) => Ok(()),
            (Some(_), _) => Err(WebhookError::Unauthorized),
            (None, _) if self.dev_mode => {
                warn!("Webhook secret not configured; accepting delivery in dev mode");
                Ok(())
            }
            (None, _) => Err(WebhookError::Unauthorized),
        }
    }

    /// Like [`SecretVerifier::verify`], without the dev-mode bypass.
    ///
    /// Operator actions need a real secret even when callbacks do not.
    pub fn verify_configured(&self, supplied: Option<&str>) -> Result<(), WebhookError> {
        match (&self.secret, supplied) {
            (Some(expected), Some(supplied)) if secrets_match(supplied, expected) => Ok(()),
            _ => Err(WebhookError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_secret_accepted() {
        let verifier = SecretVerifier::new(Some("s3cret".to_string()), false);
        assert!(verifier.verify(Some("s3cret")).is_ok());
    }

    #[test]
    fn test_wrong_or_missing_secret_rejected() {
        let verifier = SecretVerifier::new(Some("s3cret".to_string()), true);
        assert!(matches!(verifier.verify(Some("nope")), Err(WebhookError::Unauthorized)));
        assert!(matches!(verifier.verify(None), Err(WebhookError::Unauthorized)));
    }

    #[test]
    fn test_unconfigured_secret_requires_dev_mode() {
        let strict = SecretVerifier::new(None, false);
        assert!(matches!(strict.verify(Some("anything")), Err(WebhookError::Unauthorized)));

        let dev = SecretVerifier::new(Some(String::new()), true);
        assert!(dev.verify(None).is_ok());
    }

    #[test]
    fn test_configured_check_ignores_dev_mode() {
        let dev = SecretVerifier::new(None, true);
        assert!(dev.verify(Some("x")).is_ok());
        assert!(matches!(dev.verify_configured(Some("x")), Err(WebhookError::Unauthorized)));
        assert!(matches!(dev.verify_configured(None), Err(WebhookError::Unauthorized)));

        let configured = SecretVerifier::new(Some("s3cret".to_string()), true);
        assert!(configured.verify_configured(Some("s3cret")).is_ok());
        assert!(configured.verify_configured(Some("nope")).is_err());
    }
}
