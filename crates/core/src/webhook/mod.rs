//! Webhook gateway: authenticates and applies completion callbacks.

mod callbacks;
mod gateway;
mod verifier;

pub use callbacks::{CallbackUrls, ASSET_WEBHOOK_PATH, RENDER_WEBHOOK_PATH};
pub use gateway::{AssetCallback, CallbackStatus, RenderCallback, WebhookGateway};
pub use verifier::SecretVerifier;

use thiserror::Error;

use crate::ledger::LedgerError;

/// Successful handling of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The ledger was updated and the next stage evaluated.
    Processed,
    /// The job was already terminal; nothing changed.
    AlreadyProcessed,
    /// No job has this handle; nothing changed.
    NotFound,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::NotFound => "not_found",
        }
    }
}

/// Transport-level rejection of a delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Invalid or missing webhook secret")]
    Unauthorized,

    #[error("Malformed webhook: {0}")]
    Malformed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WebhookError {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookError::Unauthorized => "unauthorized",
            WebhookError::Malformed(_) => "malformed",
            WebhookError::Internal(_) => "internal",
        }
    }
}

impl From<LedgerError> for WebhookError {
    fn from(e: LedgerError) -> Self {
        WebhookError::Internal(e.to_string())
    }
}
