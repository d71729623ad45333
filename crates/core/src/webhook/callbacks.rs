//! Callback address construction.

use crate::ledger::{AssetKind, RenderFormat};

/// Path of the asset completion webhook.
pub const ASSET_WEBHOOK_PATH: &str = "/api/v1/webhooks/assets";
/// Path of the render completion webhook.
pub const RENDER_WEBHOOK_PATH: &str = "/api/v1/webhooks/renders";

/// Builds the per-job callback URLs handed to external services.
///
/// Each URL encodes the job kind and the shared secret so the inbound handler
/// can authenticate and route the delivery without a body lookup.
#[derive(Debug, Clone)]
pub struct CallbackUrls {
    base_url: String,
    secret: Option<String>,
}

impl CallbackUrls {
    pub fn new(base_url: impl Into<String>, secret: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    pub fn asset(&self, kind: AssetKind) -> String {
        self.build(ASSET_WEBHOOK_PATH, "kind", kind.as_str())
    }

    pub fn render(&self, format: RenderFormat) -> String {
        self.build(RENDER_WEBHOOK_PATH, "format", format.as_str())
    }

    fn build(&self, path: &str, key: &str, value: &str) -> String {
        let mut url = format!("{}{}?{}={}", self.base_url, path, key, value);
        if let Some(ref secret) = self.secret {
            url.push_str("&secret=");
            url.push_str(&urlencoding::encode(secret));
        }
        url
    }
}
