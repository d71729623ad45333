//! Inbound completion callbacks.
//!
//! Every delivery goes through the same steps:
//! 1. shared-secret check (no ledger access before it passes)
//! 2. kind and body parsing
//! 3. lookup by external handle
//! 4. terminal-state idempotency
//! 5. ledger update
//! 6. fan-in gate (assets) or finalizer (renders)
//!
//! Business failures after step 5 are recorded on the bundle and never
//! surface as errors, so senders have no reason to retry.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::engine::StageEngine;
use crate::finalizer::Finalizer;
use crate::ledger::{
    AssetKind, Job, JobClass, JobKind, JobLedger, JobOutput, JobStatus, RenderFormat,
    UpdateOutcome,
};
use crate::metrics;
use crate::services::ResultFetcher;

use super::{SecretVerifier, WebhookError, WebhookOutcome};

/// Reported result of an external job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CallbackStatus {
    #[serde(rename = "OK", alias = "ok", alias = "COMPLETED", alias = "completed")]
    Ok,
    #[serde(rename = "ERROR", alias = "error", alias = "FAILED", alias = "failed")]
    Error,
}

/// Body of an asset generation callback.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetCallback {
    pub request_id: String,
    pub status: CallbackStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of a render callback.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderCallback {
    pub render_id: String,
    pub status: CallbackStatus,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct WebhookGateway {
    verifier: SecretVerifier,
    ledger: Arc<dyn JobLedger>,
    fetcher: Arc<dyn ResultFetcher>,
    engine: Arc<StageEngine>,
    finalizer: Arc<Finalizer>,
}

impl WebhookGateway {
    pub fn new(
        verifier: SecretVerifier,
        ledger: Arc<dyn JobLedger>,
        fetcher: Arc<dyn ResultFetcher>,
        engine: Arc<StageEngine>,
        finalizer: Arc<Finalizer>,
    ) -> Self {
        Self {
            verifier,
            ledger,
            fetcher,
            engine,
            finalizer,
        }
    }

    /// Handle an asset generation callback.
    pub async fn handle_asset(
        &self,
        kind: Option<&str>,
        secret: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let result = self.process_asset(kind, secret, body).await;
        record_delivery(JobClass::Asset, &result);
        result
    }

    /// Handle a render callback.
    pub async fn handle_render(
        &self,
        format: Option<&str>,
        secret: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let result = self.process_render(format, secret, body).await;
        record_delivery(JobClass::Render, &result);
        result
    }

    async fn process_asset(
        &self,
        kind: Option<&str>,
        secret: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        self.verifier.verify(secret)?;

        let kind: AssetKind = parse_query(kind, "kind")?;
        let callback: AssetCallback = parse_body(body)?;
        if callback.request_id.trim().is_empty() {
            return Err(WebhookError::Malformed("request_id is empty".to_string()));
        }

        let job = match self.lookup(&callback.request_id, JobKind::Asset(kind))? {
            Lookup::Found(job) => job,
            Lookup::Done(outcome) => return Ok(outcome),
        };

        let update = match callback.status {
            CallbackStatus::Ok => match self.fetcher.fetch_result(kind, &job.handle).await {
                Ok(url) => self.ledger.update_status(
                    &job.id,
                    JobStatus::Completed,
                    Some(JobOutput::new(url)),
                    None,
                )?,
                Err(e) => {
                    warn!(
                        "Result fetch for {} job {} failed, marking failed: {}",
                        kind, job.id, e
                    );
                    self.ledger.update_status(
                        &job.id,
                        JobStatus::Failed,
                        None,
                        Some(format!("result fetch failed: {}", e)),
                    )?
                }
            },
            CallbackStatus::Error => self.ledger.update_status(
                &job.id,
                JobStatus::Failed,
                None,
                Some(error_text(callback.error)),
            )?,
        };

        if !self.applied(&update) {
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        match self.engine.run_fan_in_gate(&job.bundle_id).await {
            Ok(outcome) => debug!(
                "Fan-in gate for bundle {}: {}",
                job.bundle_id,
                outcome.as_str()
            ),
            Err(e) => error!("Fan-in gate for bundle {} errored: {}", job.bundle_id, e),
        }
        Ok(WebhookOutcome::Processed)
    }

    async fn process_render(
        &self,
        format: Option<&str>,
        secret: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        self.verifier.verify(secret)?;

        let format: RenderFormat = parse_query(format, "format")?;
        let callback: RenderCallback = parse_body(body)?;
        if callback.render_id.trim().is_empty() {
            return Err(WebhookError::Malformed("render_id is empty".to_string()));
        }

        let job = match self.lookup(&callback.render_id, JobKind::Render(format))? {
            Lookup::Found(job) => job,
            Lookup::Done(outcome) => return Ok(outcome),
        };

        let update = match callback.status {
            // A success without a video is recorded as such; validation rejects it.
            CallbackStatus::Ok => {
                let output = callback.video_url.filter(|u| !u.is_empty()).map(|url| {
                    let output = JobOutput::new(url);
                    match callback.thumbnail_url.filter(|t| !t.is_empty()) {
                        Some(thumbnail) => output.with_thumbnail(thumbnail),
                        None => output,
                    }
                });
                self.ledger
                    .update_status(&job.id, JobStatus::Completed, output, None)?
            }
            CallbackStatus::Error => self.ledger.update_status(
                &job.id,
                JobStatus::Failed,
                None,
                Some(error_text(callback.error)),
            )?,
        };

        if !self.applied(&update) {
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        match self.finalizer.try_finalize(&job.bundle_id).await {
            Ok(outcome) => debug!(
                "Finalization of bundle {}: {}",
                job.bundle_id,
                outcome.as_str()
            ),
            Err(e) => error!("Finalization of bundle {} errored: {}", job.bundle_id, e),
        }
        Ok(WebhookOutcome::Processed)
    }

    fn lookup(&self, handle: &str, expected: JobKind) -> Result<Lookup, WebhookError> {
        let Some(job) = self.ledger.get_by_handle(handle)? else {
            info!("Webhook for unknown handle {}", handle);
            return Ok(Lookup::Done(WebhookOutcome::NotFound));
        };

        if job.kind != expected {
            return Err(WebhookError::Malformed(format!(
                "handle {} belongs to a {} job, not {}",
                handle, job.kind, expected
            )));
        }

        if job.is_terminal() {
            debug!("Job {} already {}, ignoring delivery", job.id, job.status);
            return Ok(Lookup::Done(WebhookOutcome::AlreadyProcessed));
        }

        Ok(Lookup::Found(job))
    }

    fn applied(&self, update: &UpdateOutcome) -> bool {
        let job = update.job();
        if update.is_applied() {
            info!(
                "Job {} ({}) for bundle {} is now {}",
                job.id, job.kind, job.bundle_id, job.status
            );
            true
        } else {
            debug!("Job {} was finished by a concurrent delivery", job.id);
            false
        }
    }
}

enum Lookup {
    Found(Job),
    Done(WebhookOutcome),
}

fn parse_query<T>(value: Option<&str>, name: &str) -> Result<T, WebhookError>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .ok_or_else(|| WebhookError::Malformed(format!("missing {} parameter", name)))?
        .parse()
        .map_err(WebhookError::Malformed)
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, WebhookError> {
    serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(format!("invalid body: {}", e)))
}

fn error_text(error: Option<String>) -> String {
    error
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| "unknown error".to_string())
}

fn record_delivery(class: JobClass, result: &Result<WebhookOutcome, WebhookError>) {
    let outcome = match result {
        Ok(outcome) => outcome.as_str(),
        Err(e) => e.label(),
    };
    metrics::WEBHOOK_DELIVERIES
        .with_label_values(&[class.as_str(), outcome])
        .inc();
}
