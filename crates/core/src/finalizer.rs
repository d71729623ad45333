//! Finalization of rendered bundles.
//!
//! Once every render job is terminal the finalizer either fails the bundle
//! (any render failed, or outputs are unusable) or walks it through
//! `Validating`, optionally `Reviewing`, and into `Completed` with an output
//! descriptor.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::aggregator::{self, FanInVerdict};
use crate::bundle::{
    Bundle, BundleFailure, BundleStore, FailureKind, OutputDescriptor, OutputMetadata,
    RenderedVideo, Stage,
};
use crate::engine::{fail_bundle, record_transition, EngineConfig, EngineError};
use crate::ledger::{JobClass, JobLedger, RenderFormat};
use crate::metrics;
use crate::services::{ReviewRequest, Reviewer};

/// Result of a [`Finalizer::try_finalize`] call.
#[derive(Debug, Clone)]
pub enum FinalizeOutcome {
    /// Render jobs are still outstanding.
    Waiting,
    /// Bundle is not in `Rendering`, already terminal, or another caller is finalizing.
    Skipped,
    Completed(Bundle),
    Failed(Bundle),
}

impl FinalizeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalizeOutcome::Waiting => "waiting",
            FinalizeOutcome::Skipped => "skipped",
            FinalizeOutcome::Completed(_) => "completed",
            FinalizeOutcome::Failed(_) => "failed",
        }
    }
}

pub struct Finalizer {
    config: EngineConfig,
    bundles: Arc<dyn BundleStore>,
    ledger: Arc<dyn JobLedger>,
    reviewer: Option<Arc<dyn Reviewer>>,
}

impl Finalizer {
    pub fn new(
        config: EngineConfig,
        bundles: Arc<dyn BundleStore>,
        ledger: Arc<dyn JobLedger>,
        reviewer: Option<Arc<dyn Reviewer>>,
    ) -> Self {
        Self {
            config,
            bundles,
            ledger,
            reviewer,
        }
    }

    /// Finalize the bundle if all of its render jobs are terminal.
    ///
    /// Idempotent: terminal bundles and repeated calls are no-ops.
    pub async fn try_finalize(&self, bundle_id: &str) -> Result<FinalizeOutcome, EngineError> {
        let bundle = self
            .bundles
            .get(bundle_id)?
            .ok_or_else(|| EngineError::NotFound(bundle_id.to_string()))?;

        if bundle.stage != Stage::Rendering {
            debug!("Bundle {} is in {}, nothing to finalize", bundle_id, bundle.stage);
            return Ok(FinalizeOutcome::Skipped);
        }

        let verdict = aggregator::all_terminal(self.ledger.as_ref(), bundle_id, JobClass::Render)?;

        // A job list shorter than the configured formats means dispatch is
        // still recording handles.
        let covered = self.config.formats.iter().all(|format| {
            verdict
                .jobs
                .iter()
                .any(|j| j.kind.render_format() == Some(*format))
        });
        let outcome = if covered {
            verdict.outcome()
        } else {
            aggregator::FanInOutcome::Waiting
        };
        metrics::FAN_IN_VERDICTS
            .with_label_values(&[JobClass::Render.as_str(), outcome.as_str()])
            .inc();

        if outcome == aggregator::FanInOutcome::Waiting {
            return Ok(FinalizeOutcome::Waiting);
        }

        if !self.bundles.claim_gate(bundle_id, Stage::Rendering)? {
            debug!("Finalization of bundle {} already claimed", bundle_id);
            return Ok(FinalizeOutcome::Skipped);
        }

        match self.finalize_claimed(bundle, verdict).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let failure = BundleFailure::new(FailureKind::Internal, Stage::Rendering).with_cause(&e);
                fail_bundle(self.bundles.as_ref(), bundle_id, failure)?;
                Err(e)
            }
        }
    }

    async fn finalize_claimed(
        &self,
        bundle: Bundle,
        verdict: FanInVerdict,
    ) -> Result<FinalizeOutcome, EngineError> {
        if verdict.any_failed {
            let mut failed: Vec<(RenderFormat, String)> = verdict
                .failed()
                .filter_map(|job| {
                    job.kind.render_format().map(|format| {
                        (
                            format,
                            job.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                        )
                    })
                })
                .collect();
            failed.sort_by_key(|(format, _)| *format);

            let errors: serde_json::Map<String, serde_json::Value> = failed
                .iter()
                .map(|(format, error)| (format.as_str().to_string(), json!(error)))
                .collect();
            let failure = BundleFailure::naming(
                FailureKind::RenderExecution,
                Stage::Rendering,
                failed.iter().map(|(format, _)| format.as_str()),
            )
            .with_details(json!({ "render_errors": errors }));
            return self.fail(&bundle, failure);
        }

        let bundle_id = bundle.id.clone();
        let validating = self
            .bundles
            .advance_stage(&bundle_id, Stage::Rendering, Stage::Validating)?;
        record_transition(&validating);

        let mut videos = BTreeMap::new();
        let mut invalid = Vec::new();
        for job in &verdict.jobs {
            let Some(format) = job.kind.render_format() else {
                continue;
            };
            match job.output_url.as_deref().filter(|u| self.is_usable(u)) {
                Some(url) => {
                    let thumbnail_url = job
                        .thumbnail_url
                        .clone()
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| derive_thumbnail_url(url));
                    let (width, height) = format.dimensions();
                    videos.insert(
                        format,
                        RenderedVideo {
                            video_url: url.to_string(),
                            thumbnail_url,
                            width,
                            height,
                        },
                    );
                }
                None => invalid.push(format),
            }
        }

        if !invalid.is_empty() {
            invalid.sort();
            let names: Vec<&str> = invalid.iter().map(|f| f.as_str()).collect();
            let failure =
                BundleFailure::naming(FailureKind::RenderValidation, Stage::Validating, names);
            return self.fail(&validating, failure);
        }

        let mut stage = Stage::Validating;
        let mut review = None;
        if let Some(ref reviewer) = self.reviewer {
            let reviewing = self
                .bundles
                .advance_stage(&bundle_id, Stage::Validating, Stage::Reviewing)?;
            record_transition(&reviewing);
            stage = Stage::Reviewing;

            let request = ReviewRequest {
                bundle_id: bundle_id.clone(),
                params: bundle.params,
                videos: videos.clone(),
            };
            match reviewer.review(&request).await {
                Ok(result) => {
                    info!(
                        "Review of bundle {} scored {:.2} (passed: {})",
                        bundle_id, result.score, result.passed
                    );
                    review = Some(result);
                }
                Err(e) => warn!("Review of bundle {} failed, completing without it: {}", bundle_id, e),
            }
        }

        let script = bundle.script.clone().unwrap_or_default();
        let output = OutputDescriptor {
            videos,
            metadata: OutputMetadata {
                total_duration_secs: script.total_duration_secs(),
                scene_count: script.scenes.len(),
                assets_used: bundle.assets.available(),
                review,
            },
        };

        let completed = self.bundles.complete(&bundle_id, stage, &output)?;
        record_transition(&completed);
        Ok(FinalizeOutcome::Completed(completed))
    }

    fn is_usable(&self, url: &str) -> bool {
        if url.trim().is_empty() {
            return false;
        }
        if !self.config.validate_outputs {
            return true;
        }
        matches!(
            reqwest::Url::parse(url).map(|u| u.scheme().to_string()).as_deref(),
            Ok("http") | Ok("https")
        )
    }

    fn fail(&self, bundle: &Bundle, failure: BundleFailure) -> Result<FinalizeOutcome, EngineError> {
        match fail_bundle(self.bundles.as_ref(), &bundle.id, failure)? {
            Some(failed) => Ok(FinalizeOutcome::Failed(failed)),
            None => Ok(FinalizeOutcome::Skipped),
        }
    }
}

/// Thumbnail reference for a render that did not supply one: the video URL
/// with its file extension replaced by `.jpg`.
pub fn derive_thumbnail_url(video_url: &str) -> String {
    let (path, suffix) = match video_url.find(['?', '#']) {
        Some(idx) => video_url.split_at(idx),
        None => (video_url, ""),
    };

    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let stem = match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => &path[..name_start + dot],
        _ => path,
    };

    format!("{}.jpg{}", stem, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_thumbnail_replaces_extension() {
        assert_eq!(
            derive_thumbnail_url("https://cdn.example/renders/wide.mp4"),
            "https://cdn.example/renders/wide.jpg"
        );
    }

    #[test]
    fn test_derive_thumbnail_keeps_query() {
        assert_eq!(
            derive_thumbnail_url("https://cdn.example/v/abc.webm?sig=1.2"),
            "https://cdn.example/v/abc.jpg?sig=1.2"
        );
    }

    #[test]
    fn test_derive_thumbnail_without_extension() {
        assert_eq!(
            derive_thumbnail_url("https://cdn.example/v/abc"),
            "https://cdn.example/v/abc.jpg"
        );
        assert_eq!(
            derive_thumbnail_url("https://cdn.example/v/.hidden"),
            "https://cdn.example/v/.hidden.jpg"
        );
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(FinalizeOutcome::Waiting.as_str(), "waiting");
        assert_eq!(FinalizeOutcome::Skipped.as_str(), "skipped");
    }
}
