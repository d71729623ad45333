//! Bundle state machine driver.
//!
//! Moves bundles forward through:
//! - Submission: validate, reserve quota, analyze, persist (`Pending -> Analyzing`)
//! - Asset fan-out: concurrent dispatches (`Analyzing -> Composing`)
//! - Composition gate: script + render dispatch (`Composing -> Rendering`)
//!
//! No in-process locks: every one-time step is guarded by a conditional write
//! in the bundle store.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::aggregator::{self, FanInOutcome, FanInVerdict};
use crate::bundle::{
    AssetSlots, Bundle, BundleError, BundleFailure, BundleFilter, BundleStore, CreateBundleRequest,
    FailureKind, GenerationParams, Mood, SiteAnalysis, Stage, Style,
};
use crate::config::LimitsConfig;
use crate::ledger::{AssetKind, JobClass, JobKind, JobLedger, LedgerError};
use crate::metrics;
use crate::services::{AssetRequest, RenderRequest, ScriptRequest};
use crate::webhook::CallbackUrls;

use super::{Collaborators, EngineConfig, EngineError, GateOutcome, SubmitRequest};

/// Drives bundles between stages in response to requests and callbacks.
pub struct StageEngine {
    config: EngineConfig,
    limits: LimitsConfig,
    bundles: Arc<dyn BundleStore>,
    ledger: Arc<dyn JobLedger>,
    services: Collaborators,
    callbacks: CallbackUrls,
}

impl StageEngine {
    pub fn new(
        config: EngineConfig,
        limits: LimitsConfig,
        bundles: Arc<dyn BundleStore>,
        ledger: Arc<dyn JobLedger>,
        services: Collaborators,
        callbacks: CallbackUrls,
    ) -> Self {
        Self {
            config,
            limits,
            bundles,
            ledger,
            services,
            callbacks,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Accept a generation request.
    ///
    /// Site analysis runs inline; if it fails nothing is persisted and the
    /// quota reservation is returned. The bundle comes back in `Analyzing`,
    /// ready for [`StageEngine::dispatch_assets`].
    pub async fn submit(&self, request: SubmitRequest) -> Result<Bundle, EngineError> {
        let params = self.validate(&request)?;

        let limit = self.limits.max_bundles_per_owner;
        if !self.bundles.reserve_quota(&request.owner_id, limit)? {
            info!("Owner {} is over quota ({} bundles)", request.owner_id, limit);
            return Err(EngineError::QuotaExceeded {
                owner_id: request.owner_id,
                limit,
            });
        }

        let analysis = match self.services.analyzer.analyze(&request.source_url).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Site analysis failed for {}: {}", request.source_url, e);
                if let Err(release_err) = self.bundles.release_quota(&request.owner_id) {
                    error!(
                        "Failed to release quota for owner {}: {}",
                        request.owner_id, release_err
                    );
                }
                return Err(EngineError::Analysis(e));
            }
        };

        let bundle = self.bundles.create(CreateBundleRequest {
            owner_id: request.owner_id,
            source_url: request.source_url,
            params,
            analysis: Some(analysis),
        })?;
        metrics::BUNDLES_CREATED.inc();
        info!("Created bundle {} for owner {}", bundle.id, bundle.owner_id);

        let bundle = self
            .bundles
            .advance_stage(&bundle.id, Stage::Pending, Stage::Analyzing)?;
        record_transition(&bundle);
        Ok(bundle)
    }

    fn validate(&self, request: &SubmitRequest) -> Result<GenerationParams, EngineError> {
        let url = reqwest::Url::parse(request.source_url.trim())
            .map_err(|e| EngineError::InvalidInput(format!("source_url is not a valid URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EngineError::InvalidInput(
                "source_url must use http or https".to_string(),
            ));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(EngineError::InvalidInput(
                "source_url must include a host".to_string(),
            ));
        }

        let style: Style = request.style.parse().map_err(EngineError::InvalidInput)?;
        let mood: Mood = request.mood.parse().map_err(EngineError::InvalidInput)?;

        let (min, max) = (self.limits.min_duration_secs, self.limits.max_duration_secs);
        if !(min..=max).contains(&request.duration_secs) {
            return Err(EngineError::InvalidInput(format!(
                "duration_secs must be between {} and {}",
                min, max
            )));
        }

        Ok(GenerationParams {
            style,
            mood,
            duration_secs: request.duration_secs,
        })
    }

    // =========================================================================
    // Asset fan-out
    // =========================================================================

    /// Dispatch one asset job per kind and move the bundle to `Composing`.
    ///
    /// Kinds that already have a ledger entry are not dispatched again, so
    /// the call is safe to repeat. Individual dispatch failures only degrade
    /// the bundle; it fails when no job at all could be dispatched.
    pub async fn dispatch_assets(&self, bundle_id: &str) -> Result<Bundle, EngineError> {
        let bundle = self.load(bundle_id)?;
        if bundle.stage != Stage::Analyzing {
            debug!(
                "Bundle {} is in {}, skipping asset dispatch",
                bundle_id, bundle.stage
            );
            return Ok(bundle);
        }

        let Some(analysis) = bundle.analysis.clone() else {
            return self.fail_or_current(
                &bundle,
                BundleFailure::new(FailureKind::Internal, Stage::Analyzing)
                    .with_cause("missing site analysis"),
            );
        };

        let recorded: HashSet<JobKind> = self
            .ledger
            .list_by_bundle(bundle_id, JobClass::Asset)?
            .into_iter()
            .map(|j| j.kind)
            .collect();
        let kinds: Vec<AssetKind> = AssetKind::ALL
            .into_iter()
            .filter(|k| !recorded.contains(&JobKind::Asset(*k)))
            .collect();

        let dispatches = kinds.iter().map(|kind| {
            let request = AssetRequest {
                bundle_id: bundle.id.clone(),
                kind: *kind,
                params: bundle.params,
                analysis: analysis.clone(),
                callback_url: self.callbacks.asset(*kind),
            };
            async move {
                let result = self.services.asset_generator.dispatch(&request).await;
                (request.kind, result)
            }
        });

        let mut errors: Vec<(&str, String)> = Vec::new();
        for (kind, result) in join_all(dispatches).await {
            match result {
                Ok(handle) => {
                    match self.ledger.record_job(bundle_id, JobKind::Asset(kind), &handle) {
                        Ok(job) => debug!(
                            "Recorded {} job {} for bundle {} (handle {})",
                            kind, job.id, bundle_id, handle
                        ),
                        Err(LedgerError::Duplicate(msg)) => {
                            warn!("Asset job for bundle {} already recorded: {}", bundle_id, msg)
                        }
                        Err(e) => {
                            error!("Failed to record {} job for bundle {}: {}", kind, bundle_id, e);
                            errors.push((kind.label(), e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    warn!("Dispatch of {} for bundle {} failed: {}", kind, bundle_id, e);
                    errors.push((kind.label(), e.to_string()));
                }
            }
        }

        let jobs = self.ledger.list_by_bundle(bundle_id, JobClass::Asset)?;
        if jobs.is_empty() {
            let failure = BundleFailure::naming(
                FailureKind::AssetGeneration,
                Stage::Analyzing,
                errors.iter().map(|(label, _)| *label),
            )
            .with_details(json!({ "dispatch_errors": error_map(&errors) }));
            return self.fail_or_current(&bundle, failure);
        }

        let bundle = match self
            .bundles
            .advance_stage(bundle_id, Stage::Analyzing, Stage::Composing)
        {
            Ok(bundle) => {
                record_transition(&bundle);
                bundle
            }
            Err(BundleError::StageConflict { actual, .. }) => {
                debug!("Bundle {} already moved to {}", bundle_id, actual);
                return self.load(bundle_id);
            }
            Err(e) => return Err(e.into()),
        };

        // Callbacks that arrived before the stage write found nothing to claim.
        match self.run_fan_in_gate(bundle_id).await? {
            GateOutcome::Advanced(advanced) => Ok(advanced),
            _ => Ok(bundle),
        }
    }

    /// [`StageEngine::dispatch_assets`] for callers with nobody to report
    /// to: an error fails the bundle instead of leaving it in `Analyzing`.
    pub async fn dispatch_assets_or_fail(&self, bundle_id: &str) -> Result<Bundle, EngineError> {
        match self.dispatch_assets(bundle_id).await {
            Ok(bundle) => Ok(bundle),
            Err(EngineError::NotFound(id)) => Err(EngineError::NotFound(id)),
            Err(e) => {
                error!("Asset dispatch for bundle {} failed: {}", bundle_id, e);
                let stage = self
                    .bundles
                    .get(bundle_id)
                    .ok()
                    .flatten()
                    .map_or(Stage::Analyzing, |b| b.stage);
                let failure = BundleFailure::new(FailureKind::Internal, stage).with_cause(&e);
                self.fail_bundle(bundle_id, failure)?;
                Err(e)
            }
        }
    }

    /// Re-run asset dispatch for bundles still in `Analyzing` that have not
    /// moved since `older_than`. Returns the ids that were retried.
    pub async fn resume_stalled(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<String>, EngineError> {
        let filter = BundleFilter::new()
            .with_stage(Stage::Analyzing)
            .with_updated_before(older_than)
            .with_limit(limit);

        let mut resumed = Vec::new();
        for bundle in self.bundles.list(&filter)? {
            warn!(
                "Bundle {} stalled in {} since {}, re-dispatching assets",
                bundle.id, bundle.stage, bundle.updated_at
            );
            match self.dispatch_assets_or_fail(&bundle.id).await {
                Ok(resumed_bundle) => debug!(
                    "Bundle {} resumed into {}",
                    resumed_bundle.id, resumed_bundle.stage
                ),
                Err(e) => warn!("Resuming bundle {} failed: {}", bundle.id, e),
            }
            resumed.push(bundle.id);
        }
        Ok(resumed)
    }

    // =========================================================================
    // Composition gate
    // =========================================================================

    /// Evaluate the asset fan-in and, if every job is terminal, run the
    /// one-time composition step.
    ///
    /// Safe to call from every webhook delivery: only the caller that wins
    /// the `Composing` claim proceeds.
    pub async fn run_fan_in_gate(&self, bundle_id: &str) -> Result<GateOutcome, EngineError> {
        let verdict = aggregator::all_terminal(self.ledger.as_ref(), bundle_id, JobClass::Asset)?;
        let outcome = verdict.outcome();
        metrics::FAN_IN_VERDICTS
            .with_label_values(&[JobClass::Asset.as_str(), outcome.as_str()])
            .inc();

        if outcome == FanInOutcome::Waiting {
            debug!("Bundle {} still waiting on asset jobs", bundle_id);
            return Ok(GateOutcome::Waiting);
        }

        if !self.bundles.claim_gate(bundle_id, Stage::Composing)? {
            debug!("Composition gate for bundle {} not claimable", bundle_id);
            return Ok(GateOutcome::Skipped);
        }

        info!(
            "Composition gate claimed for bundle {} ({})",
            bundle_id,
            outcome.as_str()
        );

        match self.compose_claimed(bundle_id, verdict).await {
            Ok(bundle) => Ok(GateOutcome::Advanced(bundle)),
            Err(e) => {
                error!("Composition of bundle {} failed: {}", bundle_id, e);
                let failure =
                    BundleFailure::new(FailureKind::Internal, Stage::Composing).with_cause(&e);
                self.fail_bundle(bundle_id, failure)?;
                Err(e)
            }
        }
    }

    /// Operator entry point for the compose trigger.
    ///
    /// `force` drops a held claim first, for bundles stuck in `Composing`
    /// after a crash between claim and dispatch.
    pub async fn compose(&self, bundle_id: &str, force: bool) -> Result<GateOutcome, EngineError> {
        let bundle = self.load(bundle_id)?;
        if force && bundle.stage == Stage::Composing && self.bundles.release_gate(bundle_id, Stage::Composing)? {
            warn!("Released composition claim for bundle {} (forced)", bundle_id);
        }
        self.run_fan_in_gate(bundle_id).await
    }

    async fn compose_claimed(
        &self,
        bundle_id: &str,
        verdict: FanInVerdict,
    ) -> Result<Bundle, EngineError> {
        let bundle = self.load(bundle_id)?;

        if verdict.outcome() == FanInOutcome::AllFailed {
            let reasons: Vec<(&str, String)> = verdict
                .failed()
                .map(|job| {
                    let label = job.kind.asset().map(|k| k.label()).unwrap_or("asset");
                    (label, job.error.clone().unwrap_or_else(|| "unknown error".to_string()))
                })
                .collect();
            let failure = BundleFailure::naming(
                FailureKind::AssetGeneration,
                Stage::Composing,
                reasons.iter().map(|(label, _)| *label),
            )
            .with_details(json!({ "job_errors": error_map(&reasons) }));
            return self.fail_or_current(&bundle, failure);
        }

        let mut assets = AssetSlots::default();
        for job in verdict.succeeded() {
            if let Some(kind) = job.kind.asset() {
                assets.set(kind, job.output_url.clone());
            }
        }
        if verdict.any_failed {
            let missing: Vec<&str> = AssetKind::ALL
                .iter()
                .filter(|k| assets.get(**k).is_none())
                .map(|k| k.label())
                .collect();
            info!(
                "Bundle {} proceeding without {}",
                bundle_id,
                missing.join(", ")
            );
        }
        self.bundles.set_assets(bundle_id, &assets)?;

        let analysis = analysis_or_fallback(&bundle);

        let request = ScriptRequest {
            bundle_id: bundle_id.to_string(),
            params: bundle.params,
            analysis: analysis.clone(),
            assets: assets.clone(),
        };
        let script = match self.services.script_generator.generate(&request).await {
            Ok(script) => script,
            Err(e) => {
                warn!("Script generation for bundle {} failed: {}", bundle_id, e);
                let failure =
                    BundleFailure::new(FailureKind::ScriptGeneration, Stage::Composing).with_cause(e);
                return self.fail_or_current(&bundle, failure);
            }
        };
        self.bundles.set_script(bundle_id, &script)?;

        let bundle = self
            .bundles
            .advance_stage(bundle_id, Stage::Composing, Stage::Rendering)?;
        record_transition(&bundle);

        self.dispatch_renders(&bundle).await
    }

    /// Dispatch one render per configured format.
    ///
    /// The `Rendering` stage is already durable when this runs. Formats that
    /// already have a render job are skipped so a retry never duplicates one.
    async fn dispatch_renders(&self, bundle: &Bundle) -> Result<Bundle, EngineError> {
        let script = bundle.script.clone().unwrap_or_default();
        let analysis = analysis_or_fallback(bundle);

        let recorded: HashSet<JobKind> = self
            .ledger
            .list_by_bundle(&bundle.id, JobClass::Render)?
            .into_iter()
            .map(|j| j.kind)
            .collect();

        let dispatches = self
            .config
            .formats
            .iter()
            .filter(|f| !recorded.contains(&JobKind::Render(**f)))
            .map(|format| {
                let (width, height) = format.dimensions();
                let request = RenderRequest {
                    bundle_id: bundle.id.clone(),
                    format: *format,
                    width,
                    height,
                    params: bundle.params,
                    script: script.clone(),
                    assets: bundle.assets.clone(),
                    analysis: analysis.clone(),
                    callback_url: self.callbacks.render(*format),
                };
                async move {
                    let result = self.services.renderer.dispatch(&request).await;
                    (request.format, result)
                }
            })
            .collect::<Vec<_>>();

        let mut errors: Vec<(&str, String)> = Vec::new();
        for (format, result) in join_all(dispatches).await {
            match result {
                Ok(handle) => {
                    match self.ledger.record_job(&bundle.id, JobKind::Render(format), &handle) {
                        Ok(_) => info!(
                            "Dispatched {} render for bundle {} (handle {})",
                            format, bundle.id, handle
                        ),
                        Err(LedgerError::Duplicate(msg)) => {
                            warn!("Render job for bundle {} already recorded: {}", bundle.id, msg)
                        }
                        Err(e) => errors.push((format.as_str(), e.to_string())),
                    }
                }
                Err(e) => {
                    warn!("Render dispatch {} for bundle {} failed: {}", format, bundle.id, e);
                    errors.push((format.as_str(), e.to_string()));
                }
            }
        }

        if !errors.is_empty() {
            let failure = BundleFailure::naming(
                FailureKind::RenderDispatch,
                Stage::Rendering,
                errors.iter().map(|(name, _)| *name),
            )
            .with_details(json!({ "dispatch_errors": error_map(&errors) }));
            return self.fail_or_current(bundle, failure);
        }

        self.load(&bundle.id)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Move a bundle to `Failed`. Returns `None` if it was already terminal.
    pub fn fail_bundle(
        &self,
        bundle_id: &str,
        failure: BundleFailure,
    ) -> Result<Option<Bundle>, EngineError> {
        fail_bundle(self.bundles.as_ref(), bundle_id, failure)
    }

    fn fail_or_current(&self, bundle: &Bundle, failure: BundleFailure) -> Result<Bundle, EngineError> {
        match self.fail_bundle(&bundle.id, failure)? {
            Some(failed) => Ok(failed),
            None => self.load(&bundle.id),
        }
    }

    fn load(&self, bundle_id: &str) -> Result<Bundle, EngineError> {
        self.bundles
            .get(bundle_id)?
            .ok_or_else(|| EngineError::NotFound(bundle_id.to_string()))
    }
}

/// Shared by the engine and the finalizer so failures are logged and counted
/// the same way.
pub(crate) fn fail_bundle(
    bundles: &dyn BundleStore,
    bundle_id: &str,
    failure: BundleFailure,
) -> Result<Option<Bundle>, EngineError> {
    let kind = failure.kind;
    let message = failure.message.clone();
    match bundles.fail(bundle_id, failure)? {
        Some(bundle) => {
            error!("Bundle {} failed: {}", bundle_id, message);
            metrics::BUNDLES_FAILED
                .with_label_values(&[failure_kind_label(kind)])
                .inc();
            record_transition(&bundle);
            Ok(Some(bundle))
        }
        None => {
            debug!("Bundle {} already terminal, not recording failure", bundle_id);
            Ok(None)
        }
    }
}

/// Per-slot error text for `BundleFailure::details`.
fn error_map(errors: &[(&str, String)]) -> serde_json::Map<String, serde_json::Value> {
    errors
        .iter()
        .map(|(name, error)| (name.to_string(), json!(error)))
        .collect()
}

fn analysis_or_fallback(bundle: &Bundle) -> SiteAnalysis {
    bundle.analysis.clone().unwrap_or_else(|| {
        warn!("Bundle {} has no stored analysis", bundle.id);
        SiteAnalysis {
            title: bundle.source_url.clone(),
            description: String::new(),
            key_points: Vec::new(),
            palette: Default::default(),
            logo_url: None,
        }
    })
}

pub(crate) fn record_transition(bundle: &Bundle) {
    info!("Bundle {} is now {}", bundle.id, bundle.stage);
    metrics::STAGE_TRANSITIONS
        .with_label_values(&[bundle.stage.as_str()])
        .inc();
}

fn failure_kind_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::AssetGeneration => "asset_generation",
        FailureKind::ScriptGeneration => "script_generation",
        FailureKind::RenderDispatch => "render_dispatch",
        FailureKind::RenderExecution => "render_execution",
        FailureKind::RenderValidation => "render_validation",
        FailureKind::Internal => "internal",
    }
}
