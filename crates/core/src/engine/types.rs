use std::sync::Arc;

use serde::Deserialize;

use crate::bundle::Bundle;
use crate::services::{AssetGenerator, Renderer, Reviewer, ScriptGenerator, SiteAnalyzer};

/// A generation request as received at the boundary, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    #[serde(skip)]
    pub owner_id: String,
    pub source_url: String,
    pub style: String,
    pub mood: String,
    pub duration_secs: u32,
}

/// External collaborators driven by the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn SiteAnalyzer>,
    pub asset_generator: Arc<dyn AssetGenerator>,
    pub script_generator: Arc<dyn ScriptGenerator>,
    pub renderer: Arc<dyn Renderer>,
    pub reviewer: Option<Arc<dyn Reviewer>>,
}

/// What a fan-in gate evaluation did.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// Some jobs are still outstanding.
    Waiting,
    /// The bundle is not in the gated stage, or another caller holds the claim.
    Skipped,
    /// This caller ran the gate; carries the bundle after the transition.
    Advanced(Bundle),
}

impl GateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateOutcome::Waiting => "waiting",
            GateOutcome::Skipped => "skipped",
            GateOutcome::Advanced(_) => "advanced",
        }
    }
}
