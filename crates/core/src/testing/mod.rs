//! Testing utilities and mock implementations of the external services.
//!
//! Every collaborator the engine drives has a controllable mock here, so the
//! full bundle lifecycle can be exercised without any network services.
//! Webhooks are simulated by calling the gateway directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use reelforge_core::testing::{fixtures, MockServices};
//!
//! let mocks = MockServices::new();
//! mocks.renderer.fail_format(RenderFormat::Square).await;
//!
//! let engine = StageEngine::new(config, limits, bundles, ledger, mocks.collaborators(), callbacks);
//! let bundle = engine.submit(fixtures::submit_request("owner-1")).await?;
//! ```

mod mock_analyzer;
mod mock_assets;
mod mock_renderer;
mod mock_reviewer;
mod mock_script;

use std::sync::Arc;

pub use mock_analyzer::MockSiteAnalyzer;
pub use mock_assets::MockAssetService;
pub use mock_renderer::MockRenderer;
pub use mock_reviewer::MockReviewer;
pub use mock_script::MockScriptGenerator;

use crate::engine::Collaborators;

/// One of each mock, sharing state with the [`Collaborators`] built from it.
#[derive(Debug, Clone, Default)]
pub struct MockServices {
    pub analyzer: MockSiteAnalyzer,
    pub assets: MockAssetService,
    pub script: MockScriptGenerator,
    pub renderer: MockRenderer,
    pub reviewer: MockReviewer,
}

impl MockServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collaborators without a reviewer.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            analyzer: Arc::new(self.analyzer.clone()),
            asset_generator: Arc::new(self.assets.clone()),
            script_generator: Arc::new(self.script.clone()),
            renderer: Arc::new(self.renderer.clone()),
            reviewer: None,
        }
    }

    /// Collaborators with the mock reviewer enabled.
    pub fn collaborators_with_review(&self) -> Collaborators {
        Collaborators {
            reviewer: Some(Arc::new(self.reviewer.clone())),
            ..self.collaborators()
        }
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::bundle::{BrandPalette, Scene, Script, SiteAnalysis};
    use crate::engine::SubmitRequest;

    /// A site analysis with a palette and three selling points.
    pub fn site_analysis(title: &str) -> SiteAnalysis {
        SiteAnalysis {
            title: title.to_string(),
            description: format!("{} makes the best widgets", title),
            key_points: vec![
                "Fast delivery".to_string(),
                "Lifetime warranty".to_string(),
                "Made locally".to_string(),
            ],
            palette: BrandPalette {
                primary: "#1a1a2e".to_string(),
                secondary: "#16213e".to_string(),
                accent: "#e94560".to_string(),
            },
            logo_url: Some("https://acme.test/logo.svg".to_string()),
        }
    }

    /// A three-scene script whose durations add up to `duration_secs`.
    pub fn script(duration_secs: u32) -> Script {
        let total = f64::from(duration_secs);
        let split = [0.25, 0.5, 0.25];
        let headings = ["Hook", "Benefits", "Call to action"];
        Script {
            scenes: headings
                .iter()
                .zip(split)
                .map(|(heading, share)| Scene {
                    heading: heading.to_string(),
                    narration: format!("{} narration", heading),
                    duration_secs: total * share,
                })
                .collect(),
        }
    }

    /// A valid generation request for `owner_id`.
    pub fn submit_request(owner_id: &str) -> SubmitRequest {
        SubmitRequest {
            owner_id: owner_id.to_string(),
            source_url: "https://acme.test".to_string(),
            style: "bold".to_string(),
            mood: "energetic".to_string(),
            duration_secs: 30,
        }
    }

    /// Asset callback body.
    pub fn asset_callback(request_id: &str, ok: bool) -> Vec<u8> {
        let body: Value = if ok {
            json!({ "request_id": request_id, "status": "OK" })
        } else {
            json!({ "request_id": request_id, "status": "ERROR", "error": "generation failed" })
        };
        body.to_string().into_bytes()
    }

    /// Successful render callback body with a video at a predictable URL.
    pub fn render_success(render_id: &str) -> Vec<u8> {
        json!({
            "render_id": render_id,
            "status": "OK",
            "video_url": video_url(render_id),
        })
        .to_string()
        .into_bytes()
    }

    /// Failed render callback body.
    pub fn render_failure(render_id: &str, error: &str) -> Vec<u8> {
        json!({ "render_id": render_id, "status": "ERROR", "error": error })
            .to_string()
            .into_bytes()
    }

    pub fn video_url(render_id: &str) -> String {
        format!("https://videos.test/{}.mp4", render_id)
    }
}
