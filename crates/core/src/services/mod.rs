//! External collaborators: site analysis, asset generation, script
//! generation, rendering and review.

mod http;
mod traits;
mod types;

pub use http::{
    HttpAssetService, HttpRenderer, HttpReviewer, HttpScriptGenerator, HttpSiteAnalyzer,
};
pub use traits::{AssetGenerator, Renderer, ResultFetcher, Reviewer, ScriptGenerator, SiteAnalyzer};
pub use types::{AssetRequest, RenderRequest, ReviewRequest, ScriptRequest, ServiceError};
