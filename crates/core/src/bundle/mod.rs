//! Bundles: one generation request and everything produced for it.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteBundleStore;
pub use store::{BundleError, BundleFilter, BundleStore, CreateBundleRequest};
pub use types::{
    AssetSlots, BrandPalette, Bundle, BundleFailure, FailureKind, GenerationParams, Mood,
    OutputDescriptor, OutputMetadata, QualityReview, RenderedVideo, Scene, Script, SiteAnalysis,
    Stage, Style,
};
