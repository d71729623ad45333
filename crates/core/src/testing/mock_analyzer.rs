//! Mock site analyzer for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::bundle::SiteAnalysis;
use crate::services::{ServiceError, SiteAnalyzer};

use super::fixtures;

/// Mock implementation of the SiteAnalyzer trait.
///
/// Returns a fixed analysis for every URL unless a failure is configured.
#[derive(Debug, Clone)]
pub struct MockSiteAnalyzer {
    analysis: Arc<RwLock<SiteAnalysis>>,
    failure: Arc<RwLock<Option<String>>>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockSiteAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSiteAnalyzer {
    pub fn new() -> Self {
        Self {
            analysis: Arc::new(RwLock::new(fixtures::site_analysis("Acme Widgets"))),
            failure: Arc::new(RwLock::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the analysis returned by subsequent calls.
    pub async fn set_analysis(&self, analysis: SiteAnalysis) {
        *self.analysis.write().await = analysis;
    }

    /// Make every subsequent call fail with this message (`None` to recover).
    pub async fn set_failure(&self, message: Option<&str>) {
        *self.failure.write().await = message.map(str::to_string);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteAnalyzer for MockSiteAnalyzer {
    async fn analyze(&self, _source_url: &str) -> Result<SiteAnalysis, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.read().await.clone() {
            return Err(ServiceError::Unavailable(message));
        }
        Ok(self.analysis.read().await.clone())
    }
}
