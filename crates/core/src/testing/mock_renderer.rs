//! Mock renderer for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ledger::RenderFormat;
use crate::services::{RenderRequest, Renderer, ServiceError};

/// Mock implementation of the Renderer trait.
///
/// Tracks dispatches per format and can reject chosen formats.
#[derive(Debug, Clone)]
pub struct MockRenderer {
    requests: Arc<RwLock<Vec<RenderRequest>>>,
    counts: Arc<RwLock<HashMap<RenderFormat, usize>>>,
    failing_formats: Arc<RwLock<HashSet<RenderFormat>>>,
    counter: Arc<AtomicUsize>,
}

impl Default for MockRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            counts: Arc::new(RwLock::new(HashMap::new())),
            failing_formats: Arc::new(RwLock::new(HashSet::new())),
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reject dispatches for this format.
    pub async fn fail_format(&self, format: RenderFormat) {
        self.failing_formats.write().await.insert(format);
    }

    /// Accept every format again.
    pub async fn clear_failures(&self) {
        self.failing_formats.write().await.clear();
    }

    /// Successful dispatches for one format.
    pub async fn dispatch_count(&self, format: RenderFormat) -> usize {
        self.counts.read().await.get(&format).copied().unwrap_or(0)
    }

    pub async fn total_dispatches(&self) -> usize {
        self.counts.read().await.values().sum()
    }

    pub async fn requests(&self) -> Vec<RenderRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn dispatch(&self, request: &RenderRequest) -> Result<String, ServiceError> {
        if self.failing_formats.read().await.contains(&request.format) {
            return Err(ServiceError::Rejected {
                status: 422,
                body: format!("cannot render {}", request.format),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        *self.counts.write().await.entry(request.format).or_insert(0) += 1;
        self.requests.write().await.push(request.clone());
        Ok(format!("render-{}-{}", request.format.as_str(), n))
    }
}
