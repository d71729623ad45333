//! Mock asset generation service for testing.
//!
//! One mock plays both sides of the service: dispatch hands out handles
//! and `fetch_result` resolves them to asset URLs.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ledger::AssetKind;
use crate::services::{AssetGenerator, AssetRequest, ResultFetcher, ServiceError};

/// Mock implementation of the AssetGenerator and ResultFetcher traits.
#[derive(Debug, Clone)]
pub struct MockAssetService {
    requests: Arc<RwLock<Vec<AssetRequest>>>,
    failing_kinds: Arc<RwLock<HashSet<AssetKind>>>,
    failing_fetches: Arc<RwLock<HashSet<String>>>,
    counter: Arc<AtomicUsize>,
}

impl Default for MockAssetService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAssetService {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            failing_kinds: Arc::new(RwLock::new(HashSet::new())),
            failing_fetches: Arc::new(RwLock::new(HashSet::new())),
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reject dispatches of this kind.
    pub async fn fail_dispatch(&self, kind: AssetKind) {
        self.failing_kinds.write().await.insert(kind);
    }

    /// Fail result fetches for this handle.
    pub async fn fail_fetch(&self, handle: &str) {
        self.failing_fetches.write().await.insert(handle.to_string());
    }

    /// Dispatched requests, in order.
    pub async fn requests(&self) -> Vec<AssetRequest> {
        self.requests.read().await.clone()
    }

    pub async fn dispatch_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// URL `fetch_result` returns for a handle.
    pub fn result_url(handle: &str) -> String {
        format!("https://assets.test/{}.png", handle)
    }
}

#[async_trait]
impl AssetGenerator for MockAssetService {
    async fn dispatch(&self, request: &AssetRequest) -> Result<String, ServiceError> {
        if self.failing_kinds.read().await.contains(&request.kind) {
            return Err(ServiceError::Rejected {
                status: 503,
                body: format!("{} generator unavailable", request.kind),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push(request.clone());
        Ok(format!("asset-{}-{}", request.kind.as_str(), n))
    }
}

#[async_trait]
impl ResultFetcher for MockAssetService {
    async fn fetch_result(&self, _kind: AssetKind, handle: &str) -> Result<String, ServiceError> {
        if self.failing_fetches.read().await.contains(handle) {
            return Err(ServiceError::InvalidResponse("no result url".to_string()));
        }
        Ok(Self::result_url(handle))
    }
}
