//! Mock quality reviewer for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::bundle::QualityReview;
use crate::services::{ReviewRequest, Reviewer, ServiceError};

#[derive(Debug, Clone)]
pub struct MockReviewer {
    score: Arc<RwLock<f32>>,
    failure: Arc<RwLock<Option<String>>>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockReviewer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockReviewer {
    pub fn new() -> Self {
        Self {
            score: Arc::new(RwLock::new(0.9)),
            failure: Arc::new(RwLock::new(None)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn set_score(&self, score: f32) {
        *self.score.write().await = score;
    }

    pub async fn set_failure(&self, message: Option<&str>) {
        *self.failure.write().await = message.map(str::to_string);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reviewer for MockReviewer {
    async fn review(&self, _request: &ReviewRequest) -> Result<QualityReview, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.failure.read().await.clone() {
            return Err(ServiceError::Unavailable(message));
        }
        let score = *self.score.read().await;
        Ok(QualityReview {
            score,
            passed: score >= 0.5,
            notes: None,
        })
    }
}
