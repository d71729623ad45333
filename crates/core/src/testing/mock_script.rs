//! Mock script generator for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::bundle::Script;
use crate::services::{ScriptGenerator, ScriptRequest, ServiceError};

use super::fixtures;

/// Mock implementation of the ScriptGenerator trait.
///
/// Counts calls so tests can assert the composition step ran exactly once.
#[derive(Debug, Clone)]
pub struct MockScriptGenerator {
    requests: Arc<RwLock<Vec<ScriptRequest>>>,
    failure: Arc<RwLock<Option<String>>>,
    delay: Arc<RwLock<Duration>>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockScriptGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScriptGenerator {
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            failure: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn set_failure(&self, message: Option<&str>) {
        *self.failure.write().await = message.map(str::to_string);
    }

    /// Simulated generation time.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<ScriptRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl ScriptGenerator for MockScriptGenerator {
    async fn generate(&self, request: &ScriptRequest) -> Result<Script, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push(request.clone());

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure.read().await.clone() {
            return Err(ServiceError::Unavailable(message));
        }
        Ok(fixtures::script(request.params.duration_secs))
    }
}
