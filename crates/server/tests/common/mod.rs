//! Common test utilities for API testing with mock services.
//!
//! This module provides a test fixture that builds the router in-process
//! with mock collaborators injected, so the full request and webhook flow
//! can be driven without any external services.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use reelforge_core::ledger::{AssetKind, JobClass, RenderFormat};
use reelforge_core::testing::MockServices;
use reelforge_core::{
    create_authenticator, load_config_from_str, Authenticator, SqliteBundleStore, SqliteJobLedger,
};
use reelforge_server::state::AppState;

/// Re-export fixtures for test convenience
pub use reelforge_core::testing::fixtures;

/// Webhook secret configured for every fixture.
pub const SECRET: &str = "test-secret";

/// API key used when a fixture enables key auth.
pub const API_KEY: &str = "test-api-key";

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_bundle_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/bundles", fixture.bundle_body()).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Shared state, for direct ledger and store inspection
    pub state: Arc<AppState>,
    /// Mock collaborators
    pub mocks: MockServices,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Protect bundle routes with [`API_KEY`]
    pub api_key_auth: bool,
    /// Enable the quality reviewer
    pub with_review: bool,
    /// Bundles per owner (0 = unlimited)
    pub max_bundles_per_owner: u32,
    /// No webhook secret, callbacks accepted through dev mode
    pub dev_mode: bool,
}

impl TestConfig {
    pub fn with_api_key() -> Self {
        Self {
            api_key_auth: true,
            ..Default::default()
        }
    }

    pub fn with_review() -> Self {
        Self {
            with_review: true,
            ..Default::default()
        }
    }

    pub fn with_quota(limit: u32) -> Self {
        Self {
            max_bundles_per_owner: limit,
            ..Default::default()
        }
    }

    pub fn dev_mode() -> Self {
        Self {
            dev_mode: true,
            ..Default::default()
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let auth = if test_config.api_key_auth {
            format!(
                "method = \"api_key\"\napi_key = \"{}\"\napi_key_owner = \"acme\"",
                API_KEY
            )
        } else {
            "method = \"none\"".to_string()
        };

        let webhook = if test_config.dev_mode {
            "dev_mode = true".to_string()
        } else {
            format!("secret = \"{}\"", SECRET)
        };

        let config = load_config_from_str(&format!(
            r#"
[auth]
{auth}

[database]
path = "{db}"

[webhook]
{webhook}
public_base_url = "http://reelforge.test"

[limits]
max_bundles_per_owner = {quota}
"#,
            auth = auth,
            db = db_path.display(),
            webhook = webhook,
            quota = test_config.max_bundles_per_owner,
        ))
        .expect("Failed to parse test config");

        let authenticator: Arc<dyn Authenticator> = Arc::from(
            create_authenticator(&config.auth).expect("Failed to create authenticator"),
        );

        let bundles = Arc::new(
            SqliteBundleStore::new(&db_path).expect("Failed to create bundle store"),
        );
        let ledger = Arc::new(
            SqliteJobLedger::new(&db_path).expect("Failed to create job ledger"),
        );

        let mocks = MockServices::new();
        let collaborators = if test_config.with_review {
            mocks.collaborators_with_review()
        } else {
            mocks.collaborators()
        };

        let state = Arc::new(AppState::new(
            config,
            authenticator,
            bundles,
            ledger,
            collaborators,
            Arc::new(mocks.assets.clone()),
        ));

        let router = reelforge_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            mocks,
            temp_dir,
        }
    }

    /// A valid generation request body.
    pub fn bundle_body(&self) -> Value {
        json!({
            "source_url": "https://acme.test",
            "style": "bold",
            "mood": "energetic",
            "duration_secs": 30
        })
    }

    /// Create a bundle and wait for its asset jobs to be dispatched.
    pub async fn create_composing_bundle(&self) -> String {
        let response = self.post("/api/v1/bundles", self.bundle_body()).await;
        assert_eq!(response.status, StatusCode::ACCEPTED, "{}", response.body);
        let id = response.body["id"].as_str().unwrap().to_string();
        self.wait_for_stage(&id, "composing").await;
        id
    }

    /// Poll the status endpoint until the bundle reaches `stage`.
    pub async fn wait_for_stage(&self, id: &str, stage: &str) -> Value {
        let path = format!("/api/v1/bundles/{}", id);
        for _ in 0..200 {
            let response = self.get(&path).await;
            if response.body["stage"] == stage {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("Bundle {} never reached stage {}", id, stage);
    }

    pub fn asset_handles(&self, bundle_id: &str) -> HashMap<AssetKind, String> {
        self.state
            .ledger()
            .list_by_bundle(bundle_id, JobClass::Asset)
            .unwrap()
            .into_iter()
            .filter_map(|job| job.kind.asset().map(|kind| (kind, job.handle)))
            .collect()
    }

    pub fn render_handles(&self, bundle_id: &str) -> HashMap<RenderFormat, String> {
        self.state
            .ledger()
            .list_by_bundle(bundle_id, JobClass::Render)
            .unwrap()
            .into_iter()
            .filter_map(|job| job.kind.render_format().map(|f| (f, job.handle)))
            .collect()
    }

    /// Deliver an asset callback over HTTP.
    pub async fn deliver_asset(&self, bundle_id: &str, kind: AssetKind, ok: bool) -> TestResponse {
        let handle = self.asset_handles(bundle_id)[&kind].clone();
        let path = format!(
            "/api/v1/webhooks/assets?kind={}&secret={}",
            kind.as_str(),
            SECRET
        );
        let body = String::from_utf8(fixtures::asset_callback(&handle, ok)).unwrap();
        self.post_raw(&path, &body).await
    }

    /// Deliver a render callback over HTTP.
    pub async fn deliver_render(
        &self,
        bundle_id: &str,
        format: RenderFormat,
        ok: bool,
    ) -> TestResponse {
        let handle = self.render_handles(bundle_id)[&format].clone();
        let path = format!(
            "/api/v1/webhooks/renders?format={}&secret={}",
            format.as_str(),
            SECRET
        );
        let body = if ok {
            fixtures::render_success(&handle)
        } else {
            fixtures::render_failure(&handle, "encoder crashed")
        };
        self.post_raw(&path, &String::from_utf8(body).unwrap()).await
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, &[]).await
    }

    /// Send a GET request with extra headers.
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        self.request("GET", path, None, headers).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body), &[]).await
    }

    /// Send a POST request with JSON body and extra headers.
    pub async fn post_with_headers(
        &self,
        path: &str,
        body: Value,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        self.request("POST", path, Some(body), headers).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Fetch `/metrics` as text.
    pub async fn metrics_text(&self) -> (StatusCode, String) {
        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            request_builder = request_builder.header(*name, *value);
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
