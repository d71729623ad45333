//! Generation request, status and listing endpoints.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{TestConfig, TestFixture, API_KEY};

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_create_bundle_returns_immediately() {
    let fixture = TestFixture::new().await;

    let response = fixture.post("/api/v1/bundles", fixture.bundle_body()).await;

    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["stage"], "analyzing");
    assert_eq!(response.body["progress_pct"], 10);
    assert_eq!(response.body["owner_id"], "anonymous");
    assert!(response.body["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(response.body.get("output").is_none());
    assert!(response.body.get("error").is_none());
}

#[tokio::test]
async fn test_created_bundle_dispatches_assets_in_background() {
    let fixture = TestFixture::new().await;

    let id = fixture.create_composing_bundle().await;

    assert_eq!(fixture.mocks.assets.dispatch_count().await, 3);
    let jobs = fixture.get(&format!("/api/v1/bundles/{}/jobs", id)).await;
    assert_status!(jobs, StatusCode::OK);
    assert_eq!(jobs.body["bundle_id"], id.as_str());
    let assets = jobs.body["assets"].as_array().unwrap();
    assert_eq!(assets.len(), 3);
    assert!(assets.iter().all(|job| job["status"] == "processing"));
    assert!(jobs.body["renders"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_style_is_rejected_without_a_bundle() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/bundles",
            json!({
                "source_url": "https://acme.test",
                "style": "baroque",
                "mood": "calm",
                "duration_secs": 30
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("style"));
    assert_eq!(fixture.mocks.analyzer.call_count(), 0);

    let list = fixture.get("/api/v1/bundles").await;
    assert_eq!(list.body["total"], 0);
}

#[tokio::test]
async fn test_invalid_source_url_is_rejected() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            "/api/v1/bundles",
            json!({
                "source_url": "ftp://acme.test",
                "style": "bold",
                "mood": "calm",
                "duration_secs": 30
            }),
        )
        .await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_out_of_range_duration_is_rejected() {
    let fixture = TestFixture::new().await;
    let mut body = fixture.bundle_body();
    body["duration_secs"] = json!(600);

    let response = fixture.post("/api/v1/bundles", body).await;

    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analysis_failure_hides_downstream_error() {
    let fixture = TestFixture::new().await;
    fixture
        .mocks
        .analyzer
        .set_failure(Some("upstream exploded at 0xdeadbeef"))
        .await;

    let response = fixture.post("/api/v1/bundles", fixture.bundle_body()).await;

    assert_status!(response, StatusCode::BAD_GATEWAY);
    assert_eq!(response.body["error"], "Site analysis failed");

    let list = fixture.get("/api/v1/bundles").await;
    assert_eq!(list.body["total"], 0);
}

#[tokio::test]
async fn test_quota_exceeded_returns_429() {
    let fixture = TestFixture::with_config(TestConfig::with_quota(1)).await;

    let first = fixture.post("/api/v1/bundles", fixture.bundle_body()).await;
    assert_status!(first, StatusCode::ACCEPTED);

    let second = fixture.post("/api/v1/bundles", fixture.bundle_body()).await;
    assert_status!(second, StatusCode::TOO_MANY_REQUESTS);

    let list = fixture.get("/api/v1/bundles").await;
    assert_eq!(list.body["total"], 1);
}

#[tokio::test]
async fn test_get_unknown_bundle_is_404() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/bundles/does-not-exist").await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let jobs = fixture.get("/api/v1/bundles/does-not-exist/jobs").await;
    assert_status!(jobs, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_bundles_filters_by_stage() {
    let fixture = TestFixture::new().await;
    let id = fixture.create_composing_bundle().await;

    let composing = fixture.get("/api/v1/bundles?stage=composing").await;
    assert_status!(composing, StatusCode::OK);
    assert_eq!(composing.body["total"], 1);
    assert_eq!(composing.body["bundles"][0]["id"], id.as_str());

    let completed = fixture.get("/api/v1/bundles?stage=completed").await;
    assert_eq!(completed.body["total"], 0);

    let bogus = fixture.get("/api/v1/bundles?stage=bogus").await;
    assert_status!(bogus, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_bundles_pagination() {
    let fixture = TestFixture::new().await;
    for _ in 0..3 {
        let response = fixture.post("/api/v1/bundles", fixture.bundle_body()).await;
        assert_status!(response, StatusCode::ACCEPTED);
    }

    let page = fixture.get("/api/v1/bundles?limit=2&offset=0").await;
    assert_eq!(page.body["bundles"].as_array().unwrap().len(), 2);
    assert_eq!(page.body["total"], 3);
    assert_eq!(page.body["limit"], 2);

    let rest = fixture.get("/api/v1/bundles?limit=2&offset=2").await;
    assert_eq!(rest.body["bundles"].as_array().unwrap().len(), 1);

    let by_owner = fixture.get("/api/v1/bundles?owner_id=someone-else").await;
    assert_eq!(by_owner.body["total"], 0);
}

#[tokio::test]
async fn test_api_key_protects_bundle_routes() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    let anonymous = fixture.post("/api/v1/bundles", fixture.bundle_body()).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let wrong = fixture
        .get_with_headers("/api/v1/bundles", &[("X-API-Key", "nope")])
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let bearer = format!("Bearer {}", API_KEY);
    let created = fixture
        .post_with_headers(
            "/api/v1/bundles",
            fixture.bundle_body(),
            &[("Authorization", bearer.as_str())],
        )
        .await;
    assert_status!(created, StatusCode::ACCEPTED);
    assert_eq!(created.body["owner_id"], "acme");

    // Health stays open
    let health = fixture.get("/api/v1/health").await;
    assert_status!(health, StatusCode::OK);
}

#[tokio::test]
async fn test_config_endpoint_redacts_secrets() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    let response = fixture.get("/api/v1/config").await;

    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["auth"]["method"], "api_key");
    assert_eq!(response.body["webhook"]["secret_configured"], true);
    let text = response.body.to_string();
    assert!(!text.contains(common::SECRET));
    assert!(!text.contains(API_KEY));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, text) = fixture.metrics_text().await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("reelforge_http_requests_total"));
    assert!(text.contains("reelforge_bundles_by_stage"));
}
