//! HTTP clients for the external services.
//!
//! Every service speaks JSON over HTTP and authenticates with an optional
//! bearer key. Transport errors are mapped onto [`ServiceError`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::bundle::{QualityReview, Script, SiteAnalysis};
use crate::config::ServiceConfig;
use crate::ledger::AssetKind;
use crate::metrics;

use super::types::{DispatchResponse, ResultResponse};
use super::{
    AssetGenerator, AssetRequest, RenderRequest, Renderer, ResultFetcher, ReviewRequest, Reviewer,
    ScriptGenerator, ScriptRequest, ServiceError, SiteAnalyzer,
};

/// Shared JSON-over-HTTP plumbing for one configured service.
struct ServiceClient {
    name: &'static str,
    client: Client,
    config: ServiceConfig,
}

impl ServiceClient {
    fn new(name: &'static str, config: ServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            name,
            client,
            config,
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => builder.bearer_auth(key),
            _ => builder,
        }
    }

    async fn post<B, T>(&self, operation: &'static str, endpoint: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url(), endpoint);
        let request = self.authorize(self.client.post(&url).json(body));
        self.execute(operation, request).await
    }

    async fn get<T: DeserializeOwned>(&self, operation: &'static str, endpoint: &str) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.base_url(), endpoint);
        let request = self.authorize(self.client.get(&url));
        self.execute(operation, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let started = Instant::now();
        let result = self.send(request).await;
        metrics::record_external_call(
            self.name,
            operation,
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );

        match &result {
            Ok(_) => debug!("{} {} succeeded", self.name, operation),
            Err(e) => warn!("{} {} failed: {}", self.name, operation, e),
        }
        result
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

fn map_transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Unavailable(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Rejected {
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

// =============================================================================
// Service implementations
// =============================================================================

/// Site analyzer over HTTP: `POST /analyze {url}`.
pub struct HttpSiteAnalyzer {
    inner: ServiceClient,
}

impl HttpSiteAnalyzer {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            inner: ServiceClient::new("analyzer", config)?,
        })
    }
}

#[async_trait]
impl SiteAnalyzer for HttpSiteAnalyzer {
    async fn analyze(&self, source_url: &str) -> Result<SiteAnalysis, ServiceError> {
        #[derive(Serialize)]
        struct Body<'a> {
            url: &'a str,
        }
        self.inner
            .post("analyze", "/analyze", &Body { url: source_url })
            .await
    }
}

/// Asset generation queue over HTTP.
///
/// `POST /requests` queues a job and returns `{request_id}`; the result of a
/// finished job is read back from `GET /requests/{kind}/{id}/result`.
pub struct HttpAssetService {
    inner: ServiceClient,
}

impl HttpAssetService {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            inner: ServiceClient::new("asset_generator", config)?,
        })
    }
}

#[async_trait]
impl AssetGenerator for HttpAssetService {
    async fn dispatch(&self, request: &AssetRequest) -> Result<String, ServiceError> {
        let response: DispatchResponse = self.inner.post("dispatch", "/requests", request).await?;
        Ok(response.id)
    }
}

#[async_trait]
impl ResultFetcher for HttpAssetService {
    async fn fetch_result(&self, kind: AssetKind, handle: &str) -> Result<String, ServiceError> {
        let endpoint = format!(
            "/requests/{}/{}/result",
            kind.as_str(),
            urlencoding::encode(handle)
        );
        let response: ResultResponse = self.inner.get("fetch_result", &endpoint).await?;
        response
            .into_url()
            .ok_or_else(|| ServiceError::InvalidResponse("result has no output url".to_string()))
    }
}

/// Script generator over HTTP: `POST /scripts`.
pub struct HttpScriptGenerator {
    inner: ServiceClient,
}

impl HttpScriptGenerator {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            inner: ServiceClient::new("script_generator", config)?,
        })
    }
}

#[async_trait]
impl ScriptGenerator for HttpScriptGenerator {
    async fn generate(&self, request: &ScriptRequest) -> Result<Script, ServiceError> {
        let script: Script = self.inner.post("generate", "/scripts", request).await?;
        if script.scenes.is_empty() {
            return Err(ServiceError::InvalidResponse(
                "script has no scenes".to_string(),
            ));
        }
        Ok(script)
    }
}

/// Cloud renderer over HTTP: `POST /renders` returns `{render_id}`.
pub struct HttpRenderer {
    inner: ServiceClient,
}

impl HttpRenderer {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            inner: ServiceClient::new("renderer", config)?,
        })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn dispatch(&self, request: &RenderRequest) -> Result<String, ServiceError> {
        let response: DispatchResponse = self.inner.post("dispatch", "/renders", request).await?;
        Ok(response.id)
    }
}

/// Quality reviewer over HTTP: `POST /reviews`.
pub struct HttpReviewer {
    inner: ServiceClient,
}

impl HttpReviewer {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        Ok(Self {
            inner: ServiceClient::new("reviewer", config)?,
        })
    }
}

#[async_trait]
impl Reviewer for HttpReviewer {
    async fn review(&self, request: &ReviewRequest) -> Result<QualityReview, ServiceError> {
        let mut review: QualityReview = self.inner.post("review", "/reviews", request).await?;
        review.score = review.score.clamp(0.0, 1.0);
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ServiceConfig {
        ServiceConfig {
            url: url.to_string(),
            api_key: None,
            timeout_secs: 1,
        }
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let client = ServiceClient::new("renderer", config("http://renderer:9000/")).unwrap();
        assert_eq!(client.base_url(), "http://renderer:9000");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let analyzer = HttpSiteAnalyzer::new(config("http://127.0.0.1:9")).unwrap();
        let result = analyzer.analyze("https://acme.example").await;
        assert!(matches!(
            result,
            Err(ServiceError::Unavailable(_)) | Err(ServiceError::Timeout)
        ));
    }
}
