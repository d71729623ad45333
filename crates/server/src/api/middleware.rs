//! Request metrics and caller authentication for the API routes.

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use reelforge_core::{AuthError, AuthRequest, Identity};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Keeps the in-flight gauge raised for as long as it lives, so a handler
/// that panics or is cancelled still releases its slot.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        HTTP_REQUESTS_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        HTTP_REQUESTS_IN_FLIGHT.dec();
    }
}

/// Records the `reelforge_http_*` series for every request.
///
/// Paths are normalized first so bundle ids don't explode label cardinality.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let labels = [
        request.method().as_str().to_owned(),
        normalize_path(request.uri().path()),
    ];
    let started = Instant::now();

    let response = {
        let _slot = InFlight::enter();
        next.run(request).await
    };

    let status = response.status().as_u16().to_string();
    let series = [labels[0].as_str(), labels[1].as_str(), status.as_str()];
    HTTP_REQUEST_DURATION
        .with_label_values(&series)
        .observe(started.elapsed().as_secs_f64());
    HTTP_REQUESTS_TOTAL.with_label_values(&series).inc();

    response
}

/// Header map with lowercased names, as [`AuthRequest`] expects.
pub(crate) fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_lowercase(), value.to_owned()))
        })
        .collect()
}

/// Peer address from the connection, or loopback when the router runs
/// without connect info (as in tests).
fn peer_ip(request: &Request<Body>) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Metric label and response status for a rejected caller.
fn rejection(error: &AuthError) -> (&'static str, StatusCode) {
    match error {
        AuthError::NotAuthenticated => ("not_authenticated", StatusCode::UNAUTHORIZED),
        AuthError::InvalidCredentials(_) => ("invalid_credentials", StatusCode::UNAUTHORIZED),
        AuthError::ConfigurationError(_) => ("internal_error", StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// Authentication middleware for the user-facing bundle routes.
///
/// On success the caller's [`Identity`] is stored in the request extensions;
/// its `user_id` becomes the owner of any bundle the request creates.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let authenticator = state.authenticator();

    let identity = if authenticator.method_name() == "none" {
        Identity::anonymous()
    } else {
        let auth_request = AuthRequest {
            headers: lowercase_headers(request.headers()),
            source_ip: peer_ip(&request),
        };
        match authenticator.authenticate(&auth_request).await {
            Ok(identity) => identity,
            Err(e) => {
                let (reason, status) = rejection(&e);
                AUTH_FAILURES_TOTAL.with_label_values(&[reason]).inc();
                return Err(status);
            }
        }
    };

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Owner id of the authenticated caller.
///
/// Routes outside the auth layer see `"anonymous"`.
#[derive(Debug, Clone)]
pub struct OwnerId(pub String);

impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = match parts.extensions.get::<Identity>() {
            Some(identity) => identity.user_id.clone(),
            None => Identity::anonymous().user_id,
        };
        Ok(OwnerId(owner))
    }
}
