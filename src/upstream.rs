use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;

use crate::policy::normalize_path;

/// Largest request body forwarded to the front-end (10 MiB).
pub const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

// 1. Upstream Contract
/// Upstream
///
/// Where a request goes once the gate lets it continue. The HTTP
/// implementation forwards to the dashboard front-end; tests swap in
/// `MockUpstream`.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Serves the request and returns the response to send to the browser.
    /// Failures are expressed as error responses, never as panics.
    async fn forward(&self, request: Request) -> Response;
}

// 2. The Real Implementation
/// HttpUpstream
///
/// Forwards requests to a front-end origin over HTTP with reqwest,
/// preserving method, query, headers and body. The path is sent in its
/// normalized form so the origin cannot resolve it to a different page.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            // Redirects from the front-end go back to the browser untouched.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let path = normalize_path(parts.uri.path());
        let url = match parts.uri.query() {
            Some(query) => format!("{}{}?{}", self.base_url, path, query),
            None => format!("{}{}", self.base_url, path),
        };

        let body = match to_bytes(body, MAX_FORWARD_BODY).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, %url, "request body rejected before forwarding");
                return StatusCode::PAYLOAD_TOO_LARGE.into_response();
            }
        };

        let upstream_response = match self
            .client
            .request(parts.method, &url)
            .headers(strip_hop_by_hop(parts.headers))
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, %url, "upstream request failed");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        let status = upstream_response.status();
        let headers = strip_hop_by_hop(upstream_response.headers().clone());
        let bytes = match upstream_response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(error = %err, %url, "upstream response body failed");
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// Drops headers that describe a single connection.
fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in [
        header::CONNECTION,
        header::HOST,
        header::PROXY_AUTHENTICATE,
        header::PROXY_AUTHORIZATION,
        header::TE,
        header::TRAILER,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ] {
        headers.remove(name);
    }
    // The body is re-framed on both sides.
    headers.remove(header::CONTENT_LENGTH);
    headers
}

// 3. The Mock Implementation (For Tests)
/// MockUpstream
///
/// Answers every request itself with `upstream:<path>`, or with a
/// simulated gateway failure.
#[derive(Clone, Default)]
pub struct MockUpstream {
    /// When true, every request fails with 502.
    pub should_fail: bool,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn forward(&self, request: Request) -> Response {
        if self.should_fail {
            return StatusCode::BAD_GATEWAY.into_response();
        }
        format!("upstream:{}", request.uri().path()).into_response()
    }
}

/// UpstreamState
///
/// The shared handle stored in the application state.
pub type UpstreamState = Arc<dyn Upstream>;
