//! Request pipeline pieces.
//!
//! Order on the router (outermost first): CORS, correlation id, trace span,
//! rate-limit hook. Bearer validation happens per route through the extractors in
//! [`auth`].

pub mod auth;
pub mod rate_limit;

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, Method, Request,
    },
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info_span, Span};
use url::Url;

pub use auth::{AuthRejection, Authenticated, OptionalAuth};
pub use rate_limit::{NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

#[must_use]
pub fn correlation_id_header() -> HeaderName {
    HeaderName::from_static(CORRELATION_ID_HEADER)
}

pub(crate) fn make_span(request: &Request<Body>) -> Span {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        correlation_id
    )
}

/// CORS for the configured frontend origin.
///
/// # Errors
/// Returns an error if the frontend URL cannot be turned into an origin.
pub fn cors_layer(frontend_base_url: &str) -> Result<CorsLayer> {
    let origin = frontend_origin(frontend_base_url)?;
    Ok(CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, correlation_id_header()])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .expose_headers([correlation_id_header()])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true))
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

/// Client IP from common proxy headers.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
