//! HTTP middleware for user-service
//!
//! This module provides middleware layers for:
//! - Bearer token verification
//! - Per-client rate limiting
//! - Request ids, request logging and OpenTelemetry tracing
//! - Panic recovery

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, Extensions, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::any::Any;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use super::response::{ApiError, ErrorResponse};
use crate::auth::{RateLimiter, TokenService};
use crate::error::AuthError;
use crate::otel::Metrics;

/// Response header carrying the request id
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const BEARER_PREFIX: &str = "Bearer ";

/// Verified subject id, attached to requests that passed `auth_middleware`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Id assigned to the request by `request_id_middleware`
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Address of the connected client
///
/// Requests served without connection info share the unspecified address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(peer_ip(&parts.extensions)))
    }
}

fn peer_ip(extensions: &Extensions) -> IpAddr {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Verify the `Authorization` header and return the subject id
///
/// Checks run in order and the first failure wins:
/// 1. The header is present and of the form `Bearer <token>`
/// 2. The token passes validation
/// 3. The claims carry a subject
/// 4. The subject is a non-empty string
pub fn authenticate(tokens: &dyn TokenService, headers: &HeaderMap) -> Result<String, AuthError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MalformedHeader)?;

    let claims = tokens
        .validate(token)
        .map_err(|_| AuthError::InvalidToken)?;

    match claims.subject() {
        None => Err(AuthError::MissingSubject),
        Some(Value::String(subject)) if !subject.is_empty() => Ok(subject.clone()),
        Some(_) => Err(AuthError::InvalidSubject),
    }
}

/// Authentication middleware function
///
/// Rejects with 401 before the handler runs; on success the subject is
/// available to handlers as [`AuthenticatedUser`].
pub async fn auth_middleware(
    State(tokens): State<Arc<dyn TokenService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let subject = authenticate(tokens.as_ref(), request.headers()).map_err(|e| {
        tracing::debug!(error = %e, path = %request.uri().path(), "Authentication failed");
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(AuthenticatedUser(subject));

    Ok(next.run(request).await)
}

/// Rate limiting middleware function
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = peer_ip(request.extensions());

    if !limiter.check(ip) {
        metrics.record_rate_limited();
        tracing::warn!(client_ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
        return Err(AuthError::RateLimited.into());
    }

    Ok(next.run(request).await)
}

/// Request id middleware function
///
/// Assigns a fresh UUID v4 to every request and echoes it in `X-Request-ID`.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value);
    }

    response
}

/// Logging middleware function
///
/// Logs request and response details including:
/// - Method and path
/// - Status code
/// - Response time
/// - Request id
pub async fn logging_middleware(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let response = next.run(request).await;

    let elapsed = start.elapsed();
    let status = response.status();

    metrics.record_request(method.as_str(), status.as_u16());
    metrics.record_request_duration(method.as_str(), elapsed.as_secs_f64());

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %status.as_u16(),
        duration_ms = %elapsed.as_millis(),
        request_id = %request_id,
        "Request completed"
    );

    response
}

/// Tracing middleware function
///
/// Creates a span covering the whole request, including async work done by
/// the handler.
pub async fn tracing_middleware(request: Request, next: Next) -> Response {
    use tracing::Instrument;

    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = tracing::info_span!(
        "http_request",
        http.method = %method,
        http.url = %uri,
        http.status_code = tracing::field::Empty,
    );

    async move {
        let response = next.run(request).await;
        tracing::Span::current().record("http.status_code", response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}

/// Convert a handler panic into a 500 response
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };

    tracing::error!(panic = %detail, "Handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal server error")),
    )
        .into_response()
}
