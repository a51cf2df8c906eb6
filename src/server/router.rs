//! HTTP router for user-service
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Registration and login
//! - The authenticated profile
//! - Liveness and readiness probes

use axum::{
    extract::{rejection::JsonRejection, FromRef, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use super::middleware::{
    auth_middleware, handle_panic, logging_middleware, rate_limit_middleware,
    request_id_middleware, tracing_middleware, AuthenticatedUser, ClientIp,
};
use super::response::ApiError;
use crate::auth::{AuthService, RateLimiter, TokenService};
use crate::config::Config;
use crate::database::UserRepository;
use crate::error::AuthError;
use crate::models::{LoginRequest, LoginResponse, RegisterRequest, UserResponse};
use crate::otel::Metrics;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Registration and login
    pub auth_service: Arc<AuthService>,

    /// Token validation for protected routes
    pub token_service: Arc<dyn TokenService>,

    /// Per-client request limiter
    pub rate_limiter: Arc<RateLimiter>,

    /// User repository, used for readiness checks
    pub users: Arc<dyn UserRepository>,

    pub metrics: Arc<Metrics>,
}

impl FromRef<AppState> for Arc<dyn TokenService> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.token_service)
    }
}

impl FromRef<AppState> for Arc<RateLimiter> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.rate_limiter)
    }
}

impl FromRef<AppState> for Arc<Metrics> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.metrics)
    }
}

/// Options controlling which layers wrap the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOptions {
    pub rate_limit_enabled: bool,
    pub request_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            rate_limit_enabled: true,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for RouterOptions {
    fn from(config: &Config) -> Self {
        Self {
            rate_limit_enabled: config.rate_limit.enabled,
            request_timeout: config.server.request_timeout(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/// Build the main application router
///
/// Layers, outermost first: panic recovery, request id, request logging,
/// request timeout, tracing span, rate limiter. The verification middleware
/// wraps only the protected routes.
pub fn build_router(state: AppState, options: RouterOptions) -> Router {
    let protected = Router::new()
        .route("/api/me", get(me_handler))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut router = Router::new()
        .route("/healthz", get(health_handler))
        .route("/readyz", get(ready_handler))
        .route("/api/register", post(register_handler))
        .route("/api/login", post(login_handler))
        .merge(protected);

    if options.rate_limit_enabled {
        router = router.layer(from_fn_with_state(state.clone(), rate_limit_middleware));
    }

    router
        .layer(from_fn(tracing_middleware))
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(from_fn_with_state(
            Arc::clone(&state.metrics),
            logging_middleware,
        ))
        .layer(from_fn(request_id_middleware))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

// =============================================================================
// Health Handlers
// =============================================================================

/// Liveness probe
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::new("ok"))
}

/// Readiness probe: 503 while the user store is unreachable
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.users.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::new("ready"))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::new("degraded")),
            )
        }
    }
}

// =============================================================================
// API Handlers
// =============================================================================

/// Registration handler
async fn register_handler(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let user = state
        .auth_service
        .register(&req.email, &req.password, &req.role, Some(ip))
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// Login handler
///
/// Past request validation, every failure is reported as the same 401.
async fn login_handler(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(req) = payload?;
    req.validate()?;

    let token = state
        .auth_service
        .login(&req.email, &req.password, Some(ip))
        .await
        .map_err(|e| {
            if matches!(
                e,
                AuthError::Hashing(_) | AuthError::TokenGeneration(_) | AuthError::Storage(_)
            ) {
                tracing::error!(error = %e, "Login failed");
            }
            ApiError::from(AuthError::InvalidCredentials)
        })?;

    Ok(Json(LoginResponse { token }))
}

/// Profile of the authenticated user
async fn me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .auth_service
        .find_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    Ok(Json(UserResponse::from(&user)))
}
