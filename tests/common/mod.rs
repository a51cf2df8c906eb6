//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use user_service::audit::{AuditLogger, RetryPolicy};
use user_service::auth::{
    AuthService, JwtService, PasswordHasher, RateLimitConfig, RateLimiter, TokenService,
};
use user_service::config::{JwtConfig, ServerConfig};
use user_service::database::SqliteDatabase;
use user_service::otel::Metrics;
use user_service::server::{AppState, RouterOptions, Server};

pub const TEST_SECRET: &str = "integration-test-secret";
pub const TEST_ISSUER: &str = "user-service-test";

/// Create an in-memory database for testing
pub async fn create_test_database() -> Arc<SqliteDatabase> {
    Arc::new(
        SqliteDatabase::in_memory()
            .await
            .expect("Failed to create test database"),
    )
}

/// Token configuration shared by the test services
pub fn test_jwt_config() -> JwtConfig {
    JwtConfig::new(TEST_SECRET).with_issuer(TEST_ISSUER)
}

/// Create a test application state backed by `database`
pub fn create_test_state_with(database: Arc<SqliteDatabase>, max_requests: u32) -> AppState {
    let tokens: Arc<dyn TokenService> = Arc::new(JwtService::new(test_jwt_config()));
    let metrics = Arc::new(Metrics::noop());
    let audit = Arc::new(AuditLogger::new(
        database.clone(),
        RetryPolicy::new(3, Duration::from_millis(5)),
    ));
    let auth_service = Arc::new(AuthService::new(
        database.clone(),
        Arc::clone(&tokens),
        audit,
        // Lowest Argon2 time cost keeps the suite fast
        PasswordHasher::new(Some(1)),
        Arc::clone(&metrics),
    ));

    AppState {
        auth_service,
        token_service: tokens,
        rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
        })),
        users: database,
        metrics,
    }
}

/// Create a test application state with a generous rate limit
pub async fn create_test_state() -> (AppState, Arc<SqliteDatabase>) {
    let database = create_test_database().await;
    (create_test_state_with(database.clone(), 1000), database)
}

/// Create a test server configuration with a random port
pub fn create_test_server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0, // Let OS assign a free port
        ..Default::default()
    }
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    state: AppState,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let server = Server::new(
        create_test_server_config(),
        RouterOptions::default(),
        state,
    );

    tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    (addr, shutdown_tx)
}
