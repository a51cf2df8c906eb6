//! user-service - User registration, login and bearer-token verification
//!
//! This is the main entry point for the user-service application.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use user_service::audit::{AuditLogger, RetryPolicy};
use user_service::auth::{
    AuthService, JwtService, PasswordHasher, RateLimitConfig, RateLimiter, TokenService,
};
use user_service::config::Config;
use user_service::database::SqliteDatabase;
use user_service::otel::{init_tracing, Metrics, OtelProvider};
use user_service::server::{AppState, RouterOptions, Server};

/// user-service - User registration, login and bearer-token verification
#[derive(Parser, Debug)]
#[command(name = "user-service")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "USER_SERVICE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    let mut otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting user-service");

    let database = Arc::new(SqliteDatabase::new(&config.database.path).await?);
    info!(path = %config.database.path, "Database initialized");

    let metrics = Arc::new(Metrics::new(&otel_provider.meter()));

    let tokens: Arc<dyn TokenService> = Arc::new(JwtService::new(config.jwt.clone()));
    info!(
        expiration_hours = config.jwt.expiration_hours,
        issuer = %config.jwt.issuer,
        audience = %config.jwt.audience,
        "Token service initialized"
    );

    let retry = RetryPolicy::from(&config.audit);
    let audit = Arc::new(AuditLogger::new(database.clone(), retry));

    let hasher = PasswordHasher::new(config.security.hash_cost);
    info!(cost = hasher.cost(), "Password hasher initialized");

    let auth_service = Arc::new(AuthService::new(
        database.clone(),
        Arc::clone(&tokens),
        audit,
        hasher,
        Arc::clone(&metrics),
    ));

    let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::from(&config.rate_limit)));
    let sweeper = config.rate_limit.enabled.then(|| {
        Arc::clone(&rate_limiter).spawn_sweeper(config.rate_limit.sweep_interval())
    });
    info!(
        enabled = config.rate_limit.enabled,
        max_requests = config.rate_limit.max_requests,
        window_secs = config.rate_limit.window_secs,
        "Rate limiter initialized"
    );

    let state = AppState {
        auth_service,
        token_service: tokens,
        rate_limiter,
        users: database,
        metrics,
    };

    let server = Server::new(config.server.clone(), RouterOptions::from(&config), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("user-service shutdown complete");

    result.map_err(Into::into)
}

/// Load and validate configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path)
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env()
        }
    }
    .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid config: {}", e))?;

    Ok(config)
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
