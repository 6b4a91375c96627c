use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;

use ombruk_backend::api::{self, AppState};
use ombruk_backend::cli::Cli;
use ombruk_backend::config::Config;
use ombruk_backend::db;
use ombruk_backend::error::AppError;
use ombruk_backend::logging::init_logging;
use ombruk_backend::metrics::AppMetrics;
use ombruk_backend::services::keycloak::{KeycloakClient, NoopGroupManager, SharedGroupManager};
use ombruk_backend::services::varsling::LogVerificationSender;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    if let Err(err) = run().await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let mut config = Config::from_env().map_err(AppError::Config)?;
    Cli::parse().apply(&mut config);
    tracing::info!("Service starting with config: {:?}", config);

    let pool = db::create_pool(&config.database_url).await?;
    let metrics = Arc::new(
        AppMetrics::new().map_err(|e| AppError::Config(format!("metrics: {}", e)))?,
    );

    let groups: SharedGroupManager = match &config.keycloak {
        Some(keycloak) => {
            tracing::info!("Keycloak group sync enabled for realm {}", keycloak.realm);
            Arc::new(KeycloakClient::new(keycloak).with_metrics(metrics.clone()))
        }
        None => {
            tracing::warn!("KEYCLOAK_URL not set; group sync is disabled");
            Arc::new(NoopGroupManager)
        }
    };

    let state = AppState::new(
        pool,
        groups,
        Arc::new(LogVerificationSender),
        metrics,
        &config.jwt_secret,
    );
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| AppError::Config(format!("cannot bind {}: {}", config.bind_addr, e)))?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Config(format!("server failed: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
