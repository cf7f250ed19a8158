use civicpay_backend::api::{self, AppState};
use civicpay_backend::config::AppConfig;
use civicpay_backend::database::repository::PaymentStores;
use civicpay_backend::database::{init_pool_from_config, run_migrations};
use civicpay_backend::health::HealthChecker;
use civicpay_backend::logging::init_tracing;
use civicpay_backend::payments::ProcessorClient;
use civicpay_backend::services::auth::JwtAuthContext;
use civicpay_backend::services::PaymentOrchestrator;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging)?;
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.gateway.environment.as_str(),
        "Starting civicpay backend service"
    );

    info!("Initializing database connection pool...");
    let db_pool = init_pool_from_config(&config.database).await.map_err(|e| {
        error!("Failed to initialize database pool: {}", e);
        e
    })?;
    run_migrations(&db_pool).await?;
    info!(
        max_connections = db_pool.options().get_max_connections(),
        "Database connection pool initialized"
    );

    let gateway = ProcessorClient::new(config.gateway.clone()).map_err(|e| {
        error!("Failed to initialize payment processor client: {}", e);
        e
    })?;
    info!(
        base_url = %config.gateway.base_url,
        timeout_secs = config.gateway.timeout.as_secs(),
        "Payment processor client initialized"
    );

    let orchestrator = PaymentOrchestrator::new(
        PaymentStores::postgres(db_pool.clone()),
        Arc::new(gateway),
        Arc::new(JwtAuthContext::new(&config.auth)),
    );

    let app = api::router(AppState {
        orchestrator: Arc::new(orchestrator),
        health_checker: HealthChecker::new(Some(db_pool)),
    });

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
