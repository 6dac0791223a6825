use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tracing::{error, info, warn};

use jobapp_backend::api::create_router;
use jobapp_backend::app::{AppState, UserService};
use jobapp_backend::config::AppConfig;
use jobapp_backend::infra::{DatabaseClientFactory, init_metrics_handle, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;
    init_tracing(config.log_format).context("failed to install tracing subscriber")?;

    let metrics_handle = init_metrics_handle();
    if metrics_handle.is_none() {
        warn!("Prometheus recorder not installed, /metrics will answer 404");
    }

    let db_client = DatabaseClientFactory::create(&config.environment, &config.database)
        .with_context(|| format!("cannot select a database for '{}'", config.environment))?;
    db_client
        .connect()
        .await
        .context("failed to connect to the database")?;

    let service = Arc::new(UserService::with_table(
        Arc::clone(&db_client),
        config.users_table.clone(),
    ));
    let app_state =
        Arc::new(AppState::with_service(service, Arc::clone(&db_client)).with_metrics(metrics_handle));
    let router = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(
        addr = %config.bind_addr,
        environment = %config.environment,
        backend = %db_client.backend(),
        "Server starting"
    );

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(e) = db_client.disconnect().await {
        error!(error = %e, "Failed to disconnect from the database");
    }
    info!("Server stopped");

    served.context("server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(signal = "SIGINT", "Shutting down"),
        () = terminate => info!(signal = "SIGTERM", "Shutting down"),
    }
}
