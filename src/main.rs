use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use storefront_api::{
    app_router,
    config::{init_tracing, load_config},
    db,
    events::{self, process_events},
    notifications::{HttpEmailNotifier, LogNotifier, OrderNotifier},
    AppState,
};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(&config.log_level);

    info!(
        environment = %config.environment,
        addr = %config.server_addr(),
        "Starting storefront API"
    );

    let db = Arc::new(
        db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?,
    );

    if config.auto_migrate {
        db::run_migrations(&db)
            .await
            .context("failed to run migrations")?;
    }

    let (event_sender, event_receiver) = events::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(process_events(event_receiver));

    let notifier: Arc<dyn OrderNotifier> = match &config.email_endpoint {
        Some(endpoint) => Arc::new(HttpEmailNotifier::new(
            endpoint.clone(),
            config.email_from.clone(),
            Duration::from_secs(config.email_timeout_secs),
        )),
        None => {
            warn!("No email endpoint configured; order confirmations will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let addr = config.server_addr();
    let state = AppState::new(db, Arc::new(config), event_sender, notifier);
    let app = app_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
