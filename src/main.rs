use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use pestguard_api::{app_router, build_cors, config, db, events, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config()?;
    config::init_tracing(config.log_level(), config.log_json);
    info!(environment = %config.environment, "starting pestguard-api");

    let db = Arc::new(db::establish_connection_from_app_config(&config).await?);
    if config.auto_migrate {
        db::run_migrations(&db).await?;
        info!("database schema is up to date");
    }

    let (tx, rx) = mpsc::channel(config.event_channel_capacity);
    tokio::spawn(events::process_events(rx));

    let cors = build_cors(&config)?;
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(db, Arc::new(config), events::EventSender::new(tx))?;
    let app = app_router(state, cors);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
