use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mooncast_sidecar::api::{routes::create_router, state::AppState};
use mooncast_sidecar::automation::AutomationEngine;
use mooncast_sidecar::config::Config;
use mooncast_sidecar::device::{create_device, ForegroundWatcher};
use mooncast_sidecar::hosts::SqliteHostRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    let db_path = config.hosts_db_path()?;
    let registry = Arc::new(SqliteHostRegistry::open(&db_path)?);
    tracing::info!("Host registry at {:?}", db_path);

    let device = create_device(&config)?;
    let (engine, _engine_task) = AutomationEngine::spawn(
        config.engine_config(),
        device.provider.clone(),
        device.launcher.clone(),
        registry.clone(),
    );

    let _watcher = ForegroundWatcher::new(
        device.provider.clone(),
        Duration::from_millis(config.watch_interval_ms),
    )
    .spawn(engine.clone());

    // Build router
    let state = Arc::new(AppState::new(engine, registry));
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Mooncast sidecar starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
