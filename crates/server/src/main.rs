use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pitchforge_core::{
    load_config, validate_config, GenerationOrchestrator, HttpProcessingService, SanitizedConfig,
};
use pitchforge_server::api::{create_router, WsBroadcaster};
use pitchforge_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PITCHFORGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!(version = VERSION, "Configuration loaded successfully");
    info!(
        "Processing service: {}",
        SanitizedConfig::from(&config).upstream.base_url
    );

    // Create upstream client
    let service = Arc::new(
        HttpProcessingService::new(&config.upstream)
            .context("Failed to create processing service client")?,
    );

    // Create orchestrator
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        service,
        config.generation.clone(),
    ));
    info!(
        fetch_timeout_secs = config.generation.fetch_timeout_secs,
        pitch_placeholder = config.generation.pitch_placeholder,
        "Generation orchestrator initialized"
    );

    // Create WebSocket broadcaster for real-time updates
    let ws_broadcaster = WsBroadcaster::new(config.generation.event_buffer);

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&orchestrator),
        ws_broadcaster,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Abort in-flight fetches
    info!("Server shutting down...");
    orchestrator.shutdown().await;
    info!("Generation orchestrator stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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
}
