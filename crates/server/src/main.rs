use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelforge_core::config::ServiceConfig;
use reelforge_core::services::{
    HttpAssetService, HttpRenderer, HttpReviewer, HttpScriptGenerator, HttpSiteAnalyzer, Reviewer,
};
use reelforge_core::{
    create_authenticator, load_config, validate_config, Authenticator, BundleStore, Collaborators,
    JobLedger, SqliteBundleStore, SqliteJobLedger,
};

use reelforge_server::api::create_router;
use reelforge_server::state::AppState;

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

    info!("reelforge {} starting", VERSION);

    // Determine config path
    let config_path = std::env::var("REELFORGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);
    info!("Callback base URL: {}", config.webhook.public_base_url);

    // Create authenticator
    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    // Stores
    let bundles: Arc<dyn BundleStore> = Arc::new(
        SqliteBundleStore::new(&config.database.path).context("Failed to create bundle store")?,
    );
    info!("Bundle store initialized");

    let ledger: Arc<dyn JobLedger> = Arc::new(
        SqliteJobLedger::new(&config.database.path).context("Failed to create job ledger")?,
    );
    info!("Job ledger initialized");

    // External services
    let services = &config.services;
    let analyzer = HttpSiteAnalyzer::new(required(&services.analyzer, "analyzer")?)
        .context("Failed to create site analyzer client")?;
    let assets = Arc::new(
        HttpAssetService::new(required(&services.asset_generator, "asset_generator")?)
            .context("Failed to create asset generator client")?,
    );
    let script_generator =
        HttpScriptGenerator::new(required(&services.script_generator, "script_generator")?)
            .context("Failed to create script generator client")?;
    let renderer = HttpRenderer::new(required(&services.renderer, "renderer")?)
        .context("Failed to create renderer client")?;

    let reviewer: Option<Arc<dyn Reviewer>> = match &services.reviewer {
        Some(reviewer_config) => {
            info!("Initializing quality reviewer at {}", reviewer_config.url);
            Some(Arc::new(
                HttpReviewer::new(reviewer_config.clone())
                    .context("Failed to create reviewer client")?,
            ))
        }
        None => {
            info!("No reviewer configured, bundles skip the review stage");
            None
        }
    };

    let collaborators = Collaborators {
        analyzer: Arc::new(analyzer),
        asset_generator: assets.clone(),
        script_generator: Arc::new(script_generator),
        renderer: Arc::new(renderer),
        reviewer,
    };

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        bundles,
        ledger,
        collaborators,
        assets,
    ));

    // Start the stuck-job sweeper
    let sweeper = state.sweeper();
    if config.sweeper.enabled {
        sweeper.start().await;
        info!(
            "Sweeper started (interval {}s, asset timeout {}s, render timeout {}s)",
            config.sweeper.interval_secs,
            config.sweeper.asset_timeout_secs,
            config.sweeper.render_timeout_secs
        );
    } else {
        info!("Sweeper disabled in config");
    }

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutting down...");
    if sweeper.is_running() {
        info!("Stopping sweeper...");
        sweeper.stop().await;
        info!("Sweeper stopped");
    }

    Ok(())
}

fn required(service: &Option<ServiceConfig>, name: &str) -> Result<ServiceConfig> {
    service
        .clone()
        .with_context(|| format!("services.{} is not configured", name))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
