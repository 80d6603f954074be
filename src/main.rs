//! Previewd Server — on-demand derivative generation service
//!
//! Main entry point that wires all crates together and starts the server.

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use previewd_core::config::AppConfig;
use previewd_core::error::AppError;
use previewd_engine::probe::ToolCapabilities;
use previewd_engine::strategies::default_strategies;
use previewd_engine::{ConversionLimiter, DerivativeCache, PreviewCoordinator};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("PREVIEWD_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Previewd v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Create data directories ──────────────────────────
    create_data_directories(&config).await?;

    // ── Step 2: Probe external converters ────────────────────────
    tracing::info!("Probing external converters...");
    let capabilities = Arc::new(ToolCapabilities::detect(&config.preview.tools).await);

    // ── Step 3: Open the derivative cache ────────────────────────
    let cache = DerivativeCache::open(&config.storage.cache_root)
        .await
        .map_err(AppError::from)?;
    tracing::info!(root = %config.storage.cache_root, "Derivative cache ready");

    // ── Step 4: Build the conversion engine ──────────────────────
    let limiter = ConversionLimiter::new(config.preview.max_concurrent);
    tracing::info!(
        slots = limiter.max_permits(),
        "Conversion limiter initialized"
    );

    let blob_url_base = format!(
        "{}/api/preview/blob",
        config.server.public_url.trim_end_matches('/')
    );
    let strategies = default_strategies(
        &config.preview,
        PathBuf::from(&config.storage.scratch_root),
        blob_url_base,
        capabilities,
    );
    let coordinator = PreviewCoordinator::new(cache, limiter, strategies);

    // ── Step 5: Build and start HTTP server ──────────────────────
    let app_state = previewd_api::state::AppState {
        config: Arc::new(config.clone()),
        coordinator,
    };
    let app = previewd_api::router::build_router(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Previewd server listening on {}", addr);

    // ── Step 6: Graceful shutdown ────────────────────────────────
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    tracing::info!("Previewd server shut down gracefully");
    Ok(())
}

/// Create required data directories
async fn create_data_directories(config: &AppConfig) -> Result<(), AppError> {
    let dirs = [
        config.storage.files_root.clone(),
        config.storage.cache_root.clone(),
        config.storage.scratch_root.clone(),
    ];

    for dir in &dirs {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::internal(format!("Failed to create dir '{}': {}", dir, e)))?;
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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
