//! SchemaBind API - typed models for a live content schema
//!
//! Serves the models operator surface: build status, forced rebuilds and
//! change notifications from the schema store. Models are rebuilt lazily on
//! the first request after the schema or a model source file changes.

use schemabind::backend::{ManifestCompiler, ManifestEmitter};
use schemabind::config::Settings;
use schemabind::generation::GenerationCache;
use schemabind::reload::ReloadCoordinator;
use schemabind::routes::create_router;
use schemabind::schema::JsonSchemaStore;
use schemabind::snapshot::SchemaSnapshotBuilder;
use schemabind::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting SchemaBind...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let models = &settings.models;
    info!(
        "📁 Models directory: {} (schema: {})",
        models.directory.display(),
        models.schema_file.display()
    );

    let store = Arc::new(JsonSchemaStore::new(&models.schema_file));
    let coordinator = ReloadCoordinator::new(
        SchemaSnapshotBuilder::new(store, models.binding_names),
        Arc::new(ManifestEmitter::new()),
        Arc::new(ManifestCompiler::new()),
        GenerationCache::new(&models.directory),
        models.coordinator_options(),
    );
    let state = Arc::new(AppState::new(coordinator, settings.clone()));

    if models.watch_files {
        if let Err(e) = state.watcher.watch_directory(&models.directory) {
            warn!("⚠️  Not watching model source files: {}", e);
        }
    }

    // Warm up so the first request does not pay for the build
    let warmup = Arc::clone(&state.coordinator);
    let generation = tokio::task::spawn_blocking(move || warmup.ensure_ready()).await?;
    match state.coordinator.get_last_error() {
        None => info!(
            "✅ Models version {} ready ({} models)",
            generation.version,
            generation.registry.len()
        ),
        Some(e) => warn!("⚠️  Models version {} is degraded: {}", generation.version, e),
    }

    // Build the router
    let app = create_router(Arc::clone(&state), &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   GET  /health                        - Health check");
    info!("   GET  /api/models/status             - Build state, version, last error");
    info!("   POST /api/models/rebuild            - Invalidate and rebuild now");
    info!("   POST /api/models/notify/schema      - Content types changed");
    info!("   POST /api/models/notify/data-type   - Data types changed");
    info!("   GET  /api/models/{{alias}}            - Model registered for an alias");
    info!("   POST /api/models/bind               - Bind a property bag to its model");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.watcher.stop();
    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schemabind=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
