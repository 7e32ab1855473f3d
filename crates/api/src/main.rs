use std::net::SocketAddr;
use std::sync::Arc;

use annotator_core::assets::{AssetResolver, NoAssets, TemplateAssetResolver};
use annotator_core::schema::FieldSchema;
use annotator_core::session::{SessionContext, SessionRegistry};
use annotator_core::store::RecordStore;
use annotator_db::JsonlStore;
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use annotator_api::config::{ServerConfig, StoreBackend};
use annotator_api::router::build_app_router;
use annotator_api::state::AppState;
use annotator_api::users::UserDirectory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "annotator_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid configuration")?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Record store ---
    let store: Arc<dyn RecordStore> = match &config.store {
        StoreBackend::Jsonl { path } => {
            let store = JsonlStore::open(path.clone())
                .await
                .with_context(|| format!("Failed to open record file {}", path.display()))?;
            tracing::info!(path = %path.display(), "Using JSONL record store");
            Arc::new(store)
        }
        StoreBackend::Sqlite { url } => {
            let store = annotator_db::open_sqlite_store(url)
                .await
                .context("Failed to open SQLite record store")?;
            annotator_db::health_check(store.pool())
                .await
                .context("Database health check failed")?;
            tracing::info!("Using SQLite record store, migrations applied");
            Arc::new(store)
        }
    };

    // --- Field schema ---
    let schema = match &config.schema_path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read schema {}", path.display()))?;
            FieldSchema::from_json_str(&text).context("Invalid field schema")?
        }
        None => FieldSchema::object_attributes(),
    };
    tracing::info!(fields = schema.fields.len(), "Field schema loaded");

    // --- Preview assets ---
    let assets: Arc<dyn AssetResolver> = match &config.asset_base_path {
        Some(base) => {
            tracing::info!(base = %base.display(), "Serving previews from asset directory");
            Arc::new(TemplateAssetResolver::new(base.clone(), config.asset_template.clone()))
        }
        None => {
            tracing::warn!("ASSET_BASE_PATH not set, previews disabled");
            Arc::new(NoAssets)
        }
    };

    // --- Users ---
    let users = UserDirectory::load(&config.users_path)
        .await
        .context("Failed to load users")?;
    if users.is_empty() {
        tracing::warn!(path = %config.users_path.display(), "No users configured");
    }
    tracing::info!(users = users.len(), "User directory loaded");

    // --- App state ---
    let registry = SessionRegistry::new(SessionContext {
        store,
        schema: Arc::new(schema),
        assets,
        boundary: config.boundary,
    });
    let state = AppState {
        registry: Arc::new(registry),
        users: Arc::new(users),
        config: Arc::new(config.clone()),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Server ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT combination")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
