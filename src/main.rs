//! Lodestone Backend
//!
//! REST backend for generating RPG inventory lists from curated resource hubs,
//! with SQLite persistence, a live settings document and a local list history.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod generator;
mod history;
mod models;
mod settings;
mod store;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;
use generator::ListGenerator;
use history::{FileKeyValueStore, ListHistory};
use settings::SettingsMachine;
use store::SqliteDocumentStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub settings: Arc<SettingsMachine>,
    pub history: Arc<ListHistory>,
    pub generator: Arc<ListGenerator>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Lodestone Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("History directory: {:?}", config.history_dir);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!(
        "Draws per list: {}..={}, rarity weights: {:?}",
        config.draws.min,
        config.draws.max,
        config.rarity_weights
    );

    if config.api_psk.is_none() {
        tracing::warn!("No admin key configured (LODESTONE_API_PSK). Admin routes are open!");
    }

    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool.clone()));

    let documents = Arc::new(SqliteDocumentStore::new(pool));
    let settings = Arc::new(SettingsMachine::start(documents).await);

    spawn_notice_logger(&settings);

    let kv = Arc::new(FileKeyValueStore::open(&config.history_dir).await?);
    let history = Arc::new(ListHistory::new(kv));

    let generator = Arc::new(ListGenerator::new(
        config.rarity_weights.clone(),
        config.draws,
    ));

    let state = AppState {
        repo,
        settings: settings.clone(),
        history,
        generator,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    settings.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin_key = state.config.api_psk.clone();

    // Catalog management and settings
    let admin_routes = Router::new()
        .route("/hubs", get(api::list_hubs).post(api::create_hub))
        .route(
            "/hubs/{id}",
            get(api::get_hub)
                .put(api::update_hub)
                .delete(api::delete_hub),
        )
        .route(
            "/provisions",
            get(api::list_provisions).post(api::create_provision),
        )
        .route(
            "/provisions/{id}",
            get(api::get_provision)
                .put(api::update_provision)
                .delete(api::delete_provision),
        )
        .route(
            "/settings",
            get(api::get_settings).put(api::update_settings),
        )
        .route(
            "/settings/deletion-confirmation",
            post(api::toggle_deletion_confirmation),
        )
        .layer(middleware::from_fn(move |req, next| {
            auth::require_admin(admin_key.clone(), req, next)
        }));

    // List generation (no auth required)
    let public_routes = Router::new()
        .route("/public/hubs", get(api::list_public_hubs))
        .route("/generate", post(api::generate_list))
        .route(
            "/history",
            get(api::list_history).delete(api::clear_history),
        );

    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", admin_routes.merge(public_routes))
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Log every settings notice; admin clients also see the latest one in
/// `GET /api/settings`.
fn spawn_notice_logger(settings: &SettingsMachine) {
    let mut notices = settings.subscribe_notices();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => tracing::info!(?notice, "{}", notice.message()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Settings notice logger fell behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests;
