//! Recipe service
//!
//! A multi-user recipe API: accounts with token authentication, and tags,
//! ingredients and recipes that are only ever visible to the user who
//! created them.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod media;
pub mod models;
pub mod ownership;
pub mod recipe_routes;
pub mod state;
pub mod storage;
pub mod store;
pub mod user_models;
pub mod user_routes;
pub mod user_storage;
pub mod validation;

use std::sync::Arc;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::state::{AppState, SharedState};

/// Creates the application router with all routes configured.
pub fn create_app(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .nest("/user", user_routes::router())
        .nest("/recipe", recipe_routes::router(state.config.max_upload_bytes));

    let media_url = state.config.media_url.trim_end_matches('/').to_string();
    let media = ServeDir::new(state.recipes.media().root());

    Router::new()
        .nest("/api", api)
        .nest_service(&media_url, media)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Opens the stores named by `config`.
pub fn create_state(config: Config) -> anyhow::Result<SharedState> {
    Ok(Arc::new(AppState::open(config)?))
}

/// Initializes tracing; `RUST_LOG` wins over the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
