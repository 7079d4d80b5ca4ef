use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crucible_service::Service;

use crate::config::ServerConfig;
use crate::handler;

/// Compile sources and modules can be larger than axum's default body cap.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub config: ServerConfig,
}

/// Build the axum router with all Crucible endpoints.
pub fn build_router(service: Arc<Service>, config: ServerConfig) -> Router {
    let state = AppState { service, config };
    Router::new()
        .route("/health", get(handler::health))
        .route("/compile/:language", post(handler::compile))
        .route("/validate", post(handler::validate))
        .route("/run/:reference", post(handler::run))
        .route("/blob/:reference", get(handler::blob))
        .route("/aliases", get(handler::list_aliases))
        .route(
            "/alias/:name",
            get(handler::get_alias)
                .put(handler::put_alias)
                .delete(handler::delete_alias),
        )
        .route("/events", get(handler::events))
        .route("/stats", get(handler::stats))
        .route("/languages", get(handler::languages))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
