//! HTTP surface: router, handlers and boundary errors
//!
//! ```text
//! GET  /           status payload
//! POST /remove-bg  multipart `image` -> PNG attachment
//! ```

pub mod cors;
pub mod error;
pub mod handlers;
pub mod upload;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::ServerConfig;
use crate::segmenter::Segmenter;

pub use cors::build_cors_layer;
pub use error::ApiError;

/// Immutable state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub segmenter: Arc<dyn Segmenter>,
}

impl AppState {
    pub fn new(segmenter: Arc<dyn Segmenter>) -> Self {
        Self { segmenter }
    }
}

/// Build the application router with its middleware stack
///
/// Bodies over `config.max_upload_bytes` are answered with 413 before any
/// handler runs.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/", get(handlers::home))
        .route("/remove-bg", post(handlers::remove_background))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes));

    if let Some(cors) = build_cors_layer(&config.cors) {
        router = router.layer(cors);
    }

    router.layer(TraceLayer::new_for_http())
}
