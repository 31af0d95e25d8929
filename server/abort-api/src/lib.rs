//! Abort Time Logger reporting API
//!
//! Read-only HTTP service over persisted abort incidents: dashboard
//! annotations (one per incident) and ring-name search.
//! Bind to 127.0.0.1 by default (internal only).

mod annotation;
mod date;
mod handlers;
mod state;
mod types;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use annotation::to_annotations;
pub use handlers::{annotations, health, search};
pub use state::{AppState, SignalSource};
pub use types::{AnnotationQuery, Annotations, SearchQuery};

/// All routes, with permissive CORS for the dashboard.
pub fn router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/annotations", get(annotations))
    .route("/search", get(search))
    .layer(CorsLayer::permissive())
    .with_state(state)
}
