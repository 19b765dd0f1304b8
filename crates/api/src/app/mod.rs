//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage wiring (procurement store, attachment files)
//! - `routes/`: HTTP routes + handlers (one file per workflow area)
//! - `dto.rs`: query shapes and JSON response helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Largest accepted request body; attachment uploads are the only large ones.
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: AppServices) -> Router {
    let api = routes::router()
        .layer(Extension(Arc::new(services)))
        .layer(axum::middleware::from_fn(middleware::actor_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(api)
        .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(MAX_BODY_BYTES)))
}
