//! Route table for the upload proxy.
//!
//! - `POST   /upload`  — multipart file upload (field `file`)
//! - `DELETE /delete`  — delete by key (JSON body `{"key": "..."}`)
//! - `GET    /{key}`   — fetch a stored object
//! - `GET    /healthz` / `GET /readyz` — probes
//!
//! A permissive CORS layer wraps the whole router, so browser preflights are
//! answered before any route matching and every response (success or error)
//! carries the allow-any-origin header. Unmatched paths and wrong methods
//! both get the JSON 404 envelope.

use crate::{
    errors::ApiError,
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{delete_file, get_file, upload_file},
    },
    services::storage_service::StorageService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};

/// Build the router carrying shared state (`StorageService`) to all handlers.
pub fn routes() -> Router<StorageService> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route("/delete", delete(delete_file))
        .route("/{key}", get(get_file))
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
