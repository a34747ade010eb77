//! Defines every HTTP route the gallery serves.
//!
//! ## Structure
//! - **Probes**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Gallery API**
//!   - `POST /api/generate-image`  - generate, store and record an image
//!   - `GET  /api/images`          - list records newest first
//!   - `GET  /api/styles`          - selectable styles
//!   - `POST /api/download-image`  - fetch an image as a data URL
//!
//! - **Maintenance**
//!   - `POST /api/cleanup-storage`   - purge objects no record references
//!   - `POST /api/enforce-retention` - keep only the newest `cap` images
//!
//! - **Public objects** (local backend only)
//!   - `GET|HEAD /storage/v1/object/public/{bucket}/{*path}`
//!
//! Browsers call the API cross-origin, so every route sits behind a
//! permissive CORS layer that also answers `OPTIONS` preflights.

use crate::{
    handlers::{
        cleanup_handlers::{cleanup_storage, enforce_retention},
        gallery_handlers::{download_image, list_images, list_styles},
        generate_handlers::generate_image,
        health_handlers::{healthz, readyz},
        object_handlers::get_public_object,
    },
    state::AppState,
};
use axum::{
    Router,
    http::{HeaderName, Method, header},
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

/// Build and return the router for the whole service.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]);

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // gallery
        .route("/api/generate-image", post(generate_image))
        .route("/api/images", get(list_images))
        .route("/api/styles", get(list_styles))
        .route("/api/download-image", post(download_image))
        // maintenance
        .route("/api/cleanup-storage", post(cleanup_storage))
        .route("/api/enforce-retention", post(enforce_retention))
        // public objects; HEAD is served by the GET handler
        .route(
            "/storage/v1/object/public/{bucket}/{*path}",
            get(get_public_object),
        )
        .layer(cors)
}
