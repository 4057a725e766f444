//! Route table for the photo service.
//!
//! ## Structure
//! - **Owners**
//!   - `POST   /api/owners` — create owner
//!   - `GET    /api/owners/{owner_id}` — owner with profile/banner links
//!   - `PATCH  /api/owners/{owner_id}/images` — replace profile and/or banner
//!
//! - **Photos**
//!   - `POST   /api/owners/{owner_id}/photos` — upload (multipart)
//!   - `GET    /api/owners/{owner_id}/photos` — list with fresh links
//!   - `PUT    /api/owners/{owner_id}/photos/{id}` — edit title/description
//!   - `DELETE /api/owners/{owner_id}/photos/{id}?key=` — delete
//!   - `GET    /api/owners/{owner_id}/photos/{id}/url` — reissue link
//!
//! - **Objects**
//!   - `GET    /objects/{key}?expires=&signature=` — signed read

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::serve_object,
        owner_handlers::{create_owner, get_owner, update_owner_images},
        photo_handlers::{delete_photo, edit_photo, list_photos, photo_url, upload_photo},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
};

/// Largest accepted request body (multipart uploads included).
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Build the router; state is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // owners
        .route("/api/owners", post(create_owner))
        .route("/api/owners/{owner_id}", get(get_owner))
        .route("/api/owners/{owner_id}/images", patch(update_owner_images))
        // photos
        .route(
            "/api/owners/{owner_id}/photos",
            post(upload_photo).get(list_photos),
        )
        .route(
            "/api/owners/{owner_id}/photos/{id}",
            put(edit_photo).delete(delete_photo),
        )
        .route("/api/owners/{owner_id}/photos/{id}/url", get(photo_url))
        // signed object reads
        .route("/objects/{key}", get(serve_object))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
