//! Serves object payloads behind signed, expiring links.
//! Bodies are streamed straight from the object store, never buffered.

use crate::{
    errors::AppError,
    models::object::ObjectHead,
    services::object_store::ObjectStoreError,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, warn};

/// Query half of a signed link.
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// `GET /objects/{key}?expires=&signature=`
pub async fn serve_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<SignedQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !state.signer.verify(&key, q.expires, &q.signature) {
        debug!(key = %key, expires = q.expires, "rejected object link");
        return Err(AppError::forbidden("link is invalid or has expired"));
    }

    let (head, stream) = state.objects.get(&key).await.map_err(|err| match err {
        ObjectStoreError::NotFound(_) | ObjectStoreError::InvalidKey(_) => {
            AppError::not_found(format!("object {key} not found"))
        }
        other => {
            warn!(key = %key, error = %other, "object read failed");
            AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "STORAGE_UNAVAILABLE",
                other.to_string(),
            )
        }
    })?;

    let mut response = Response::new(Body::from_stream(stream));
    set_object_headers(response.headers_mut(), &head);
    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, head: &ObjectHead) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&head.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&head.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", head.etag)) {
        headers.insert(header::ETAG, value);
    }

    if let Ok(value) = HeaderValue::from_str(&head.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    // The link itself is the credential; shared caches must not keep it.
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private, no-store"));
}
