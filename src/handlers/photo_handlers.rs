//! HTTP handlers for photo upload, listing, editing and deletion.
//! Thin adapters: all ordering and failure handling lives in `AssetCoordinator`.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{
    errors::AppError,
    models::asset::PhotoEdit,
    services::asset_coordinator::PhotoUpload,
    state::AppState,
};

/// Longest link lifetime a caller may ask for (7 days).
const MAX_TTL_MINUTES: i64 = 7 * 24 * 60;

/// `?ttlMinutes=` override for link lifetime.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlQuery {
    pub ttl_minutes: Option<i64>,
}

impl TtlQuery {
    fn ttl(&self) -> Result<Option<Duration>, AppError> {
        match self.ttl_minutes {
            None => Ok(None),
            Some(minutes) if (1..=MAX_TTL_MINUTES).contains(&minutes) => {
                Ok(Duration::try_minutes(minutes))
            }
            Some(minutes) => Err(AppError::bad_request(format!(
                "ttlMinutes must be between 1 and {MAX_TTL_MINUTES}, got {minutes}"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub key: String,
}

/// POST `/api/owners/{owner_id}/photos` — multipart `file`, optional `title`, `desc`.
pub async fn upload_photo(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Query(ttl): Query<TtlQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file = None;
    let mut title = None;
    let mut description = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("failed to read multipart: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(String::from).unwrap_or_default();
                let content_type = field
                    .content_type()
                    .map(String::from)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(format!("failed to read file: {e}")))?;
                file = Some((file_name, content_type, data));
            }
            "title" | "desc" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(e.to_string()))?;
                if name == "title" {
                    title = Some(text);
                } else {
                    description = Some(text);
                }
            }
            _ => {}
        }
    }

    let (file_name, content_type, data) =
        file.ok_or_else(|| AppError::bad_request("no file uploaded"))?;

    let view = state
        .assets
        .upload_photo(PhotoUpload {
            owner_id,
            file_name,
            content_type,
            data,
            title,
            description,
            url_ttl: ttl.ttl()?,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// GET `/api/owners/{owner_id}/photos`
pub async fn list_photos(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    Query(ttl): Query<TtlQuery>,
) -> Result<impl IntoResponse, AppError> {
    let photos = state.assets.list_photos(&owner_id, ttl.ttl()?).await?;
    let message = if photos.is_empty() {
        "No images found.".to_string()
    } else {
        format!("Found {} image(s).", photos.len())
    };
    Ok(Json(json!({
        "success": true,
        "message": message,
        "images": photos,
    })))
}

/// PUT `/api/owners/{owner_id}/photos/{id}` — JSON `{ "title"?, "desc"? }`.
pub async fn edit_photo(
    State(state): State<AppState>,
    Path((owner_id, id)): Path<(String, Uuid)>,
    Json(edit): Json<PhotoEdit>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.assets.edit_photo(&owner_id, id, edit).await?;
    Ok(Json(record))
}

/// DELETE `/api/owners/{owner_id}/photos/{id}?key=`
pub async fn delete_photo(
    State(state): State<AppState>,
    Path((owner_id, id)): Path<(String, Uuid)>,
    Query(q): Query<DeleteQuery>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.assets.delete_photo(&owner_id, id, &q.key).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Photo deleted successfully",
        "objectRemoved": outcome.object_removed,
    })))
}

/// GET `/api/owners/{owner_id}/photos/{id}/url` — fresh access link.
pub async fn photo_url(
    State(state): State<AppState>,
    Path((owner_id, id)): Path<(String, Uuid)>,
    Query(ttl): Query<TtlQuery>,
) -> Result<impl IntoResponse, AppError> {
    let view = state.assets.access_url(&owner_id, id, ttl.ttl()?).await?;
    Ok(Json(view))
}
