//! HTTP handlers for owners and their profile/banner images.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::{errors::AppError, services::asset_coordinator::ImageFile, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateOwnerReq {
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// POST `/api/owners`
pub async fn create_owner(
    State(state): State<AppState>,
    Json(req): Json<CreateOwnerReq>,
) -> Result<impl IntoResponse, AppError> {
    let owner = state.assets.create_owner(&req.email, &req.name).await?;
    Ok((StatusCode::CREATED, Json(owner)))
}

/// GET `/api/owners/{owner_id}` — owner plus fresh links for its slots.
pub async fn get_owner(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let owner = state.assets.get_owner(&owner_id).await?;
    let images = state.assets.owner_images(&owner);
    Ok(Json(json!({ "owner": owner, "images": images })))
}

/// PATCH `/api/owners/{owner_id}/images` — multipart `profileFile` and/or `bannerFile`.
pub async fn update_owner_images(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut profile = None;
    let mut banner = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("failed to read multipart: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name != "profileFile" && name != "bannerFile" {
            continue;
        }
        let image = ImageFile {
            file_name: field.file_name().map(String::from).unwrap_or_default(),
            content_type: field
                .content_type()
                .map(String::from)
                .unwrap_or_else(|| "application/octet-stream".into()),
            data: field
                .bytes()
                .await
                .map_err(|e| AppError::bad_request(format!("failed to read file: {e}")))?,
        };
        if name == "profileFile" {
            profile = Some(image);
        } else {
            banner = Some(image);
        }
    }

    let images = state
        .assets
        .update_owner_images(&owner_id, profile, banner)
        .await?;
    Ok(Json(json!({ "success": true, "images": images })))
}
