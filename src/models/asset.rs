//! Photo records kept in the metadata store and the shapes returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::access::SignedUrl;

/// A single uploaded photo, as stored in the `assets` table.
///
/// The binary lives in the object store under `asset_key`; this row only
/// carries ownership and descriptive fields. `owner_id`, `asset_key` and
/// `created_at` never change after creation.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    /// Record identity, generated fresh on every upload.
    pub id: Uuid,

    /// Partition key: the user who uploaded the photo.
    pub owner_id: String,

    /// Object-store key of the binary.
    pub asset_key: String,

    /// Filename as supplied by the uploader.
    pub file_name: String,

    pub title: String,

    #[serde(rename = "desc")]
    pub description: String,

    #[serde(rename = "dateCreated")]
    pub created_at: DateTime<Utc>,
}

/// Caller-facing photo shape with a freshly minted access URL.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PhotoView {
    pub id: Uuid,
    pub asset_key: String,
    /// `None` when the link could not be signed at this instant.
    pub url: Option<String>,
    pub url_expires_at: Option<DateTime<Utc>>,
    pub title: String,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(rename = "dateCreated")]
    pub created_at: DateTime<Utc>,
}

impl PhotoView {
    pub fn new(record: AssetRecord, url: Option<SignedUrl>) -> Self {
        let (url, url_expires_at) = match url {
            Some(signed) => (Some(signed.url), Some(signed.expires_at)),
            None => (None, None),
        };
        Self {
            id: record.id,
            asset_key: record.asset_key,
            url,
            url_expires_at,
            title: record.title,
            description: record.description,
            created_at: record.created_at,
        }
    }
}

/// Partial update of a photo's descriptive fields.
///
/// Absent or blank fields leave the stored value untouched.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct PhotoEdit {
    pub title: Option<String>,
    #[serde(rename = "desc")]
    pub description: Option<String>,
}

impl PhotoEdit {
    pub fn is_empty(&self) -> bool {
        non_blank(&self.title).is_none() && non_blank(&self.description).is_none()
    }

    /// Apply the supplied fields onto `record`.
    pub fn apply(&self, record: &mut AssetRecord) {
        if let Some(title) = non_blank(&self.title) {
            record.title = title.to_string();
        }
        if let Some(description) = non_blank(&self.description) {
            record.description = description.to_string();
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Result of a photo deletion.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    /// False when the record is gone but the binary could not be removed.
    pub object_removed: bool,
}
