//! Represents a user and the profile/banner image slots attached to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// A user of the service.
///
/// The slot fields reference object-store keys directly; there is no
/// `AssetRecord` behind them, so their lifecycle follows the owner.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: String,
    pub email: String,
    pub name: String,
    pub profile_asset_key: Option<String>,
    pub banner_asset_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Owner {
    pub fn slot(&self, slot: ImageSlot) -> Option<&str> {
        match slot {
            ImageSlot::Profile => self.profile_asset_key.as_deref(),
            ImageSlot::Banner => self.banner_asset_key.as_deref(),
        }
    }

    pub fn set_slot(&mut self, slot: ImageSlot, key: String) {
        match slot {
            ImageSlot::Profile => self.profile_asset_key = Some(key),
            ImageSlot::Banner => self.banner_asset_key = Some(key),
        }
    }
}

/// Named image reference on an owner.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ImageSlot {
    Profile,
    Banner,
}

impl fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSlot::Profile => f.write_str("profile"),
            ImageSlot::Banner => f.write_str("banner"),
        }
    }
}

/// Key and link produced by a single slot upsert.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SlotUpload {
    pub key: String,
    pub url: Option<String>,
}

/// Caller-facing result of a profile/banner update.
///
/// Untouched slots report their previous key (with a fresh link), or null
/// when they were never set.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OwnerImagesView {
    pub profile_key: Option<String>,
    pub profile_url: Option<String>,
    pub banner_key: Option<String>,
    pub banner_url: Option<String>,
    pub date_created: DateTime<Utc>,
}
