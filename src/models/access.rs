//! Time-limited read links. Derived on demand, never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A signed, expiring URL granting read access to one object.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
