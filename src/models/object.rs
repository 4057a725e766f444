//! Represents the stored metadata of a binary object (its "head").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of a binary held by the object store.
///
/// The payload bytes themselves are never part of this struct.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectHead {
    /// Object key (storage-safe, single path segment).
    pub key: String,

    /// Content type (MIME type) given at upload time.
    pub content_type: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload, lowercase hex.
    pub etag: String,

    /// When the payload was last written.
    pub last_modified: DateTime<Utc>,
}
