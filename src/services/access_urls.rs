//! Access URL issuance.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    models::access::SignedUrl,
    services::object_store::{ObjectStore, ObjectStoreError},
};

/// Mints short-lived read links on demand. Nothing issued here is stored.
#[derive(Clone)]
pub struct AccessUrlIssuer {
    objects: Arc<dyn ObjectStore>,
    default_ttl: Duration,
}

impl AccessUrlIssuer {
    pub fn new(objects: Arc<dyn ObjectStore>, default_ttl: Duration) -> Self {
        Self {
            objects,
            default_ttl,
        }
    }

    /// Sign without probing the store. A signing failure degrades to `None`.
    pub fn issue(&self, key: &str, ttl: Option<Duration>) -> Option<SignedUrl> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let signed = self.objects.sign_url(key, ttl);
        if signed.is_none() {
            warn!(asset_key = %key, "no access url issued");
        }
        signed
    }

    /// Sign only after reading the object's head, so a link is never handed
    /// out for a missing key without the caller hearing about it.
    pub async fn issue_checked(
        &self,
        key: &str,
        ttl: Option<Duration>,
    ) -> Result<Option<SignedUrl>, ObjectStoreError> {
        let head = self
            .objects
            .head(key)
            .await?
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        debug!(asset_key = %key, size_bytes = head.size_bytes, "object present, signing");
        Ok(self.issue(key, ttl))
    }
}
