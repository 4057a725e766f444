//! HMAC signing of object read links.
//!
//! Link: `{base_url}/objects/{escaped key}?expires={unix_ts}&signature={sig}` where
//! `sig = base64url(HMAC-SHA256(secret, "{key}\n{unix_ts}"))`. Keys may already
//! carry percent-escapes, so the path segment is escaped once more and the
//! router's single decode hands back the exact key that was signed.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::access::SignedUrl;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies expiring object links.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Sign `key` for `ttl` starting now. Returns `None` if the expiry cannot
    /// be represented or the key is empty.
    pub fn sign(&self, key: &str, ttl: Duration) -> Option<SignedUrl> {
        self.sign_at(key, ttl, Utc::now())
    }

    fn sign_at(&self, key: &str, ttl: Duration, now: DateTime<Utc>) -> Option<SignedUrl> {
        if key.is_empty() || ttl <= Duration::zero() {
            return None;
        }
        let expires_at = now.checked_add_signed(ttl)?;
        let expires = expires_at.timestamp();
        let signature = self.signature(key, expires)?;
        Some(SignedUrl {
            url: format!(
                "{}/objects/{}?expires={}&signature={}",
                self.base_url,
                urlencoding::encode(key),
                expires,
                signature
            ),
            // Truncated to whole seconds so the reported expiry matches the link.
            expires_at: DateTime::from_timestamp(expires, 0)?,
        })
    }

    /// Check a presented link: signature must match and expiry must lie in the future.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> bool {
        self.verify_at(key, expires, signature, Utc::now())
    }

    fn verify_at(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        if expires <= now.timestamp() {
            return false;
        }
        let Ok(tag) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(signing_payload(key, expires).as_bytes());
        mac.verify_slice(&tag).is_ok()
    }

    fn signature(&self, key: &str, expires: i64) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(signing_payload(key, expires).as_bytes());
        Some(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

fn signing_payload(key: &str, expires: i64) -> String {
    format!("{key}\n{expires}")
}
