//! Object store abstraction.
//!
//! Backends hold photo binaries addressed by string keys. The coordinator
//! only talks to this trait, so tests can swap in an in-memory store.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use futures::stream::BoxStream;
use std::io;
use thiserror::Error;

use crate::models::{access::SignedUrl, object::ObjectHead};

/// Stream of payload chunks handed to / returned from a backend.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// The write did not happen (empty payload or backend rejected it).
    #[error("object write failed for `{key}`: {reason}")]
    WriteFailed { key: String, reason: String },

    /// The store could not answer; the object may or may not exist.
    #[error("object store unavailable: {0}")]
    Unavailable(String),

    #[error("object `{0}` not found")]
    NotFound(String),

    #[error("invalid object key `{0}`")]
    InvalidKey(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `stream` under `key`. Fails with `WriteFailed` when the stream
    /// is empty; a failed put leaves nothing visible under `key`.
    async fn put(&self, key: &str, stream: ByteStream, content_type: &str)
    -> ObjectStoreResult<String>;

    /// Object metadata, or `None` when the key is definitely absent.
    async fn head(&self, key: &str) -> ObjectStoreResult<Option<ObjectHead>>;

    /// `false` only on a definite not-found; any other failure is `Unavailable`.
    async fn exists(&self, key: &str) -> ObjectStoreResult<bool>;

    /// Open the payload for reading.
    async fn get(&self, key: &str) -> ObjectStoreResult<(ObjectHead, ByteStream)>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> ObjectStoreResult<()>;

    /// Mint a time-limited read link without touching the backend.
    /// Returns `None` if signing fails; callers treat that as degraded, not fatal.
    fn sign_url(&self, key: &str, ttl: Duration) -> Option<SignedUrl>;
}
