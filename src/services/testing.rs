//! Test doubles shared by the service tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use sqlx::sqlite::SqlitePoolOptions;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crate::{
    models::{access::SignedUrl, object::ObjectHead},
    services::{
        metadata_store::SqliteMetadataStore,
        normalizer::{NormalizeError, Normalizer},
        object_store::{ByteStream, ObjectStore, ObjectStoreError, ObjectStoreResult},
        signing::UrlSigner,
    },
};

/// Fresh single-connection in-memory SQLite store with the schema applied.
pub async fn memory_metadata_store() -> SqliteMetadataStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteMetadataStore::new(Arc::new(pool));
    store.migrate().await.unwrap();
    store
}

/// Make every subsequent asset insert fail inside SQLite.
pub async fn break_asset_inserts(store: &SqliteMetadataStore) {
    sqlx::query(
        "CREATE TRIGGER fail_asset_insert BEFORE INSERT ON assets
         BEGIN SELECT RAISE(ABORT, 'simulated metadata fault'); END",
    )
    .execute(&*store.db)
    .await
    .unwrap();
}

/// Make every subsequent owner write fail inside SQLite.
pub async fn break_owner_writes(store: &SqliteMetadataStore) {
    for event in ["INSERT", "UPDATE"] {
        sqlx::query(&format!(
            "CREATE TRIGGER fail_owner_{} BEFORE {event} ON owners
             BEGIN SELECT RAISE(ABORT, 'simulated metadata fault'); END",
            event.to_lowercase()
        ))
        .execute(&*store.db)
        .await
        .unwrap();
    }
}

/// In-memory object store with fault switches and a put counter.
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (ObjectHead, Bytes)>>,
    puts: AtomicUsize,
    /// Puts beyond this many fail.
    pub put_budget: AtomicUsize,
    pub fail_puts: AtomicBool,
    pub fail_exists: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_signing: AtomicBool,
    signer: UrlSigner,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            puts: AtomicUsize::new(0),
            put_budget: AtomicUsize::new(usize::MAX),
            fail_puts: AtomicBool::new(false),
            fail_exists: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            fail_signing: AtomicBool::new(false),
            signer: UrlSigner::new(b"memory-secret".to_vec(), "http://objects.test"),
        }
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn contents(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).map(|(_, b)| b.clone())
    }

    pub fn insert(&self, key: &str, data: &'static [u8]) {
        let head = head_for(key, "image/jpeg", data.len());
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (head, Bytes::from_static(data)));
    }
}

fn head_for(key: &str, content_type: &str, len: usize) -> ObjectHead {
    ObjectHead {
        key: key.to_string(),
        content_type: content_type.to_string(),
        size_bytes: len as i64,
        etag: String::new(),
        last_modified: Utc::now(),
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        stream: ByteStream,
        content_type: &str,
    ) -> ObjectStoreResult<String> {
        let attempt = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_puts.load(Ordering::SeqCst)
            || attempt > self.put_budget.load(Ordering::SeqCst)
        {
            return Err(ObjectStoreError::WriteFailed {
                key: key.to_string(),
                reason: "simulated put fault".into(),
            });
        }
        let chunks: Vec<Bytes> = stream.try_collect().await?;
        let data = Bytes::from(chunks.concat());
        if data.is_empty() {
            return Err(ObjectStoreError::WriteFailed {
                key: key.to_string(),
                reason: "empty payload".into(),
            });
        }
        let head = head_for(key, content_type, data.len());
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (head, data));
        Ok(key.to_string())
    }

    async fn head(&self, key: &str) -> ObjectStoreResult<Option<ObjectHead>> {
        Ok(self.objects.lock().unwrap().get(key).map(|(h, _)| h.clone()))
    }

    async fn exists(&self, key: &str) -> ObjectStoreResult<bool> {
        if self.fail_exists.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Unavailable("simulated outage".into()));
        }
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn get(&self, key: &str) -> ObjectStoreResult<(ObjectHead, ByteStream)> {
        let (head, data) = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;
        Ok((head, stream::iter(vec![Ok(data)]).boxed()))
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Unavailable("simulated outage".into()));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn sign_url(&self, key: &str, ttl: Duration) -> Option<SignedUrl> {
        if self.fail_signing.load(Ordering::SeqCst) {
            return None;
        }
        self.signer.sign(key, ttl)
    }
}

/// Returns its input unchanged.
pub struct PassthroughNormalizer;

#[async_trait]
impl Normalizer for PassthroughNormalizer {
    async fn normalize(&self, input: Bytes) -> Result<Bytes, NormalizeError> {
        Ok(input)
    }
}

/// Returns its input unchanged but reports JPEG output, like a re-encoder.
pub struct JpegLabelNormalizer;

#[async_trait]
impl Normalizer for JpegLabelNormalizer {
    async fn normalize(&self, input: Bytes) -> Result<Bytes, NormalizeError> {
        Ok(input)
    }

    fn output_content_type(&self) -> Option<&str> {
        Some("image/jpeg")
    }

    fn output_extension(&self) -> Option<&str> {
        Some("jpg")
    }
}

/// Always fails, counting how often it was asked.
#[derive(Default)]
pub struct RejectingNormalizer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Normalizer for RejectingNormalizer {
    async fn normalize(&self, _input: Bytes) -> Result<Bytes, NormalizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(NormalizeError::Task("simulated decoder crash".into()))
    }
}
