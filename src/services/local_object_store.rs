//! src/services/local_object_store.rs
//!
//! LocalObjectStore — disk-backed object store. Payloads live under
//! `root/blobs/{shard}/{shard}/{key}` and their heads (content type, size,
//! etag) under `root/heads/{shard}/{shard}/{key}.json`.
//!
//! Shard directories are created on demand and never removed, so a delete
//! cannot pull a directory out from under a concurrent put.
//!
//! The head file is the commit marker: a put writes the payload first and the
//! head last, a delete removes the head first. An object "exists" exactly
//! when its head does, so a crash mid-put or mid-delete never exposes a
//! half-written object.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::StreamExt;
use md5::Context;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::ObjectStoreConfig,
    models::{access::SignedUrl, object::ObjectHead},
    services::{
        keys,
        object_store::{ByteStream, ObjectStore, ObjectStoreError, ObjectStoreResult},
        signing::UrlSigner,
    },
};

#[derive(Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    signer: Arc<UrlSigner>,
}

impl LocalObjectStore {
    /// Create the store, making sure the root directory exists.
    pub async fn new(config: &ObjectStoreConfig, signer: Arc<UrlSigner>) -> io::Result<Self> {
        fs::create_dir_all(config.root.join("blobs")).await?;
        fs::create_dir_all(config.root.join("heads")).await?;
        Ok(Self {
            root: config.root.clone(),
            signer,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys are single path segments: no separators, no `.`/`..`, no control bytes.
    fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > keys::MAX_KEY_LEN
            || key == "."
            || key == ".."
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\');
        if invalid {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Two-level shard directories from MD5(key), keeping directories small.
    fn shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let (a, b) = Self::shards(key);
        self.root.join("blobs").join(a).join(b).join(key)
    }

    fn head_path(&self, key: &str) -> PathBuf {
        let (a, b) = Self::shards(key);
        self.root
            .join("heads")
            .join(a)
            .join(b)
            .join(format!("{key}.json"))
    }

    /// Stream the payload into a temp file next to `dest`, then rename it in.
    /// Returns (size, md5 hex).
    async fn write_blob(&self, dest: &Path, mut stream: ByteStream) -> io::Result<(i64, String)> {
        let parent = dest.parent().map(Path::to_path_buf).ok_or_else(|| {
            io::Error::new(ErrorKind::Other, "object path missing parent directory")
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(err);
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        }

        if size_bytes == 0 {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(io::Error::new(ErrorKind::InvalidInput, "empty payload"));
        }

        if let Err(err) = sync_and_close(file).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        if let Err(err) = fs::rename(&tmp_path, dest).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(dest).await?;
                fs::rename(&tmp_path, dest).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        }

        Ok((size_bytes, format!("{:x}", digest.compute())))
    }

    async fn write_head(&self, head: &ObjectHead) -> io::Result<()> {
        let dest = self.head_path(&head.key);
        let parent = dest.parent().map(Path::to_path_buf).ok_or_else(|| {
            io::Error::new(ErrorKind::Other, "head path missing parent directory")
        })?;
        fs::create_dir_all(&parent).await?;
        let body = serde_json::to_vec(head).map_err(io::Error::other)?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        fs::write(&tmp_path, body).await?;
        if let Err(err) = fs::rename(&tmp_path, &dest).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        Ok(())
    }

    async fn read_head(&self, key: &str) -> ObjectStoreResult<Option<ObjectHead>> {
        match fs::read(self.head_path(key)).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|err| ObjectStoreError::Unavailable(format!("corrupt head for `{key}`: {err}"))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ObjectStoreError::Unavailable(err.to_string())),
        }
    }

    /// Remove a file, treating "already gone" as success.
    async fn remove_if_present(path: &Path) -> io::Result<()> {
        match fs::remove_file(path).await {
            Ok(_) => {
                debug!("removed {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("{} already missing", path.display());
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

async fn sync_and_close(mut file: File) -> io::Result<()> {
    file.flush().await?;
    file.sync_all().await
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(
        &self,
        key: &str,
        stream: ByteStream,
        content_type: &str,
    ) -> ObjectStoreResult<String> {
        Self::ensure_key_safe(key)?;
        let write_failed = |reason: String| ObjectStoreError::WriteFailed {
            key: key.to_string(),
            reason,
        };

        let blob_path = self.blob_path(key);
        let (size_bytes, etag) = self
            .write_blob(&blob_path, stream)
            .await
            .map_err(|err| write_failed(err.to_string()))?;

        let head = ObjectHead {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            etag,
            last_modified: Utc::now(),
        };
        if let Err(err) = self.write_head(&head).await {
            let _ = fs::remove_file(&blob_path).await;
            return Err(write_failed(err.to_string()));
        }

        info!(key = %key, size_bytes, "object stored");
        Ok(key.to_string())
    }

    async fn head(&self, key: &str) -> ObjectStoreResult<Option<ObjectHead>> {
        Self::ensure_key_safe(key)?;
        self.read_head(key).await
    }

    async fn exists(&self, key: &str) -> ObjectStoreResult<bool> {
        Self::ensure_key_safe(key)?;
        fs::try_exists(self.head_path(key))
            .await
            .map_err(|err| ObjectStoreError::Unavailable(err.to_string()))
    }

    async fn get(&self, key: &str) -> ObjectStoreResult<(ObjectHead, ByteStream)> {
        Self::ensure_key_safe(key)?;
        let head = self
            .read_head(key)
            .await?
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;

        let file = File::open(self.blob_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;

        Ok((head, ReaderStream::new(file).boxed()))
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
        Self::ensure_key_safe(key)?;
        let head_path = self.head_path(key);
        let blob_path = self.blob_path(key);

        Self::remove_if_present(&head_path).await?;
        Self::remove_if_present(&blob_path).await?;

        info!(key = %key, "object deleted");
        Ok(())
    }

    fn sign_url(&self, key: &str, ttl: Duration) -> Option<SignedUrl> {
        if let Err(err) = Self::ensure_key_safe(key) {
            warn!(key = %key, error = %err, "refusing to sign url");
            return None;
        }
        let signed = self.signer.sign(key, ttl);
        if signed.is_none() {
            warn!(key = %key, ttl_secs = ttl.num_seconds(), "url signing failed");
        }
        signed
    }
}
