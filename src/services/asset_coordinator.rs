//! src/services/asset_coordinator.rs
//!
//! AssetCoordinator — ties normalization, object-store writes, metadata-store
//! writes and access-URL issuance into single operations.
//!
//! The two stores share no transaction, so every operation follows a fixed
//! ordering that limits inconsistency to unreferenced objects:
//! - create: object first, then metadata record
//! - delete: metadata record first, then object
//!
//! An object left behind by a failed metadata write is reported as
//! `AssetError::MetadataWrite` and logged; it is never rolled back here.

use bytes::Bytes;
use chrono::{Duration, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        asset::{AssetRecord, DeleteOutcome, PhotoEdit, PhotoView},
        owner::{ImageSlot, Owner, OwnerImagesView, SlotUpload},
    },
    services::{
        access_urls::AccessUrlIssuer,
        keys,
        metadata_store::{MetadataError, MetadataStore},
        normalizer::{NormalizeError, Normalizer},
        object_store::{ByteStream, ObjectStore, ObjectStoreError},
    },
};

const DEFAULT_DESCRIPTION: &str = "Uploaded by user";

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("object store write failed: {0}")]
    StorageWrite(String),
    #[error("object store unavailable: {0}")]
    StorageUnavailable(String),
    #[error("upload of `{asset_key}` failed: {reason}")]
    UploadFailed { asset_key: String, reason: String },
    #[error("object `{asset_key}` was stored but its metadata write failed: {reason}")]
    MetadataWrite { asset_key: String, reason: String },
    #[error("metadata store error: {0}")]
    Metadata(String),
    #[error("image normalization failed: {0}")]
    Normalization(#[from] NormalizeError),
}

impl AssetError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AssetError::Validation(_) => "VALIDATION_ERROR",
            AssetError::NotFound(_) => "NOT_FOUND",
            AssetError::Conflict(_) => "CONFLICT",
            AssetError::StorageWrite(_) => "STORAGE_WRITE_ERROR",
            AssetError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AssetError::UploadFailed { .. } => "UPLOAD_FAILED",
            AssetError::MetadataWrite { .. } => "METADATA_WRITE_ERROR",
            AssetError::Metadata(_) => "DATABASE_ERROR",
            AssetError::Normalization(_) => "NORMALIZATION_ERROR",
        }
    }
}

impl From<ObjectStoreError> for AssetError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::WriteFailed { .. } => AssetError::StorageWrite(err.to_string()),
            ObjectStoreError::NotFound(key) => AssetError::NotFound(format!("object `{key}`")),
            ObjectStoreError::InvalidKey(_) => AssetError::Validation(err.to_string()),
            ObjectStoreError::Unavailable(_) | ObjectStoreError::Io(_) => {
                AssetError::StorageUnavailable(err.to_string())
            }
        }
    }
}

impl From<MetadataError> for AssetError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Conflict(what) => AssetError::Conflict(what),
            MetadataError::NotFound(what) => AssetError::NotFound(what),
            MetadataError::Sqlx(_) => AssetError::Metadata(err.to_string()),
        }
    }
}

pub type AssetResult<T> = Result<T, AssetError>;

/// A new photo as received from the caller.
#[derive(Clone, Debug)]
pub struct PhotoUpload {
    pub owner_id: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Overrides the default link lifetime.
    pub url_ttl: Option<Duration>,
}

/// An image destined for a profile/banner slot.
#[derive(Clone, Debug)]
pub struct ImageFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Clone)]
pub struct AssetCoordinator {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    normalizer: Arc<dyn Normalizer>,
    urls: AccessUrlIssuer,
}

impl AssetCoordinator {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        normalizer: Arc<dyn Normalizer>,
        default_url_ttl: Duration,
    ) -> Self {
        let urls = AccessUrlIssuer::new(objects.clone(), default_url_ttl);
        Self {
            objects,
            metadata,
            normalizer,
            urls,
        }
    }

    /// Normalize, store, record, then sign.
    pub async fn upload_photo(&self, upload: PhotoUpload) -> AssetResult<PhotoView> {
        require("owner id", &upload.owner_id)?;
        require("file name", &upload.file_name)?;
        if upload.data.is_empty() {
            return Err(AssetError::Validation("no file content uploaded".into()));
        }

        let normalized = self.normalizer.normalize(upload.data).await?;
        let content_type = self
            .normalizer
            .output_content_type()
            .unwrap_or(upload.content_type.as_str())
            .to_string();

        let asset_key =
            keys::generate_key(&upload.owner_id, &self.stored_name(&upload.file_name));
        if let Err(err) = self
            .objects
            .put(&asset_key, single_chunk(normalized), &content_type)
            .await
        {
            error!(owner_id = %upload.owner_id, asset_key = %asset_key, error = %err, "object upload failed");
            return Err(AssetError::UploadFailed {
                asset_key,
                reason: err.to_string(),
            });
        }

        let record = AssetRecord {
            id: Uuid::new_v4(),
            owner_id: upload.owner_id,
            title: non_blank(upload.title).unwrap_or_else(|| upload.file_name.clone()),
            description: non_blank(upload.description)
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            file_name: upload.file_name,
            asset_key,
            created_at: Utc::now(),
        };

        let record = match self.metadata.create(&record).await {
            Ok(record) => record,
            Err(err) => {
                error!(
                    owner_id = %record.owner_id,
                    asset_key = %record.asset_key,
                    error = %err,
                    "orphaned object: metadata write failed after upload"
                );
                return Err(AssetError::MetadataWrite {
                    asset_key: record.asset_key,
                    reason: err.to_string(),
                });
            }
        };

        let url = self.urls.issue(&record.asset_key, upload.url_ttl);
        info!(owner_id = %record.owner_id, id = %record.id, asset_key = %record.asset_key, "photo uploaded");
        Ok(PhotoView::new(record, url))
    }

    /// Every photo of `owner_id`, each with a fresh link. Order is unspecified.
    pub async fn list_photos(
        &self,
        owner_id: &str,
        url_ttl: Option<Duration>,
    ) -> AssetResult<Vec<PhotoView>> {
        require("owner id", owner_id)?;
        let mut records = self.metadata.query_by_owner(owner_id);
        let mut views = Vec::new();
        while let Some(record) = records.try_next().await? {
            let url = self.urls.issue(&record.asset_key, url_ttl);
            views.push(PhotoView::new(record, url));
        }
        debug!(owner_id = %owner_id, count = views.len(), "listed photos");
        Ok(views)
    }

    /// Apply a partial title/description edit.
    pub async fn edit_photo(
        &self,
        owner_id: &str,
        id: Uuid,
        edit: PhotoEdit,
    ) -> AssetResult<AssetRecord> {
        require("owner id", owner_id)?;
        if edit.is_empty() {
            return Err(AssetError::Validation(
                "either title or desc must be provided".into(),
            ));
        }

        let mut record = self
            .metadata
            .get_by_id(id, owner_id)
            .await?
            .ok_or_else(|| AssetError::NotFound(format!("photo `{id}`")))?;
        edit.apply(&mut record);
        self.metadata.replace(&record).await?;

        info!(owner_id = %owner_id, id = %id, "photo edited");
        Ok(record)
    }

    /// Remove a photo: metadata first, then the object.
    ///
    /// A record whose key differs from `asset_key` is refused. If the object
    /// cannot be removed once the record is gone, the photo is still reported
    /// deleted with `object_removed = false`.
    pub async fn delete_photo(
        &self,
        owner_id: &str,
        id: Uuid,
        asset_key: &str,
    ) -> AssetResult<DeleteOutcome> {
        require("owner id", owner_id)?;
        require("photo key", asset_key)?;

        let record = self
            .metadata
            .get_by_id(id, owner_id)
            .await?
            .ok_or_else(|| AssetError::NotFound(format!("photo `{id}`")))?;
        if record.asset_key != asset_key {
            return Err(AssetError::Validation(format!(
                "photo `{id}` is not stored under `{asset_key}`"
            )));
        }

        self.metadata.delete(id, owner_id).await?;

        let object_removed = match self.objects.delete(&record.asset_key).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    owner_id = %owner_id,
                    asset_key = %record.asset_key,
                    error = %err,
                    "orphaned object: record deleted but object removal failed"
                );
                false
            }
        };

        info!(owner_id = %owner_id, id = %id, object_removed, "photo deleted");
        Ok(DeleteOutcome { object_removed })
    }

    /// Re-mint the link of an existing photo, confirming the object is there.
    pub async fn access_url(
        &self,
        owner_id: &str,
        id: Uuid,
        url_ttl: Option<Duration>,
    ) -> AssetResult<PhotoView> {
        require("owner id", owner_id)?;
        let record = self
            .metadata
            .get_by_id(id, owner_id)
            .await?
            .ok_or_else(|| AssetError::NotFound(format!("photo `{id}`")))?;
        let url = self.urls.issue_checked(&record.asset_key, url_ttl).await?;
        Ok(PhotoView::new(record, url))
    }

    pub async fn create_owner(&self, email: &str, name: &str) -> AssetResult<Owner> {
        require("email", email)?;
        let owner = Owner {
            id: Uuid::new_v4().to_string(),
            email: email.trim().to_string(),
            name: name.trim().to_string(),
            profile_asset_key: None,
            banner_asset_key: None,
            created_at: Utc::now(),
        };
        let owner = self.metadata.create_owner(&owner).await?;
        info!(owner_id = %owner.id, "owner created");
        Ok(owner)
    }

    pub async fn get_owner(&self, owner_id: &str) -> AssetResult<Owner> {
        require("owner id", owner_id)?;
        self.metadata
            .get_owner(owner_id)
            .await?
            .ok_or_else(|| AssetError::NotFound(format!("owner `{owner_id}`")))
    }

    /// Point `slot` of `owner` at the object named by `image.file_name`,
    /// uploading it only if no object with that name exists yet.
    ///
    /// An unanswerable existence probe is propagated rather than guessed at.
    /// `owner` is only updated once the new slot value is persisted.
    pub async fn upsert_owner_image(
        &self,
        owner: &mut Owner,
        image: ImageFile,
        slot: ImageSlot,
    ) -> AssetResult<SlotUpload> {
        let mut updated = owner.clone();
        let upload = self.stage_owner_image(&mut updated, image, slot).await?;
        self.commit_owner(owner, updated, &[upload.key.as_str()]).await?;
        Ok(upload)
    }

    /// Update the profile and/or banner image of an owner.
    ///
    /// Every file is stored under a fresh name, so owners never share an
    /// object and re-sending a filename replaces the picture. All supplied
    /// images are normalized and stored before the owner is written once:
    /// either every requested slot changes or none does.
    pub async fn update_owner_images(
        &self,
        owner_id: &str,
        profile: Option<ImageFile>,
        banner: Option<ImageFile>,
    ) -> AssetResult<OwnerImagesView> {
        let mut uploads = Vec::new();
        for (slot, image) in [(ImageSlot::Profile, profile), (ImageSlot::Banner, banner)] {
            if let Some(mut image) = image {
                require("file name", &image.file_name)?;
                image.file_name = keys::unique_file_name(&image.file_name);
                uploads.push((slot, image));
            }
        }
        if uploads.is_empty() {
            return Err(AssetError::Validation("no files uploaded".into()));
        }
        let mut owner = self.get_owner(owner_id).await?;

        if uploads.len() == 1 {
            if let Some((slot, image)) = uploads.pop() {
                self.upsert_owner_image(&mut owner, image, slot).await?;
            }
            return Ok(self.owner_images(&owner));
        }

        let mut updated = owner.clone();
        let mut stored = Vec::with_capacity(uploads.len());
        for (slot, image) in uploads {
            match self.stage_owner_image(&mut updated, image, slot).await {
                Ok(upload) => stored.push(upload.key),
                Err(err) => {
                    if !stored.is_empty() {
                        warn!(
                            owner_id = %owner.id,
                            asset_keys = ?stored,
                            error = %err,
                            "orphaned objects: owner images left unchanged"
                        );
                    }
                    return Err(err);
                }
            }
        }
        let asset_keys: Vec<&str> = stored.iter().map(String::as_str).collect();
        self.commit_owner(&mut owner, updated, &asset_keys).await?;

        Ok(self.owner_images(&owner))
    }

    /// Store `image` unless its key already exists, sign it and set `slot`
    /// on `staged`. Nothing is persisted to the metadata store.
    async fn stage_owner_image(
        &self,
        staged: &mut Owner,
        image: ImageFile,
        slot: ImageSlot,
    ) -> AssetResult<SlotUpload> {
        require("file name", &image.file_name)?;
        let key = keys::sanitize_file_name(&self.stored_name(&image.file_name));

        if self.objects.exists(&key).await? {
            debug!(owner_id = %staged.id, asset_key = %key, %slot, "reusing existing object");
        } else {
            if image.data.is_empty() {
                return Err(AssetError::Validation("no file content uploaded".into()));
            }
            let normalized = self.normalizer.normalize(image.data).await?;
            let content_type = self
                .normalizer
                .output_content_type()
                .unwrap_or(image.content_type.as_str())
                .to_string();
            if let Err(err) = self
                .objects
                .put(&key, single_chunk(normalized), &content_type)
                .await
            {
                error!(owner_id = %staged.id, asset_key = %key, error = %err, "slot upload failed");
                return Err(AssetError::UploadFailed {
                    asset_key: key,
                    reason: err.to_string(),
                });
            }
        }

        let url = self.urls.issue(&key, None);
        staged.set_slot(slot, key.clone());
        Ok(SlotUpload {
            key,
            url: url.map(|signed| signed.url),
        })
    }

    /// Persist `updated`, then hand it to the caller's `owner`.
    async fn commit_owner(
        &self,
        owner: &mut Owner,
        updated: Owner,
        asset_keys: &[&str],
    ) -> AssetResult<()> {
        if let Err(err) = self.metadata.put_owner(&updated).await {
            error!(owner_id = %owner.id, asset_keys = ?asset_keys, error = %err, "owner images not persisted");
            return Err(AssetError::MetadataWrite {
                asset_key: asset_keys.join(", "),
                reason: err.to_string(),
            });
        }
        *owner = updated;
        info!(owner_id = %owner.id, asset_keys = ?asset_keys, "owner images updated");
        Ok(())
    }

    /// Name an object is stored under: the caller's name, with the extension
    /// swapped when the normalizer re-encodes.
    fn stored_name(&self, file_name: &str) -> String {
        match self.normalizer.output_extension() {
            Some(extension) => keys::replace_extension(file_name, extension),
            None => file_name.to_string(),
        }
    }

    /// Current slot keys of `owner` with fresh links.
    pub fn owner_images(&self, owner: &Owner) -> OwnerImagesView {
        let link = |slot| {
            owner
                .slot(slot)
                .and_then(|key| self.urls.issue(key, None))
                .map(|signed| signed.url)
        };
        OwnerImagesView {
            profile_key: owner.profile_asset_key.clone(),
            profile_url: link(ImageSlot::Profile),
            banner_key: owner.banner_asset_key.clone(),
            banner_url: link(ImageSlot::Banner),
            date_created: Utc::now(),
        }
    }
}

fn require(field: &str, value: &str) -> AssetResult<()> {
    if value.trim().is_empty() {
        return Err(AssetError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn single_chunk(data: Bytes) -> ByteStream {
    stream::once(async move { Ok(data) }).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ObjectStoreConfig,
        services::{
            local_object_store::LocalObjectStore,
            metadata_store::SqliteMetadataStore,
            signing::UrlSigner,
            testing::{
                JpegLabelNormalizer, MemoryObjectStore, PassthroughNormalizer,
                RejectingNormalizer, break_asset_inserts, break_owner_writes,
                memory_metadata_store,
            },
        },
    };
    use std::sync::atomic::Ordering;

    struct Harness {
        objects: Arc<MemoryObjectStore>,
        metadata: SqliteMetadataStore,
        assets: AssetCoordinator,
    }

    async fn harness() -> Harness {
        harness_with(Arc::new(PassthroughNormalizer)).await
    }

    async fn harness_with(normalizer: Arc<dyn Normalizer>) -> Harness {
        let objects = Arc::new(MemoryObjectStore::new());
        let metadata = memory_metadata_store().await;
        let assets = AssetCoordinator::new(
            objects.clone(),
            Arc::new(metadata.clone()),
            normalizer,
            Duration::minutes(60),
        );
        Harness {
            objects,
            metadata,
            assets,
        }
    }

    fn upload(owner_id: &str, file_name: &str, data: &'static [u8]) -> PhotoUpload {
        PhotoUpload {
            owner_id: owner_id.into(),
            file_name: file_name.into(),
            content_type: "image/jpeg".into(),
            data: Bytes::from_static(data),
            title: None,
            description: None,
            url_ttl: None,
        }
    }

    fn image(file_name: &str) -> ImageFile {
        ImageFile {
            file_name: file_name.into(),
            content_type: "image/jpeg".into(),
            data: Bytes::from_static(b"jpeg-bytes"),
        }
    }

    async fn record_count(h: &Harness, owner_id: &str) -> usize {
        h.assets.list_photos(owner_id, None).await.unwrap().len()
    }

    #[tokio::test]
    async fn upload_then_list_includes_record_with_live_url() {
        let h = harness().await;
        let view = h.assets.upload_photo(upload("u1", "beach day.jpg", b"img")).await.unwrap();
        assert!(view.asset_key.ends_with("_beach_day.jpg"));
        assert_eq!(view.title, "beach day.jpg");
        assert_eq!(view.description, DEFAULT_DESCRIPTION);

        let listed = h.assets.list_photos("u1", None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, view.id);
        assert_eq!(listed[0].asset_key, view.asset_key);
        assert!(listed[0].url.is_some());
        assert!(listed[0].url_expires_at.unwrap() > Utc::now());
        assert_eq!(h.objects.contents(&view.asset_key).unwrap(), Bytes::from_static(b"img"));
    }

    #[tokio::test]
    async fn upload_honours_caller_ttl_and_fields() {
        let h = harness().await;
        let mut req = upload("u1", "a.jpg", b"img");
        req.title = Some("Sunset".into());
        req.description = Some("Over the bay".into());
        req.url_ttl = Some(Duration::minutes(5));
        let view = h.assets.upload_photo(req).await.unwrap();
        assert_eq!(view.title, "Sunset");
        assert_eq!(view.description, "Over the bay");
        assert!(view.url_expires_at.unwrap() <= Utc::now() + Duration::minutes(5));
    }

    #[tokio::test]
    async fn empty_upload_is_rejected_before_any_store_call() {
        let h = harness().await;
        let err = h.assets.upload_photo(upload("u1", "empty.jpg", b"")).await.unwrap_err();
        assert!(matches!(err, AssetError::Validation(_)));
        assert_eq!(h.objects.put_count(), 0);
        assert_eq!(record_count(&h, "u1").await, 0);
    }

    #[tokio::test]
    async fn normalization_failure_writes_nothing() {
        let normalizer = Arc::new(RejectingNormalizer::default());
        let h = harness_with(normalizer.clone()).await;
        let err = h.assets.upload_photo(upload("u1", "x.jpg", b"img")).await.unwrap_err();
        assert_eq!(err.kind(), "NORMALIZATION_ERROR");
        assert_eq!(normalizer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.objects.put_count(), 0);
        assert_eq!(record_count(&h, "u1").await, 0);
    }

    #[tokio::test]
    async fn failed_put_creates_no_record() {
        let h = harness().await;
        h.objects.fail_puts.store(true, Ordering::SeqCst);
        let err = h.assets.upload_photo(upload("u1", "x.jpg", b"img")).await.unwrap_err();
        assert!(matches!(err, AssetError::UploadFailed { .. }));
        assert_eq!(record_count(&h, "u1").await, 0);
    }

    #[tokio::test]
    async fn metadata_fault_after_put_reports_observable_orphan() {
        let h = harness().await;
        break_asset_inserts(&h.metadata).await;

        let err = h.assets.upload_photo(upload("u1", "x.jpg", b"img")).await.unwrap_err();
        let AssetError::MetadataWrite { asset_key, .. } = &err else {
            panic!("expected MetadataWrite, got {err:?}");
        };
        assert_eq!(err.kind(), "METADATA_WRITE_ERROR");
        assert!(h.objects.exists(asset_key).await.unwrap());
        assert_eq!(record_count(&h, "u1").await, 0);
    }

    #[tokio::test]
    async fn signing_failure_degrades_to_missing_url() {
        let h = harness().await;
        h.objects.fail_signing.store(true, Ordering::SeqCst);
        let view = h.assets.upload_photo(upload("u1", "x.jpg", b"img")).await.unwrap();
        assert!(view.url.is_none());
        assert!(view.url_expires_at.is_none());
        assert_eq!(record_count(&h, "u1").await, 1);
    }

    #[tokio::test]
    async fn concurrent_uploads_of_same_name_do_not_collide() {
        let h = harness().await;
        let (a, b) = tokio::join!(
            h.assets.upload_photo(upload("u1", "same.jpg", b"one")),
            h.assets.upload_photo(upload("u1", "same.jpg", b"two")),
        );
        assert_ne!(a.unwrap().asset_key, b.unwrap().asset_key);
        assert_eq!(h.objects.len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_record_then_object() {
        let h = harness().await;
        let view = h.assets.upload_photo(upload("u1", "x.jpg", b"img")).await.unwrap();

        let outcome = h.assets.delete_photo("u1", view.id, &view.asset_key).await.unwrap();
        assert!(outcome.object_removed);
        assert!(h.metadata.get_by_id(view.id, "u1").await.unwrap().is_none());
        assert!(!h.objects.exists(&view.asset_key).await.unwrap());
    }

    #[tokio::test]
    async fn delete_with_failing_object_store_still_hides_record() {
        let h = harness().await;
        let view = h.assets.upload_photo(upload("u1", "x.jpg", b"img")).await.unwrap();
        h.objects.fail_deletes.store(true, Ordering::SeqCst);

        let outcome = h.assets.delete_photo("u1", view.id, &view.asset_key).await.unwrap();
        assert!(!outcome.object_removed);
        assert!(h.metadata.get_by_id(view.id, "u1").await.unwrap().is_none());
        assert!(h.objects.exists(&view.asset_key).await.unwrap());
    }

    #[tokio::test]
    async fn delete_refuses_mismatched_key_and_unknown_record() {
        let h = harness().await;
        let view = h.assets.upload_photo(upload("u1", "x.jpg", b"img")).await.unwrap();

        let err = h.assets.delete_photo("u1", view.id, "someone_else.jpg").await.unwrap_err();
        assert!(matches!(err, AssetError::Validation(_)));
        assert!(h.objects.exists(&view.asset_key).await.unwrap());

        let err = h.assets.delete_photo("u2", view.id, &view.asset_key).await.unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
        assert!(h.objects.exists(&view.asset_key).await.unwrap());
    }

    #[tokio::test]
    async fn edit_title_only_keeps_description_and_vice_versa() {
        let h = harness().await;
        let mut req = upload("u1", "x.jpg", b"img");
        req.description = Some("original desc".into());
        let view = h.assets.upload_photo(req).await.unwrap();

        let edited = h
            .assets
            .edit_photo("u1", view.id, PhotoEdit { title: Some("New title".into()), description: None })
            .await
            .unwrap();
        assert_eq!(edited.title, "New title");
        assert_eq!(edited.description, "original desc");

        let edited = h
            .assets
            .edit_photo("u1", view.id, PhotoEdit { title: None, description: Some("New desc".into()) })
            .await
            .unwrap();
        assert_eq!(edited.title, "New title");
        assert_eq!(edited.description, "New desc");

        let stored = h.metadata.get_by_id(view.id, "u1").await.unwrap().unwrap();
        assert_eq!(stored.asset_key, view.asset_key);
        assert_eq!(stored.description, "New desc");
    }

    #[tokio::test]
    async fn edit_with_both_blank_is_rejected_before_lookup() {
        let h = harness().await;
        let edit = PhotoEdit {
            title: Some(" ".into()),
            description: Some(String::new()),
        };
        // An unknown id would be NotFound if the store were consulted.
        let err = h.assets.edit_photo("u1", Uuid::new_v4(), edit).await.unwrap_err();
        assert!(matches!(err, AssetError::Validation(_)));
    }

    #[tokio::test]
    async fn edit_unknown_photo_is_not_found() {
        let h = harness().await;
        let edit = PhotoEdit {
            title: Some("t".into()),
            description: None,
        };
        let err = h.assets.edit_photo("u1", Uuid::new_v4(), edit).await.unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[tokio::test]
    async fn access_url_surfaces_missing_object() {
        let h = harness().await;
        let view = h.assets.upload_photo(upload("u1", "x.jpg", b"img")).await.unwrap();

        let fresh = h.assets.access_url("u1", view.id, Some(Duration::minutes(10))).await.unwrap();
        assert!(fresh.url.is_some());

        h.objects.delete(&view.asset_key).await.unwrap();
        let err = h.assets.access_url("u1", view.id, None).await.unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[tokio::test]
    async fn upsert_same_name_twice_puts_once_and_signs_both_times() {
        let h = harness().await;
        let mut owner = h.assets.create_owner("ada@example.com", "Ada").await.unwrap();

        let first = h
            .assets
            .upsert_owner_image(&mut owner, image("avatar.jpg"), ImageSlot::Profile)
            .await
            .unwrap();
        let second = h
            .assets
            .upsert_owner_image(&mut owner, image("avatar.jpg"), ImageSlot::Profile)
            .await
            .unwrap();

        assert_eq!(h.objects.put_count(), 1);
        assert_eq!(first.key, "avatar.jpg");
        assert_eq!(second.key, first.key);
        assert!(first.url.is_some());
        assert!(second.url.is_some());

        let stored = h.assets.get_owner(&owner.id).await.unwrap();
        assert_eq!(stored.profile_asset_key.as_deref(), Some("avatar.jpg"));
        assert!(stored.banner_asset_key.is_none());
    }

    #[tokio::test]
    async fn upsert_repoints_slot_without_bytes() {
        let h = harness().await;
        h.objects.insert("shared_banner.jpg", b"existing");
        let mut owner = h.assets.create_owner("bo@example.com", "Bo").await.unwrap();

        let mut file = image("shared banner.jpg");
        file.data = Bytes::new();
        let slot = h
            .assets
            .upsert_owner_image(&mut owner, file, ImageSlot::Banner)
            .await
            .unwrap();
        assert_eq!(slot.key, "shared_banner.jpg");
        assert_eq!(h.objects.put_count(), 0);
        assert_eq!(owner.banner_asset_key.as_deref(), Some("shared_banner.jpg"));
    }

    #[tokio::test]
    async fn upsert_propagates_unavailable_existence_probe() {
        let h = harness().await;
        let mut owner = h.assets.create_owner("cy@example.com", "Cy").await.unwrap();
        h.objects.fail_exists.store(true, Ordering::SeqCst);

        let err = h
            .assets
            .upsert_owner_image(&mut owner, image("avatar.jpg"), ImageSlot::Profile)
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::StorageUnavailable(_)));
        assert_eq!(h.objects.put_count(), 0);
        assert!(owner.profile_asset_key.is_none());
    }

    #[tokio::test]
    async fn upsert_owner_persist_failure_is_metadata_write() {
        let h = harness().await;
        let mut owner = h.assets.create_owner("di@example.com", "Di").await.unwrap();
        break_owner_writes(&h.metadata).await;

        let err = h
            .assets
            .upsert_owner_image(&mut owner, image("avatar.jpg"), ImageSlot::Profile)
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::MetadataWrite { .. }));
        assert!(owner.profile_asset_key.is_none());
        assert!(h.objects.exists("avatar.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_sanitizes_traversal_like_names() {
        let h = harness().await;
        let mut owner = h.assets.create_owner("ed@example.com", "Ed").await.unwrap();
        let slot = h
            .assets
            .upsert_owner_image(&mut owner, image("../../etc/passwd"), ImageSlot::Profile)
            .await
            .unwrap();
        assert_eq!(slot.key, keys::sanitize_file_name("../../etc/passwd"));
        assert!(!slot.key.contains('/'));
    }

    #[tokio::test]
    async fn update_owner_images_reports_both_slots() {
        let h = harness().await;
        let owner = h.assets.create_owner("fay@example.com", "Fay").await.unwrap();

        let view = h
            .assets
            .update_owner_images(&owner.id, Some(image("me.jpg")), None)
            .await
            .unwrap();
        let profile_key = view.profile_key.clone().unwrap();
        assert!(profile_key.ends_with("_me.jpg"));
        assert!(view.profile_url.is_some());
        assert!(view.banner_key.is_none());
        assert!(view.banner_url.is_none());

        let view = h
            .assets
            .update_owner_images(&owner.id, None, Some(image("wide.jpg")))
            .await
            .unwrap();
        assert_eq!(view.profile_key, Some(profile_key));
        assert!(view.profile_url.is_some());
        assert!(view.banner_key.unwrap().ends_with("_wide.jpg"));
    }

    #[tokio::test]
    async fn update_owner_images_requires_a_file_and_an_owner() {
        let h = harness().await;
        let err = h.assets.update_owner_images("nobody", None, None).await.unwrap_err();
        assert!(matches!(err, AssetError::Validation(_)));

        let err = h
            .assets
            .update_owner_images("nobody", Some(image("me.jpg")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    fn image_with(file_name: &str, data: &'static [u8]) -> ImageFile {
        ImageFile {
            data: Bytes::from_static(data),
            ..image(file_name)
        }
    }

    #[tokio::test]
    async fn owners_uploading_the_same_name_keep_their_own_bytes() {
        let h = harness().await;
        let a = h.assets.create_owner("a@example.com", "A").await.unwrap();
        let b = h.assets.create_owner("b@example.com", "B").await.unwrap();

        let view_a = h
            .assets
            .update_owner_images(&a.id, Some(image_with("avatar.jpg", b"owner-a-face")), None)
            .await
            .unwrap();
        let view_b = h
            .assets
            .update_owner_images(&b.id, Some(image_with("avatar.jpg", b"owner-b-face")), None)
            .await
            .unwrap();

        assert_eq!(h.objects.put_count(), 2);
        let key_a = view_a.profile_key.unwrap();
        let key_b = view_b.profile_key.unwrap();
        assert_ne!(key_a, key_b);
        assert_eq!(h.objects.contents(&key_a).unwrap(), Bytes::from_static(b"owner-a-face"));
        assert_eq!(h.objects.contents(&key_b).unwrap(), Bytes::from_static(b"owner-b-face"));
    }

    #[tokio::test]
    async fn resending_the_same_name_replaces_the_picture() {
        let h = harness().await;
        let owner = h.assets.create_owner("r@example.com", "R").await.unwrap();
        h.assets
            .update_owner_images(&owner.id, Some(image_with("avatar.jpg", b"old")), None)
            .await
            .unwrap();
        let view = h
            .assets
            .update_owner_images(&owner.id, Some(image_with("avatar.jpg", b"new")), None)
            .await
            .unwrap();
        let key = view.profile_key.unwrap();
        assert_eq!(h.objects.contents(&key).unwrap(), Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn failed_banner_put_leaves_both_slots_unchanged() {
        let h = harness().await;
        let owner = h.assets.create_owner("s@example.com", "S").await.unwrap();
        h.objects.put_budget.store(1, Ordering::SeqCst);

        let err = h
            .assets
            .update_owner_images(&owner.id, Some(image("me.jpg")), Some(image("wide.jpg")))
            .await
            .unwrap_err();
        assert!(matches!(err, AssetError::UploadFailed { .. }));

        let stored = h.assets.get_owner(&owner.id).await.unwrap();
        assert!(stored.profile_asset_key.is_none());
        assert!(stored.banner_asset_key.is_none());
        // The profile object was stored first and is left unreferenced.
        assert_eq!(h.objects.len(), 1);
    }

    #[tokio::test]
    async fn both_slots_are_written_together() {
        let h = harness().await;
        let owner = h.assets.create_owner("t@example.com", "T").await.unwrap();
        let view = h
            .assets
            .update_owner_images(&owner.id, Some(image("me.jpg")), Some(image("wide.jpg")))
            .await
            .unwrap();
        assert!(view.profile_url.is_some());
        assert!(view.banner_url.is_some());

        let stored = h.assets.get_owner(&owner.id).await.unwrap();
        assert_eq!(stored.profile_asset_key, view.profile_key);
        assert_eq!(stored.banner_asset_key, view.banner_key);
    }

    #[tokio::test]
    async fn reencoded_uploads_get_a_matching_extension() {
        let h = harness_with(Arc::new(JpegLabelNormalizer)).await;
        let view = h.assets.upload_photo(upload("u1", "photo.png", b"img")).await.unwrap();
        assert!(view.asset_key.ends_with("_photo.jpg"));
        assert_eq!(view.title, "photo.png");
        let head = h.objects.head(&view.asset_key).await.unwrap().unwrap();
        assert_eq!(head.content_type, "image/jpeg");

        let mut owner = h.assets.create_owner("u@example.com", "U").await.unwrap();
        let slot = h
            .assets
            .upsert_owner_image(&mut owner, image("banner.webp"), ImageSlot::Banner)
            .await
            .unwrap();
        assert_eq!(slot.key, "banner.jpg");
    }

    #[tokio::test]
    async fn long_non_ascii_names_upload_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = ObjectStoreConfig {
            root: dir.path().to_path_buf(),
            public_base_url: "http://localhost:3000".into(),
            signing_secret: "secret".into(),
        };
        let signer = Arc::new(UrlSigner::new(b"secret".to_vec(), "http://localhost:3000"));
        let objects = Arc::new(LocalObjectStore::new(&config, signer).await.unwrap());
        let metadata = memory_metadata_store().await;
        let assets = AssetCoordinator::new(
            objects.clone(),
            Arc::new(metadata),
            Arc::new(PassthroughNormalizer),
            Duration::minutes(60),
        );

        let name = format!("{}.jpg", "写真".repeat(13));
        let view = assets.upload_photo(upload("u1", &name, b"img")).await.unwrap();
        assert!(view.asset_key.len() <= keys::MAX_KEY_LEN);
        assert!(view.asset_key.ends_with(".jpg"));
        assert_eq!(view.title, name);
        assert!(objects.exists(&view.asset_key).await.unwrap());

        let owner = assets.create_owner("v@example.com", "V").await.unwrap();
        let long = format!("{}.jpg", "写真".repeat(40));
        let images = assets
            .update_owner_images(&owner.id, Some(image(&long)), None)
            .await
            .unwrap();
        let key = images.profile_key.unwrap();
        assert!(key.ends_with(".jpg"));
        assert!(objects.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_owner_email_is_conflict() {
        let h = harness().await;
        h.assets.create_owner("gus@example.com", "Gus").await.unwrap();
        let err = h.assets.create_owner("gus@example.com", "Gus").await.unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
    }
}
