//! Metadata store: photo records and owners, backed by SQLite.
//!
//! Rows are decoded into typed structs (`AssetRecord`, `Owner`) right here at
//! the store boundary; nothing untyped leaves this module.

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::MetadataStoreConfig,
    models::{asset::AssetRecord, owner::Owner},
};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("{0} already exists")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new record. `Conflict` only if the id is already taken.
    async fn create(&self, record: &AssetRecord) -> MetadataResult<AssetRecord>;

    /// Point lookup within the owner's partition. Absence is not an error.
    async fn get_by_id(&self, id: Uuid, owner_id: &str) -> MetadataResult<Option<AssetRecord>>;

    /// Overwrite the mutable fields of an existing record; `NotFound` if it is gone.
    async fn replace(&self, record: &AssetRecord) -> MetadataResult<()>;

    /// Lazily stream every record of `owner_id`. Each call runs a fresh query;
    /// callers must not rely on the order.
    fn query_by_owner<'a>(&'a self, owner_id: &'a str)
    -> BoxStream<'a, MetadataResult<AssetRecord>>;

    /// Remove a record. Removing a missing record is not an error.
    async fn delete(&self, id: Uuid, owner_id: &str) -> MetadataResult<()>;

    async fn create_owner(&self, owner: &Owner) -> MetadataResult<Owner>;

    async fn get_owner(&self, owner_id: &str) -> MetadataResult<Option<Owner>>;

    /// Insert or overwrite an owner.
    async fn put_owner(&self, owner: &Owner) -> MetadataResult<()>;
}

/// SQLite-backed [`MetadataStore`].
#[derive(Clone)]
pub struct SqliteMetadataStore {
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Open a pool for `config.database_url`.
    pub async fn connect(config: &MetadataStoreConfig) -> MetadataResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> MetadataResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} schema statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn create(&self, record: &AssetRecord) -> MetadataResult<AssetRecord> {
        sqlx::query_as::<_, AssetRecord>(
            "INSERT INTO assets (id, owner_id, asset_key, file_name, title, description, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             RETURNING id, owner_id, asset_key, file_name, title, description, created_at",
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(&record.asset_key)
        .bind(&record.file_name)
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.created_at)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                MetadataError::Conflict(format!("asset `{}`", record.id))
            } else {
                MetadataError::Sqlx(err)
            }
        })
    }

    async fn get_by_id(&self, id: Uuid, owner_id: &str) -> MetadataResult<Option<AssetRecord>> {
        let record = sqlx::query_as::<_, AssetRecord>(
            "SELECT id, owner_id, asset_key, file_name, title, description, created_at
             FROM assets WHERE id = ? AND owner_id = ?",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    async fn replace(&self, record: &AssetRecord) -> MetadataResult<()> {
        let result = sqlx::query(
            "UPDATE assets SET file_name = ?, title = ?, description = ?
             WHERE id = ? AND owner_id = ?",
        )
        .bind(&record.file_name)
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.id)
        .bind(&record.owner_id)
        .execute(&*self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("asset `{}`", record.id)));
        }
        Ok(())
    }

    fn query_by_owner<'a>(
        &'a self,
        owner_id: &'a str,
    ) -> BoxStream<'a, MetadataResult<AssetRecord>> {
        sqlx::query_as::<_, AssetRecord>(
            "SELECT id, owner_id, asset_key, file_name, title, description, created_at
             FROM assets WHERE owner_id = ?",
        )
        .bind(owner_id)
        .fetch(&*self.db)
        .map(|row| row.map_err(MetadataError::from))
        .boxed()
    }

    async fn delete(&self, id: Uuid, owner_id: &str) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM assets WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            debug!(id = %id, owner_id = %owner_id, "asset record already absent");
        }
        Ok(())
    }

    async fn create_owner(&self, owner: &Owner) -> MetadataResult<Owner> {
        match sqlx::query(
            "INSERT INTO owners (id, email, name, profile_asset_key, banner_asset_key, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&owner.id)
        .bind(&owner.email)
        .bind(&owner.name)
        .bind(&owner.profile_asset_key)
        .bind(&owner.banner_asset_key)
        .bind(owner.created_at)
        .execute(&*self.db)
        .await
        {
            Ok(_) => Ok(owner.clone()),
            Err(err) if is_unique_violation(&err) => {
                Err(MetadataError::Conflict(format!("owner `{}`", owner.email)))
            }
            Err(err) => Err(MetadataError::Sqlx(err)),
        }
    }

    async fn get_owner(&self, owner_id: &str) -> MetadataResult<Option<Owner>> {
        let owner = sqlx::query_as::<_, Owner>(
            "SELECT id, email, name, profile_asset_key, banner_asset_key, created_at
             FROM owners WHERE id = ?",
        )
        .bind(owner_id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(owner)
    }

    async fn put_owner(&self, owner: &Owner) -> MetadataResult<()> {
        sqlx::query(
            r#"
            INSERT INTO owners (id, email, name, profile_asset_key, banner_asset_key, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                profile_asset_key = excluded.profile_asset_key,
                banner_asset_key = excluded.banner_asset_key
            "#,
        )
        .bind(&owner.id)
        .bind(&owner.email)
        .bind(&owner.name)
        .bind(&owner.profile_asset_key)
        .bind(&owner.banner_asset_key)
        .bind(owner.created_at)
        .execute(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                MetadataError::Conflict(format!("owner `{}`", owner.email))
            } else {
                MetadataError::Sqlx(err)
            }
        })?;
        Ok(())
    }
}

/// Return true if the SQLx error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
