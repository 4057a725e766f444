//! Shared state handed to every handler.

use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

use crate::services::{
    asset_coordinator::AssetCoordinator, object_store::ObjectStore, signing::UrlSigner,
};

#[derive(Clone)]
pub struct AppState {
    pub assets: AssetCoordinator,
    pub objects: Arc<dyn ObjectStore>,
    pub signer: Arc<UrlSigner>,
    /// Pool behind the metadata store, used by readiness checks.
    pub db: Arc<SqlitePool>,
    /// Root directory of the object store, used by readiness checks.
    pub storage_root: PathBuf,
}
