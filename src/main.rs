use anyhow::{Context, Result};
use axum::Router;
use chrono::Duration;
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::{fs, net::TcpListener};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    asset_coordinator::AssetCoordinator, local_object_store::LocalObjectStore,
    metadata_store::SqliteMetadataStore, normalizer::ImageNormalizer, signing::UrlSigner,
};
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    dotenvy::dotenv().ok();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;
    tracing::info!("Starting photo-vault with config: {:?}", cfg);

    // --- Ensure the SQLite parent directory exists ---
    let db_path = cfg
        .metadata_store
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if !db_path.is_empty() && db_path != ":memory:" {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    // --- Metadata store ---
    let metadata = SqliteMetadataStore::connect(&cfg.metadata_store)
        .await
        .context("connecting to metadata database")?;

    if migrate {
        metadata.migrate().await?;
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }
    // The schema is idempotent, so a fresh database is usable without --migrate.
    metadata.migrate().await?;
    let db = metadata.db.clone();

    // --- Object store ---
    let signer = Arc::new(UrlSigner::new(
        cfg.object_store.signing_secret.as_bytes().to_vec(),
        cfg.object_store.public_base_url.clone(),
    ));
    let objects = LocalObjectStore::new(&cfg.object_store, signer.clone())
        .await
        .with_context(|| format!("preparing storage at {}", cfg.object_store.root.display()))?;
    let storage_root = objects.root().to_path_buf();
    tracing::info!("Object store rooted at {}", storage_root.display());
    let objects = Arc::new(objects);

    // --- Coordinator ---
    let default_ttl = Duration::try_minutes(cfg.url_ttl_minutes)
        .context("url ttl out of range")?;
    let assets = AssetCoordinator::new(
        objects.clone(),
        Arc::new(metadata),
        Arc::new(ImageNormalizer::new(cfg.normalizer.clone())),
        default_ttl,
    );

    let state = AppState {
        assets,
        objects,
        signer,
        db,
        storage_root,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
