use anyhow::{Context, Result};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};
use tracing::warn;
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments, then hands each client
/// its own explicit slice; no client reads the environment itself.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub object_store: ObjectStoreConfig,
    pub metadata_store: MetadataStoreConfig,
    pub normalizer: NormalizerConfig,
    /// Lifetime of access links when the caller does not ask for another.
    pub url_ttl_minutes: i64,
}

/// Where binaries live and how their read links are signed.
#[derive(Clone)]
pub struct ObjectStoreConfig {
    pub root: PathBuf,
    pub public_base_url: String,
    pub signing_secret: String,
}

impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("root", &self.root)
            .field("public_base_url", &self.public_base_url)
            .field("signing_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MetadataStoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub jpeg_quality: u8,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Photo upload and access service")]
pub struct Args {
    /// Host to bind to (overrides PHOTO_VAULT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PHOTO_VAULT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where photo binaries are stored (overrides PHOTO_VAULT_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PHOTO_VAULT_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Base URL that signed links point at (overrides PHOTO_VAULT_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Default access link lifetime in minutes (overrides PHOTO_VAULT_URL_TTL_MINUTES)
    #[arg(long)]
    pub url_ttl_minutes: Option<i64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("PHOTO_VAULT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("PHOTO_VAULT_PORT", 3000u16)?;
        let env_storage =
            env::var("PHOTO_VAULT_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("PHOTO_VAULT_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/photo_vault.db?mode=rwc".into());
        let env_ttl = env_parse("PHOTO_VAULT_URL_TTL_MINUTES", 60i64)?;

        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let public_base_url = match args.public_url.or_else(|| env::var("PHOTO_VAULT_PUBLIC_URL").ok()) {
            Some(url) => url,
            None => format!("http://localhost:{port}"),
        };
        let signing_secret = match env::var("PHOTO_VAULT_SIGNING_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("PHOTO_VAULT_SIGNING_SECRET not set; signed links will not survive a restart");
                Uuid::new_v4().simple().to_string()
            }
        };

        let url_ttl_minutes = args.url_ttl_minutes.unwrap_or(env_ttl);
        if url_ttl_minutes <= 0 {
            anyhow::bail!("url ttl must be positive, got {url_ttl_minutes} minutes");
        }

        let cfg = Self {
            host,
            port,
            object_store: ObjectStoreConfig {
                root: PathBuf::from(args.storage_dir.unwrap_or(env_storage)),
                public_base_url,
                signing_secret,
            },
            metadata_store: MetadataStoreConfig {
                database_url: args.database_url.unwrap_or(env_db),
                max_connections: env_parse("PHOTO_VAULT_DB_MAX_CONNECTIONS", 5u32)?,
            },
            normalizer: NormalizerConfig {
                max_width: env_parse("PHOTO_VAULT_MAX_WIDTH", 2560u32)?,
                max_height: env_parse("PHOTO_VAULT_MAX_HEIGHT", 1440u32)?,
                jpeg_quality: env_parse("PHOTO_VAULT_JPEG_QUALITY", 95u8)?,
            },
            url_ttl_minutes,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an optional environment variable, falling back to `default`.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
