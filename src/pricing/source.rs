use crate::config::SourceConfig;
use crate::error::PricingError;
use crate::pricing::loader::{download_from_url, parse_checksum};
use crate::pricing::models::CatalogOrigin;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Where catalog documents and their checksums are fetched from
///
/// Implementations only move bytes. Verification, parsing and publishing
/// happen in the synchronizer so every source shares one pipeline.
#[async_trait]
pub trait CatalogSource: Send + Sync + 'static {
    /// Human-readable location, used in logs and status
    fn describe(&self) -> String;

    /// Origin recorded on catalogs built from this source
    fn origin(&self) -> CatalogOrigin;

    /// Published SHA-256 digest of the current document (lowercase hex)
    async fn fetch_checksum(&self) -> Result<String, PricingError>;

    /// Raw document bytes
    async fn fetch_document(&self) -> Result<Vec<u8>, PricingError>;

    /// Local files whose changes should trigger a refresh
    fn watch_paths(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

// ============================================================
// Built-in Source Implementations
// ============================================================

/// Price mirror reachable over HTTP(S)
pub struct HttpCatalogSource {
    client: reqwest::Client,
    pricing_url: String,
    hash_url: String,
}

impl HttpCatalogSource {
    pub fn new(pricing_url: String, hash_url: String, timeout: Duration) -> Result<Self, PricingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PricingError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            pricing_url,
            hash_url,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self, PricingError> {
        Self::new(
            config.pricing_url(),
            config.hash_url(),
            Duration::from_secs(config.request_timeout_seconds),
        )
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    fn describe(&self) -> String {
        self.pricing_url.clone()
    }

    fn origin(&self) -> CatalogOrigin {
        CatalogOrigin::Remote
    }

    async fn fetch_checksum(&self) -> Result<String, PricingError> {
        let content = download_from_url(&self.client, &self.hash_url).await?;
        parse_checksum(&String::from_utf8_lossy(&content))
    }

    async fn fetch_document(&self) -> Result<Vec<u8>, PricingError> {
        download_from_url(&self.client, &self.pricing_url).await
    }
}

/// Catalog kept in a local file next to a checksum file
pub struct FileCatalogSource {
    path: PathBuf,
    hash_path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: PathBuf, hash_path: PathBuf) -> Self {
        Self { path, hash_path }
    }

    async fn read(path: &Path) -> Result<Vec<u8>, PricingError> {
        tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PricingError::SourceUnavailable {
                    url: path.display().to_string(),
                    message: "file not found".to_string(),
                    status: None,
                }
            } else {
                PricingError::Io(e)
            }
        })
    }
}

#[async_trait]
impl CatalogSource for FileCatalogSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn origin(&self) -> CatalogOrigin {
        CatalogOrigin::LocalFile
    }

    async fn fetch_checksum(&self) -> Result<String, PricingError> {
        let content = Self::read(&self.hash_path).await?;
        parse_checksum(&String::from_utf8_lossy(&content))
    }

    async fn fetch_document(&self) -> Result<Vec<u8>, PricingError> {
        Self::read(&self.path).await
    }

    fn watch_paths(&self) -> Vec<PathBuf> {
        vec![self.path.clone(), self.hash_path.clone()]
    }
}

/// Build the source selected by the config: a local file if `local_path` is set, HTTP otherwise
pub fn source_from_config(config: &SourceConfig) -> Result<Arc<dyn CatalogSource>, PricingError> {
    match (&config.local_path, config.local_hash_path()) {
        (Some(path), Some(hash_path)) => {
            Ok(Arc::new(FileCatalogSource::new(path.clone(), hash_path)))
        }
        _ => Ok(Arc::new(HttpCatalogSource::from_config(config)?)),
    }
}
