use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Repository used when neither the config nor the environment names one
pub const DEFAULT_MIRROR_REPOSITORY: &str = "lingozhi/claude-relay-service";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PricingConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the catalog document and its checksum come from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// GitHub-style `owner/name` of the price mirror
    #[serde(default)]
    pub repository: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_pricing_filename")]
    pub pricing_filename: String,

    #[serde(default = "default_hash_filename")]
    pub hash_filename: String,

    /// Replaces the raw.githubusercontent.com base derived from repository/branch
    #[serde(default)]
    pub base_url: Option<String>,

    /// Full override of the document URL
    #[serde(default)]
    pub pricing_url: Option<String>,

    /// Full override of the checksum URL
    #[serde(default)]
    pub hash_url: Option<String>,

    /// Read the catalog from a local file instead of HTTP
    #[serde(default)]
    pub local_path: Option<PathBuf>,

    /// Checksum file for `local_path` (default: `<local_path>.sha256`)
    #[serde(default)]
    pub local_hash_path: Option<PathBuf>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            repository: None,
            branch: default_branch(),
            pricing_filename: default_pricing_filename(),
            hash_filename: default_hash_filename(),
            base_url: None,
            pricing_url: None,
            hash_url: None,
            local_path: None,
            local_hash_path: None,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl SourceConfig {
    pub fn repository(&self) -> &str {
        self.repository
            .as_deref()
            .unwrap_or(DEFAULT_MIRROR_REPOSITORY)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "https://raw.githubusercontent.com/{}/{}",
                self.repository(),
                self.branch
            ),
        }
    }

    pub fn pricing_url(&self) -> String {
        self.pricing_url
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.base_url(), self.pricing_filename))
    }

    pub fn hash_url(&self) -> String {
        self.hash_url
            .clone()
            .unwrap_or_else(|| format!("{}/{}", self.base_url(), self.hash_filename))
    }

    /// Checksum path for the local source, if one is configured
    pub fn local_hash_path(&self) -> Option<PathBuf> {
        let path = self.local_path.as_ref()?;
        Some(self.local_hash_path.clone().unwrap_or_else(|| {
            let mut name = path.as_os_str().to_owned();
            name.push(".sha256");
            PathBuf::from(name)
        }))
    }

    /// Apply the price mirror's `PRICE_MIRROR_*` variables on top of the loaded config
    ///
    /// `PRICE_MIRROR_REPO` beats the configured repository, which beats
    /// `GITHUB_REPOSITORY` (set automatically inside GitHub Actions).
    pub fn apply_mirror_env(&mut self, env: MirrorEnv, github_repository: Option<String>) {
        // Empty variables count as unset
        if let Some(repo) = non_empty(env.repo) {
            self.repository = Some(repo);
        } else if self.repository.is_none() {
            self.repository = non_empty(github_repository);
        }
        if let Some(branch) = non_empty(env.branch) {
            self.branch = branch;
        }
        if let Some(filename) = non_empty(env.filename) {
            self.pricing_filename = filename;
        }
        if let Some(hash_filename) = non_empty(env.hash_filename) {
            self.hash_filename = hash_filename;
        }
        if let Some(base_url) = non_empty(env.base_url) {
            self.base_url = Some(base_url);
        }
        if let Some(json_url) = non_empty(env.json_url) {
            self.pricing_url = Some(json_url);
        }
        if let Some(hash_url) = non_empty(env.hash_url) {
            self.hash_url = Some(hash_url);
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `PRICE_MIRROR_*` environment variables, as read by the `config` crate
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MirrorEnv {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub filename: Option<String>,
    pub hash_filename: Option<String>,
    pub base_url: Option<String>,
    pub json_url: Option<String>,
    pub hash_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Periodic refresh interval (default: 600 = 10 minutes)
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,

    /// React to changes of a local catalog source
    #[serde(default = "default_watch_local_source")]
    pub watch_local_source: bool,

    /// Quiet period before a burst of file events triggers a refresh
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval(),
            watch_local_source: default_watch_local_source(),
            watch_debounce_ms: default_watch_debounce_ms(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Total attempts per refresh, including the first (default: 4)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Ceiling for a single backoff delay (default: 30000)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Local cache of the last verified document
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_cache_pricing_file")]
    pub pricing_file: String,

    #[serde(default = "default_cache_hash_file")]
    pub hash_file: String,

    /// Bundled snapshot used when neither the cache nor the network is available
    #[serde(default)]
    pub fallback_file: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pricing_file: default_cache_pricing_file(),
            hash_file: default_cache_hash_file(),
            fallback_file: None,
        }
    }
}

impl CacheConfig {
    pub fn pricing_path(&self) -> PathBuf {
        self.data_dir.join(&self.pricing_file)
    }

    pub fn hash_path(&self) -> PathBuf {
        self.data_dir.join(&self.hash_file)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_branch() -> String {
    "price-mirror".to_string()
}

fn default_pricing_filename() -> String {
    "model_prices_and_context_window.json".to_string()
}

fn default_hash_filename() -> String {
    "model_prices_and_context_window.sha256".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_refresh_interval() -> u64 {
    600
}

fn default_watch_local_source() -> bool {
    true
}

fn default_watch_debounce_ms() -> u64 {
    500
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_cache_pricing_file() -> String {
    "model_pricing.json".to_string()
}

fn default_cache_hash_file() -> String {
    "model_pricing.sha256".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from `pricing.{toml,yaml,json}` and the environment
pub fn load_config() -> anyhow::Result<PricingConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name("pricing").required(false))
        .add_source(
            config::Environment::with_prefix("GATEWAY_PRICING")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut cfg: PricingConfig = config.try_deserialize()?;

    let mirror_env: MirrorEnv = config::Config::builder()
        .add_source(config::Environment::with_prefix("PRICE_MIRROR").ignore_empty(true))
        .build()?
        .try_deserialize()?;
    cfg.source
        .apply_mirror_env(mirror_env, std::env::var("GITHUB_REPOSITORY").ok());

    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &PricingConfig) -> anyhow::Result<()> {
    if cfg.sync.refresh_interval_seconds == 0 {
        anyhow::bail!("sync.refresh_interval_seconds must be > 0");
    }

    let retry = &cfg.sync.retry;
    if retry.max_attempts == 0 {
        anyhow::bail!("sync.retry.max_attempts must be >= 1");
    }
    if retry.initial_backoff_ms > retry.max_backoff_ms {
        anyhow::bail!(
            "sync.retry.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
            retry.initial_backoff_ms,
            retry.max_backoff_ms
        );
    }

    if cfg.source.request_timeout_seconds == 0 {
        anyhow::bail!("source.request_timeout_seconds must be > 0");
    }

    if cfg.source.local_path.is_none() {
        if cfg.source.pricing_filename.is_empty() || cfg.source.hash_filename.is_empty() {
            anyhow::bail!("source file names cannot be empty");
        }
        for (name, value) in [
            ("pricing_url", cfg.source.pricing_url()),
            ("hash_url", cfg.source.hash_url()),
        ] {
            url::Url::parse(&value)
                .map_err(|e| anyhow::anyhow!("source.{} '{}' is invalid: {}", name, value, e))?;
        }
    }

    if cfg.cache.pricing_file.is_empty() || cfg.cache.hash_file.is_empty() {
        anyhow::bail!("cache file names cannot be empty");
    }

    Ok(())
}
