use crate::config::{CacheConfig, SyncConfig};
use crate::error::PricingError;
use crate::metrics;
use crate::pricing::loader::{calculate_hash, load_cache, parse_catalog, save_cache, verify_checksum};
use crate::pricing::models::{CatalogOrigin, RateCatalog};
use crate::pricing::source::CatalogSource;
use crate::retry::{retry_with_backoff, RetryPolicy};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Lifecycle of the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Uninitialized,
    Loading,
    /// A catalog is published
    Ready,
    /// No catalog could be loaded; every model prices at zero
    Degraded,
    /// A refresh is running; readers keep the old snapshot
    Refreshing,
    Stopped,
}

/// Result of one refresh pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was published
    Updated { models: usize, checksum: String },
    /// The source checksum matches the published snapshot
    Unchanged,
    /// The synchronizer was stopped before the result could be published
    Discarded,
}

impl RefreshOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Updated { .. } => "updated",
            Self::Unchanged => "unchanged",
            Self::Discarded => "discarded",
        }
    }
}

/// Point-in-time view of the synchronizer and its current snapshot
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStatus {
    pub state: SyncState,
    pub source: String,
    pub model_count: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub checksum: Option<String>,
    pub origin: CatalogOrigin,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_refresh_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct SyncStatus {
    state: SyncState,
    /// Set once by `stop`; `publish` checks it under this lock
    stopped: bool,
    last_error: Option<String>,
    last_attempt_at: Option<DateTime<Utc>>,
    next_refresh_at: Option<DateTime<Utc>>,
}

/// Keeps the published [`RateCatalog`] in step with a [`CatalogSource`]
///
/// Every refresh (timer, file change, forced) goes through the same pipeline:
/// fetch checksum, short-circuit if unchanged, fetch document, verify, parse,
/// publish, persist. Readers only ever touch the `ArcSwap`; the refresh lock
/// is private to this type.
pub struct CatalogSynchronizer {
    catalog: Arc<ArcSwap<RateCatalog>>,
    source: Arc<dyn CatalogSource>,
    cache: CacheConfig,
    sync: SyncConfig,
    policy: RetryPolicy,
    refresh_lock: tokio::sync::Mutex<()>,
    status: Mutex<SyncStatus>,
    shutdown_tx: watch::Sender<bool>,
    trigger_tx: mpsc::UnboundedSender<()>,
    trigger_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl CatalogSynchronizer {
    pub fn new(
        catalog: Arc<ArcSwap<RateCatalog>>,
        source: Arc<dyn CatalogSource>,
        cache: CacheConfig,
        sync: SyncConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let policy = RetryPolicy::from(&sync.retry);

        Self {
            catalog,
            source,
            cache,
            sync,
            policy,
            refresh_lock: tokio::sync::Mutex::new(()),
            status: Mutex::new(SyncStatus {
                state: SyncState::Uninitialized,
                stopped: false,
                last_error: None,
                last_attempt_at: None,
                next_refresh_at: None,
            }),
            shutdown_tx,
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
            task: Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    /// Load an initial catalog, then spawn the background refresh loop
    ///
    /// The initial load prefers the verified local cache. Without one, the
    /// source is tried once and the bundled fallback file after that. None of
    /// these failing is an error: the synchronizer starts `Degraded`.
    pub async fn start(self: &Arc<Self>) -> Result<(), PricingError> {
        if self.is_stopped() {
            return Err(PricingError::Stopped);
        }
        let Some(trigger_rx) = lock(&self.trigger_rx).take() else {
            warn!("Catalog synchronizer already started");
            return Ok(());
        };

        info!(
            source = %self.source.describe(),
            interval_seconds = self.sync.refresh_interval_seconds,
            "Starting catalog synchronizer"
        );
        self.set_state(SyncState::Loading);

        let loaded_from_source = self.initial_load().await;
        self.settle_state();

        if self.sync.watch_local_source {
            self.start_watcher();
        }

        let period = self.refresh_period();
        let first = if loaded_from_source {
            Instant::now() + period
        } else {
            Instant::now()
        };
        self.set_next_refresh(first);

        let synchronizer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            synchronizer.run(trigger_rx, first).await;
        });
        *lock(&self.task) = Some(handle);

        Ok(())
    }

    /// Cancel the loop, any pending retry and the file watch
    ///
    /// An in-flight fetch may still finish; its result is discarded.
    pub async fn stop(&self) {
        lock(&self.status).stopped = true;
        self.shutdown_tx.send_replace(true);
        lock(&self.watcher).take();

        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Catalog refresh task ended abnormally: {}", e);
                }
            }
        }

        {
            let mut status = lock(&self.status);
            status.state = SyncState::Stopped;
            status.next_refresh_at = None;
        }
        info!("Catalog synchronizer stopped");
    }

    /// Ask the background loop for a refresh (same path as a file change)
    pub fn trigger_refresh(&self) {
        if self.trigger_tx.send(()).is_err() {
            debug!("Refresh trigger dropped, loop not running");
        }
    }

    /// Run the pipeline once, without retries
    pub async fn refresh_once(&self) -> Result<RefreshOutcome, PricingError> {
        let _guard = self.refresh_lock.lock().await;
        if self.is_stopped() {
            return Ok(RefreshOutcome::Discarded);
        }

        self.begin_refresh();
        let result = self.pipeline().await;
        self.finish_refresh(&result);
        result
    }

    /// Run the pipeline, retrying transient failures with capped backoff
    ///
    /// The refresh lock is held across retries so triggers arriving meanwhile
    /// queue behind this run.
    pub async fn refresh_with_retry(&self) -> Result<RefreshOutcome, PricingError> {
        let _guard = self.refresh_lock.lock().await;
        if self.is_stopped() {
            return Ok(RefreshOutcome::Discarded);
        }

        self.begin_refresh();
        let mut shutdown = self.shutdown_tx.subscribe();
        let result = match retry_with_backoff(&self.policy, &mut shutdown, |_| self.pipeline()).await
        {
            Err(PricingError::Stopped) => Ok(RefreshOutcome::Discarded),
            other => other,
        };
        self.finish_refresh(&result);
        result
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<RateCatalog> {
        self.catalog.load_full()
    }

    pub fn state(&self) -> SyncState {
        lock(&self.status).state
    }

    pub fn status(&self) -> CatalogStatus {
        let catalog = self.catalog.load();
        let status = lock(&self.status);
        let loaded = !catalog.is_empty();

        CatalogStatus {
            state: status.state,
            source: self.source.describe(),
            model_count: catalog.len(),
            loaded_at: loaded.then(|| catalog.loaded_at()),
            checksum: loaded.then(|| catalog.checksum().to_string()),
            origin: catalog.origin(),
            last_error: status.last_error.clone(),
            last_attempt_at: status.last_attempt_at,
            next_refresh_at: status.next_refresh_at,
        }
    }

    fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    // ============================================================
    // Pipeline
    // ============================================================

    async fn pipeline(&self) -> Result<RefreshOutcome, PricingError> {
        let expected = self.source.fetch_checksum().await?;

        {
            let current = self.catalog.load();
            if !current.is_empty() && current.checksum() == expected {
                debug!(checksum = %expected, "Catalog checksum unchanged, skipping download");
                return Ok(RefreshOutcome::Unchanged);
            }
        }

        let content = self.source.fetch_document().await?;
        let checksum = verify_checksum(&content, &expected)?;
        let parsed = parse_catalog(&content)?;

        let catalog = RateCatalog::new(parsed.cards, checksum.clone(), self.source.origin());
        let models = catalog.len();
        if !self.publish(catalog) {
            info!("Synchronizer stopped during refresh, discarding fetched catalog");
            return Ok(RefreshOutcome::Discarded);
        }
        self.persist(&content, &checksum).await;

        Ok(RefreshOutcome::Updated { models, checksum })
    }

    /// Swap in `catalog` unless the synchronizer has been stopped
    fn publish(&self, catalog: RateCatalog) -> bool {
        let models = catalog.len();
        let origin = catalog.origin();
        let checksum = catalog.checksum().to_string();

        {
            let status = lock(&self.status);
            if status.stopped {
                return false;
            }
            self.catalog.store(Arc::new(catalog));
        }
        metrics::set_catalog_models(models);

        info!(
            models,
            origin = %origin,
            checksum = %checksum,
            "Published pricing catalog"
        );
        true
    }

    async fn persist(&self, content: &[u8], checksum: &str) {
        let pricing_path = self.cache.pricing_path();
        if self.source.watch_paths().iter().any(|p| p == &pricing_path) {
            return;
        }

        if let Err(e) = save_cache(content, checksum, &pricing_path, &self.cache.hash_path()).await
        {
            warn!("Failed to write pricing cache {}: {}", pricing_path.display(), e);
        }
    }

    // ============================================================
    // Initial load
    // ============================================================

    /// Returns true when the published catalog came straight from the source
    async fn initial_load(&self) -> bool {
        if self.load_cached().await {
            return false;
        }

        if let Ok(RefreshOutcome::Updated { .. }) = self.refresh_once().await {
            return true;
        }

        self.load_fallback().await;
        false
    }

    async fn load_cached(&self) -> bool {
        let pricing_path = self.cache.pricing_path();
        let cached = match load_cache(&pricing_path, &self.cache.hash_path()).await {
            Ok(Some(cached)) => cached,
            Ok(None) => {
                debug!("No pricing cache at {}", pricing_path.display());
                return false;
            }
            Err(e) => {
                warn!("Ignoring pricing cache {}: {}", pricing_path.display(), e);
                return false;
            }
        };

        let (content, checksum) = cached;
        match parse_catalog(&content) {
            Ok(parsed) => {
                self.publish(RateCatalog::new(parsed.cards, checksum, CatalogOrigin::Cache))
            }
            Err(e) => {
                warn!("Ignoring pricing cache {}: {}", pricing_path.display(), e);
                false
            }
        }
    }

    async fn load_fallback(&self) -> bool {
        let Some(path) = self.cache.fallback_file.as_deref() else {
            return false;
        };

        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read fallback pricing file {}: {}", path.display(), e);
                return false;
            }
        };

        let checksum = calculate_hash(&content);
        match parse_catalog(&content) {
            Ok(parsed) => {
                warn!(
                    "Using bundled fallback pricing from {}, prices may be outdated",
                    path.display()
                );
                self.publish(RateCatalog::new(parsed.cards, checksum, CatalogOrigin::Fallback))
            }
            Err(e) => {
                warn!("Fallback pricing file {} is unusable: {}", path.display(), e);
                false
            }
        }
    }

    // ============================================================
    // Background loop
    // ============================================================

    fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.sync.refresh_interval_seconds.max(1))
    }

    async fn run(self: Arc<Self>, mut trigger_rx: mpsc::UnboundedReceiver<()>, first: Instant) {
        let period = self.refresh_period();
        let debounce = Duration::from_millis(self.sync.watch_debounce_ms);
        let mut shutdown = self.shutdown_tx.subscribe();

        let mut timer = tokio::time::interval_at(first, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let source_changed = tokio::select! {
                _ = shutdown.wait_for(|stopped| *stopped) => break,
                _ = timer.tick() => false,
                Some(()) = trigger_rx.recv() => true,
            };

            if source_changed {
                tokio::select! {
                    _ = tokio::time::sleep(debounce) => {}
                    _ = shutdown.wait_for(|stopped| *stopped) => break,
                }
                while trigger_rx.try_recv().is_ok() {}
                info!(source = %self.source.describe(), "Catalog source changed, refreshing");
            } else {
                debug!("Scheduled catalog refresh");
            }

            // Outcome and errors are recorded in status and logs
            let _ = self.refresh_with_retry().await;

            if self.is_stopped() {
                break;
            }
            let next = Instant::now() + period;
            timer.reset_at(next);
            self.set_next_refresh(next);
        }

        debug!("Catalog refresh loop exited");
    }

    fn start_watcher(&self) {
        let paths = self.source.watch_paths();
        if paths.is_empty() {
            return;
        }

        match build_watcher(&paths, self.trigger_tx.clone()) {
            Ok(watcher) => {
                info!(paths = ?paths, "Watching local pricing source");
                *lock(&self.watcher) = Some(watcher);
            }
            Err(e) => warn!(
                "Failed to watch local pricing source, relying on timer only: {}",
                e
            ),
        }
    }

    // ============================================================
    // Status bookkeeping
    // ============================================================

    fn set_state(&self, state: SyncState) {
        lock(&self.status).state = state;
    }

    fn settle_state(&self) {
        let ready = !self.catalog.load().is_empty();
        let mut status = lock(&self.status);
        if status.state != SyncState::Stopped {
            status.state = if ready {
                SyncState::Ready
            } else {
                SyncState::Degraded
            };
        }
    }

    fn set_next_refresh(&self, at: Instant) {
        let remaining = at.saturating_duration_since(Instant::now());
        let next = chrono::Duration::from_std(remaining)
            .ok()
            .map(|d| Utc::now() + d);
        lock(&self.status).next_refresh_at = next;
    }

    fn begin_refresh(&self) {
        let mut status = lock(&self.status);
        status.last_attempt_at = Some(Utc::now());
        if status.state == SyncState::Ready {
            status.state = SyncState::Refreshing;
        }
    }

    fn finish_refresh(&self, result: &Result<RefreshOutcome, PricingError>) {
        match result {
            Ok(outcome) => {
                metrics::record_refresh(outcome.label());
                let mut status = lock(&self.status);
                if !matches!(outcome, RefreshOutcome::Discarded) {
                    status.last_error = None;
                }
            }
            Err(e) => {
                metrics::record_refresh(e.kind());
                match e {
                    PricingError::IntegrityMismatch { expected, actual } => warn!(
                        source = %self.source.describe(),
                        expected = %expected,
                        actual = %actual,
                        "Rejected catalog with mismatching checksum, keeping current snapshot"
                    ),
                    _ => error!(
                        source = %self.source.describe(),
                        "Catalog refresh failed, keeping current snapshot: {}", e
                    ),
                }
                lock(&self.status).last_error = Some(e.to_string());
            }
        }

        if self.is_stopped() {
            self.set_state(SyncState::Stopped);
        } else {
            self.settle_state();
        }
    }
}

/// Poisoning only means another thread panicked mid-update of plain status data
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn build_watcher(
    paths: &[PathBuf],
    trigger_tx: mpsc::UnboundedSender<()>,
) -> Result<RecommendedWatcher, notify::Error> {
    let names: HashSet<OsString> = paths
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
        .collect();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if is_relevant(&event, &names) {
                let _ = trigger_tx.send(());
            }
        }
        Err(e) => warn!("Pricing source watcher error: {}", e),
    })?;

    let dirs: HashSet<&Path> = paths.iter().map(|p| watch_dir(p)).collect();
    for dir in dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }

    Ok(watcher)
}

/// Directory to register for a file; editors replace files, so the parent is watched
fn watch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn is_relevant(event: &Event, names: &HashSet<OsString>) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name().map_or(false, |n| names.contains(n)))
}
