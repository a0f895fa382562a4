use crate::config::PricingConfig;
use crate::error::PricingError;
use crate::metrics;
use crate::pricing::calculator;
use crate::pricing::models::{CostBreakdown, RateCatalog, UsageRecord};
use crate::pricing::source::{source_from_config, CatalogSource};
use crate::pricing::updater::{CatalogStatus, CatalogSynchronizer, RefreshOutcome};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point used by the billing path and admin reporting
///
/// Owns one catalog snapshot and the synchronizer that keeps it current.
/// Independent instances never share state.
pub struct PricingService {
    catalog: Arc<ArcSwap<RateCatalog>>,
    synchronizer: Arc<CatalogSynchronizer>,
}

impl PricingService {
    /// Create a service backed by the source selected in `config`
    pub fn new(config: &PricingConfig) -> Result<Self, PricingError> {
        let source = source_from_config(&config.source)?;
        Ok(Self::with_source(config, source))
    }

    /// Create a service backed by a custom source
    pub fn with_source(config: &PricingConfig, source: Arc<dyn CatalogSource>) -> Self {
        let catalog = Arc::new(ArcSwap::from_pointee(RateCatalog::empty()));
        let synchronizer = Arc::new(CatalogSynchronizer::new(
            Arc::clone(&catalog),
            source,
            config.cache.clone(),
            config.sync.clone(),
        ));

        Self {
            catalog,
            synchronizer,
        }
    }

    /// Load the initial catalog and start background refreshing
    pub async fn start(&self) -> Result<(), PricingError> {
        metrics::init_metric_descriptions();
        self.synchronizer.start().await
    }

    pub async fn stop(&self) {
        self.synchronizer.stop().await;
    }

    /// Price a request against the current snapshot
    ///
    /// Unknown models and an empty catalog price at zero. Only invalid usage
    /// (negative token counts) is an error.
    pub fn calculate_cost(
        &self,
        usage: &UsageRecord,
        model_id: &str,
    ) -> Result<CostBreakdown, PricingError> {
        let catalog = self.catalog.load();
        let breakdown = calculator::calculate_cost(usage, model_id, &catalog)?;

        if !breakdown.has_pricing {
            warn!(model = %model_id, "No pricing data for model, cost recorded as zero");
        } else if breakdown.is_long_context_request {
            debug!(
                model = %model_id,
                prompt_tokens = usage.prompt_total(),
                "Applied long-context pricing"
            );
        }
        metrics::record_cost_calculation(breakdown.has_pricing, breakdown.is_long_context_request);

        Ok(breakdown)
    }

    /// The snapshot currently used for pricing
    pub fn catalog_snapshot(&self) -> Arc<RateCatalog> {
        self.catalog.load_full()
    }

    pub fn status(&self) -> CatalogStatus {
        self.synchronizer.status()
    }

    /// Refresh immediately, with retries, regardless of the schedule
    pub async fn refresh_now(&self) -> Result<RefreshOutcome, PricingError> {
        self.synchronizer.refresh_with_retry().await
    }

    /// Queue a refresh on the background loop
    pub fn trigger_refresh(&self) {
        self.synchronizer.trigger_refresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, RetryConfig, SourceConfig, SyncConfig};
    use crate::pricing::loader::calculate_hash;
    use crate::pricing::models::CatalogOrigin;
    use crate::pricing::updater::SyncState;
    use tempfile::TempDir;

    const CATALOG: &str = r#"{
        "sample_spec": {"input_cost_per_token": 0.0},
        "claude-sonnet-4-20250514": {
            "input_cost_per_token": 0.000003,
            "output_cost_per_token": 0.000015,
            "cache_creation_input_token_cost": 0.00000375,
            "cache_read_input_token_cost": 0.0000003,
            "input_cost_per_token_above_200k_tokens": 0.000006,
            "output_cost_per_token_above_200k_tokens": 0.0000225
        }
    }"#;

    fn local_config(temp_dir: &TempDir) -> PricingConfig {
        let doc_path = temp_dir.path().join("prices.json");
        std::fs::write(&doc_path, CATALOG).unwrap();
        std::fs::write(
            temp_dir.path().join("prices.json.sha256"),
            calculate_hash(CATALOG.as_bytes()),
        )
        .unwrap();

        PricingConfig {
            source: SourceConfig {
                local_path: Some(doc_path),
                ..Default::default()
            },
            sync: SyncConfig {
                refresh_interval_seconds: 3600,
                watch_local_source: false,
                watch_debounce_ms: 10,
                retry: RetryConfig {
                    max_attempts: 2,
                    initial_backoff_ms: 1,
                    max_backoff_ms: 2,
                },
            },
            cache: CacheConfig {
                data_dir: temp_dir.path().join("data"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unstarted_service_prices_at_zero() {
        let temp_dir = TempDir::new().unwrap();
        let service = PricingService::new(&local_config(&temp_dir)).unwrap();

        let usage = UsageRecord::new(1000, 500);
        let result = service
            .calculate_cost(&usage, "claude-sonnet-4-20250514")
            .unwrap();

        assert!(!result.has_pricing);
        assert_eq!(result.total_cost, 0.0);
        assert_eq!(service.status().state, SyncState::Uninitialized);
    }

    #[tokio::test]
    async fn test_start_then_calculate() {
        let temp_dir = TempDir::new().unwrap();
        let service = PricingService::new(&local_config(&temp_dir)).unwrap();
        service.start().await.unwrap();

        let usage = UsageRecord::new(1_000_000, 1_000_000);
        let result = service
            .calculate_cost(&usage, "claude-sonnet-4-20250514[1m]")
            .unwrap();

        assert!(result.has_pricing);
        assert!(result.is_long_context_request);
        assert!((result.input_cost - 6.0).abs() < 1e-9);
        assert!((result.output_cost - 22.5).abs() < 1e-9);

        let snapshot = service.catalog_snapshot();
        assert_eq!(snapshot.origin(), CatalogOrigin::LocalFile);
        assert_eq!(snapshot.len(), 1);

        let status = service.status();
        assert_eq!(status.state, SyncState::Ready);
        assert_eq!(status.model_count, 1);
        assert_eq!(status.checksum, Some(calculate_hash(CATALOG.as_bytes())));

        service.stop().await;
        assert_eq!(service.status().state, SyncState::Stopped);
    }

    #[tokio::test]
    async fn test_refresh_now_reports_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let service = PricingService::new(&local_config(&temp_dir)).unwrap();
        service.start().await.unwrap();

        let outcome = service.refresh_now().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Unchanged);

        service.stop().await;
    }

    #[tokio::test]
    async fn test_negative_usage_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let service = PricingService::new(&local_config(&temp_dir)).unwrap();
        service.start().await.unwrap();

        let usage = UsageRecord::new(-1, 10);
        let result = service.calculate_cost(&usage, "claude-sonnet-4-20250514");
        assert!(matches!(result, Err(PricingError::InvalidUsage(_))));

        service.stop().await;
    }

    #[tokio::test]
    async fn test_instances_are_independent() {
        let loaded_dir = TempDir::new().unwrap();
        let loaded = PricingService::new(&local_config(&loaded_dir)).unwrap();
        loaded.start().await.unwrap();

        let idle_dir = TempDir::new().unwrap();
        let idle = PricingService::new(&local_config(&idle_dir)).unwrap();

        assert_eq!(loaded.catalog_snapshot().len(), 1);
        assert!(idle.catalog_snapshot().is_empty());

        loaded.stop().await;
    }
}
