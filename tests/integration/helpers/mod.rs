#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::{catalog_document, CATALOG_V1, CATALOG_V2, HAIKU, SONNET};

use gateway_pricing::config::{CacheConfig, PricingConfig, RetryConfig, SourceConfig, SyncConfig};
use std::path::Path;

/// Config pointing at a mock mirror, caching into `data_dir`
///
/// Long refresh interval so only the test drives refreshes; retries are
/// fast so exhausted-retry paths finish quickly.
pub fn mirror_config(base_url: &str, data_dir: &Path) -> PricingConfig {
    PricingConfig {
        source: SourceConfig {
            base_url: Some(base_url.to_string()),
            request_timeout_seconds: 5,
            ..Default::default()
        },
        sync: SyncConfig {
            refresh_interval_seconds: 3600,
            watch_local_source: false,
            watch_debounce_ms: 10,
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 5,
                max_backoff_ms: 20,
            },
        },
        cache: CacheConfig {
            data_dir: data_dir.to_path_buf(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Assert two prices are equal up to floating point noise
pub fn assert_cost_eq(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
