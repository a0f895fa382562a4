use crate::config::RetryConfig;
use crate::error::PricingError;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Capped exponential backoff for catalog fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .initial_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff);
        delay.min(self.max_backoff)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Determine if an error is worth another attempt
///
/// ## Transient (returns true):
/// - Connection failures and request timeouts
/// - HTTP 5xx and 429 from the mirror
/// - Local I/O errors (file briefly locked or mid-write)
///
/// ## Permanent (returns false):
/// - Integrity mismatches and malformed documents (retrying fetches the same bytes)
/// - HTTP 4xx other than 429
/// - Invalid usage, configuration errors, stopped synchronizer
pub fn is_transient(error: &PricingError) -> bool {
    match error {
        PricingError::Http(e) => {
            if e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() {
                return true;
            }
            if let Some(status) = e.status() {
                return status.is_server_error() || status.as_u16() == 429;
            }
            false
        }
        PricingError::SourceUnavailable { status, .. } => match status {
            Some(code) => *code >= 500 || *code == 429,
            None => true,
        },
        PricingError::Io(_) => true,
        PricingError::IntegrityMismatch { .. } => false,
        PricingError::MalformedCatalog(_) => false,
        PricingError::InvalidUsage(_) => false,
        PricingError::ConfigError(_) => false,
        PricingError::Stopped => false,
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out
///
/// Backoff sleeps race `shutdown`; once it flips to `true` the pending retry is
/// abandoned with `PricingError::Stopped`.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    shutdown: &mut watch::Receiver<bool>,
    mut operation: F,
) -> Result<T, PricingError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PricingError>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_transient(&e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Catalog fetch failed, retrying"
                );

                if *shutdown.borrow() {
                    return Err(PricingError::Stopped);
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.wait_for(|stopped| *stopped) => {
                        return Err(PricingError::Stopped);
                    }
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
