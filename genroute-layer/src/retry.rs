//! Resubmission of jobs the gateway never took.
//!
//! A submission is billed once the gateway accepts it, so only failures that
//! prove the job was not accepted are resubmitted: connection failures and
//! 429/503 answers (see [`GenError::is_retryable`]). A timeout or a
//! connection dropped mid-response is returned as is, since the first job
//! may already be running.

use async_trait::async_trait;
use genroute_core::error::{Delivery, GenError};
use genroute_core::layer::{Layer, LayeredProvider};
use genroute_core::provider::Provider;
use genroute_core::types::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Doubling delay between resubmissions, bounded by `ceiling`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub first: Duration,
    pub ceiling: Duration,
}

impl Backoff {
    /// Delay before the `n`th resubmission, counting from zero
    pub fn delay(&self, n: u32) -> Duration {
        let factor = 1u32.checked_shl(n).unwrap_or(u32::MAX);
        self.first.saturating_mul(factor).min(self.ceiling)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(250),
            ceiling: Duration::from_secs(5),
        }
    }
}

/// Resubmits calls the gateway turned away unprocessed.
#[derive(Debug, Clone)]
pub struct RetryLayer {
    max_resubmits: u32,
    backoff: Backoff,
}

impl RetryLayer {
    /// Two resubmissions with the default backoff
    pub fn new() -> Self {
        Self {
            max_resubmits: 2,
            backoff: Backoff::default(),
        }
    }

    pub fn max_resubmits(mut self, max_resubmits: u32) -> Self {
        self.max_resubmits = max_resubmits;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for RetryLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Provider> Layer<P> for RetryLayer {
    type LayeredProvider = RetryProvider<P>;

    fn layer(&self, inner: P) -> Self::LayeredProvider {
        RetryProvider {
            inner,
            config: self.clone(),
        }
    }
}

#[derive(Debug)]
pub struct RetryProvider<P> {
    inner: P,
    config: RetryLayer,
}

#[async_trait]
impl<P: Provider> LayeredProvider for RetryProvider<P> {
    type Inner = P;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    async fn layered_submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
        let mut resubmits = 0;
        loop {
            let err = match self.inner.submit(call.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if !err.is_retryable() {
                if err.delivery() == Delivery::Unknown {
                    warn!(
                        request_id = %call.request_id,
                        model = %call.model,
                        error = %err,
                        "submission may have been accepted, not resubmitting"
                    );
                }
                return Err(err);
            }
            if resubmits >= self.config.max_resubmits {
                return Err(err);
            }

            let delay = self.config.backoff.delay(resubmits);
            resubmits += 1;
            debug!(
                request_id = %call.request_id,
                model = %call.model,
                resubmit = resubmits,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "job not taken by gateway, resubmitting"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl<P: Provider> Provider for RetryProvider<P> {
    fn info(&self) -> Arc<ProviderInfo> {
        LayeredProvider::layered_info(self)
    }

    async fn submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
        LayeredProvider::layered_submit(self, call).await
    }
}
