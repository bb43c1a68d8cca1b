//! Structured submission logging.
//!
//! Every submission runs inside a `submit` span carrying the request id,
//! model and platform. The outcome is logged once, at a level chosen by how
//! far the submission got: a failure whose delivery is unknown is an error,
//! since the job may be running and billed without a task id to track it.

use async_trait::async_trait;
use genroute_core::error::{Delivery, GenError};
use genroute_core::layer::{Layer, LayeredProvider};
use genroute_core::provider::Provider;
use genroute_core::types::*;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

#[derive(Debug, Clone, Default)]
pub struct LoggingLayer {
    payloads: bool,
}

impl LoggingLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log each payload at trace level. Payloads carry user prompts.
    pub fn with_payloads(mut self, payloads: bool) -> Self {
        self.payloads = payloads;
        self
    }
}

impl<P: Provider> Layer<P> for LoggingLayer {
    type LayeredProvider = LoggingProvider<P>;

    fn layer(&self, inner: P) -> Self::LayeredProvider {
        LoggingProvider {
            inner,
            payloads: self.payloads,
        }
    }
}

#[derive(Debug)]
pub struct LoggingProvider<P> {
    inner: P,
    payloads: bool,
}

impl<P: Provider> LoggingProvider<P> {
    async fn submit_logged(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
        debug!(task_type = ?call.task_type, cost = call.cost, tool = ?call.tool, "submitting");
        if self.payloads {
            trace!(payload = %call.payload.0, "submit payload");
        }

        let started = Instant::now();
        let result = self.inner.submit(call).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => info!(
                elapsed_ms,
                tasks = ?response.task_ids,
                "submission accepted"
            ),
            Err(err) => match err.delivery() {
                Delivery::Unknown => error!(
                    elapsed_ms,
                    error = %err,
                    "submission outcome unknown, job may be running untracked"
                ),
                Delivery::Answered => warn!(elapsed_ms, error = %err, "submission rejected"),
                Delivery::NotSent => warn!(elapsed_ms, error = %err, "submission not sent"),
            },
        }
        result
    }
}

#[async_trait]
impl<P: Provider> LayeredProvider for LoggingProvider<P> {
    type Inner = P;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    async fn layered_submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
        let span = info_span!(
            "submit",
            request_id = %call.request_id,
            model = %call.model,
            platform = %call.platform,
        );
        self.submit_logged(call).instrument(span).await
    }
}

#[async_trait]
impl<P: Provider> Provider for LoggingProvider<P> {
    fn info(&self) -> Arc<ProviderInfo> {
        LayeredProvider::layered_info(self)
    }

    async fn submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
        LayeredProvider::layered_submit(self, call).await
    }
}
