//! Provider trait: the submit boundary.

use crate::error::GenError;
use crate::types::*;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Submit boundary for generation jobs.
///
/// A provider receives one fully transformed call and returns the task ids
/// the job gateway assigned to it. Everything above this trait (model
/// resolution, prompt rewriting, fallback) is handled by the dispatcher.
#[async_trait]
pub trait Provider: Send + Sync + Debug + 'static {
    /// Get provider information
    fn info(&self) -> Arc<ProviderInfo>;

    /// Submit one generation job
    async fn submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError>;
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn info(&self) -> Arc<ProviderInfo> {
        (**self).info()
    }

    async fn submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
        (**self).submit(call).await
    }
}
