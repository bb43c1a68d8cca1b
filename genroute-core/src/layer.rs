//! Layer trait and abstractions.
//!
//! Layers wrap a provider with cross-cutting concerns like logging and retry
//! without touching dispatch logic.

use crate::error::GenError;
use crate::provider::Provider;
use crate::types::*;
use async_trait::async_trait;
use std::sync::Arc;

/// Layer trait for wrapping providers.
///
/// Each layer wraps an inner provider and returns a new provider.
pub trait Layer<P: Provider> {
    /// The type of the layered provider
    type LayeredProvider: Provider;

    /// Wrap the inner provider with this layer
    fn layer(&self, inner: P) -> Self::LayeredProvider;
}

/// Helper trait for layered providers.
///
/// Provides forwarding defaults for provider methods; implementers override
/// only what they intercept.
#[async_trait]
pub trait LayeredProvider: Sized + Provider {
    /// The inner provider type
    type Inner: Provider;

    /// Get a reference to the inner provider
    fn inner(&self) -> &Self::Inner;

    /// Default implementation for info - forwards to inner
    fn layered_info(&self) -> Arc<ProviderInfo> {
        self.inner().info()
    }

    /// Default implementation for submit - forwards to inner
    async fn layered_submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
        self.inner().submit(call).await
    }
}
