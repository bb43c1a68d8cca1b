//! Dispatcher implementation.
//!
//! A dispatch is a two-state machine: the primary attempt, then at most one
//! fallback attempt when the primary model's policy accepts the failure.
//! The fallback target's own policy is never consulted.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{DispatchConfig, Surcharges};
use crate::error::{ErrorCode, GenError};
use crate::layer::Layer;
use crate::middleware::{PromptPipeline, PromptStage};
use crate::provider::Provider;
use crate::registry::{ModelAdapter, ModelRegistry, TransformContext};
use crate::types::*;

/// Type-erased provider that can be shared across threads
type BoxedProvider = Arc<dyn Provider>;

/// Builder for composing a dispatcher from a provider, layers, a registry
/// and prompt stages.
///
/// ```ignore
/// let dispatcher = Dispatcher::builder(gateway)
///     .layer(LoggingLayer::new())
///     .layer(RetryLayer::new())
///     .registry(default_registry()?)
///     .stage(Arc::new(StyleStage::new(sources)))
///     .finish()?;
/// ```
pub struct DispatcherBuilder<P> {
    provider: P,
    registry: Option<ModelRegistry>,
    stages: Vec<Arc<dyn PromptStage>>,
    surcharges: Surcharges,
    config: DispatchConfig,
}

impl<P: Provider> DispatcherBuilder<P> {
    /// Create a new builder with a provider
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            registry: None,
            stages: Vec::new(),
            surcharges: Surcharges::default(),
            config: DispatchConfig::default(),
        }
    }

    /// Wrap the provider with a layer
    pub fn layer<L>(self, layer: L) -> DispatcherBuilder<L::LayeredProvider>
    where
        L: Layer<P>,
    {
        DispatcherBuilder {
            provider: layer.layer(self.provider),
            registry: self.registry,
            stages: self.stages,
            surcharges: self.surcharges,
            config: self.config,
        }
    }

    /// Model catalog to dispatch against
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Add a prompt stage
    pub fn stage(mut self, stage: Arc<dyn PromptStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn surcharges(mut self, surcharges: Surcharges) -> Self {
        self.surcharges = surcharges;
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Finish building. Fails when no registry was given.
    pub fn finish(self) -> Result<Dispatcher, GenError> {
        let registry = self
            .registry
            .ok_or_else(|| GenError::configuration("dispatcher requires a model registry"))?;

        Ok(Dispatcher {
            provider: Arc::new(self.provider),
            registry,
            pipeline: Arc::new(PromptPipeline::new(self.stages)),
            surcharges: self.surcharges,
            config: self.config,
        })
    }
}

/// Resolves, transforms, bills and submits generation requests.
pub struct Dispatcher {
    provider: BoxedProvider,
    registry: ModelRegistry,
    pipeline: Arc<PromptPipeline>,
    surcharges: Surcharges,
    config: DispatchConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("provider", &self.provider.info())
            .field("models", &self.registry.len())
            .field("stages", &self.pipeline.stages().len())
            .finish()
    }
}

impl Dispatcher {
    /// Create a new builder
    pub fn builder<P: Provider>(provider: P) -> DispatcherBuilder<P> {
        DispatcherBuilder::new(provider)
    }

    /// Get provider information
    pub fn info(&self) -> Arc<ProviderInfo> {
        self.provider.info()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &PromptPipeline {
        &self.pipeline
    }

    /// Cost of one output of `request` on `model_id`, surcharge included
    pub async fn estimate_cost(
        &self,
        model_id: ModelId,
        request: &GenerationRequest,
    ) -> Result<u64, GenError> {
        let adapter = self.registry.resolve(model_id)?;
        self.cost_of(adapter.as_ref(), request).await
    }

    /// Dispatch a request, falling back at most once.
    pub async fn dispatch(
        &self,
        model_id: ModelId,
        request: GenerationRequest,
    ) -> Result<DispatchOutcome, GenError> {
        let ctx = RequestContext::new(model_id);
        let primary = self.registry.resolve(model_id)?;

        let err = match self.attempt(&primary, &request, &ctx).await {
            Ok(outcome) => return Ok(outcome),
            Err(err) => err,
        };

        if !err.is_fallback_eligible() {
            return Err(err);
        }
        let Some(policy) = primary.fallback_policy() else {
            return Err(err);
        };

        let failure = err.failure_descriptor();
        if !policy.should_fallback(&failure) {
            debug!(
                model = %model_id,
                code = ?failure.code,
                "fallback policy declined"
            );
            return Err(err);
        }

        warn!(
            request_id = %ctx.request_id,
            from = %model_id,
            to = %policy.target,
            error = %err,
            "primary attempt failed, falling back"
        );

        let target = self.registry.resolve(policy.target)?;
        let request = policy.apply(&request);
        let mut outcome = self
            .attempt(&target, &request, &ctx.for_fallback(policy.target))
            .await?;
        outcome.fallback_from = Some(model_id);
        Ok(outcome)
    }

    async fn cost_of(
        &self,
        adapter: &dyn ModelAdapter,
        request: &GenerationRequest,
    ) -> Result<u64, GenError> {
        let base = adapter.cost(request).await?;
        Ok(base + self.surcharges.for_request(request))
    }

    /// One attempt against one model: cost, transform, redirect, submit
    async fn attempt(
        &self,
        adapter: &Arc<dyn ModelAdapter>,
        request: &GenerationRequest,
        ctx: &RequestContext,
    ) -> Result<DispatchOutcome, GenError> {
        let cost = self.cost_of(adapter.as_ref(), request).await?;

        let transform_ctx = TransformContext::new(self.pipeline.clone(), ctx.clone());
        let transformed = adapter.transform(request, &transform_ctx).await?;

        let target = match transformed.redirect {
            Some(id) if id != adapter.id() => {
                debug!(from = %adapter.id(), to = %id, "redirecting by input");
                self.registry.resolve(id)?
            }
            _ => adapter.clone(),
        };

        let outputs = request.num_outputs().clamp(1, self.config.max_outputs.max(1));
        let call = ProviderCall {
            request_id: ctx.request_id.clone(),
            model_id: target.id(),
            model: target.name().to_string(),
            platform: target.platform().to_string(),
            task_type: target.task_type(),
            payload: transformed.payload,
            tool: request.tool().map(str::to_string),
            callback_url: self.config.callback_url.clone(),
            cost,
        };

        let submissions = (0..outputs).map(|_| self.provider.submit(call.clone()));
        let results = join_all(submissions).await;

        let mut task_ids = Vec::new();
        let mut errors = Vec::new();
        let mut accepted: u64 = 0;
        for result in results {
            match result {
                Ok(response) => {
                    accepted += 1;
                    task_ids.extend(response.task_ids);
                }
                Err(err) => errors.push(err),
            }
        }

        if task_ids.is_empty() {
            return Err(pick_error(errors));
        }
        if !errors.is_empty() {
            warn!(
                request_id = %ctx.request_id,
                failed = errors.len(),
                succeeded = task_ids.len(),
                "some submissions failed"
            );
        }

        Ok(DispatchOutcome {
            model_id: target.id(),
            alias: adapter.alias(request),
            unit_cost: cost,
            cost: cost * accepted,
            task_ids,
            fallback_from: None,
        })
    }
}

/// A rate-limit rejection wins, otherwise the first error
fn pick_error(errors: Vec<GenError>) -> GenError {
    let rate_limited = errors.iter().position(|err| {
        matches!(
            err,
            GenError::Envelope {
                code: ErrorCode::RateLimitExceeded,
                ..
            }
        )
    });

    let mut errors = errors;
    match rate_limited {
        Some(index) => errors.swap_remove(index),
        None if !errors.is_empty() => errors.swap_remove(0),
        None => GenError::provider("no task ids returned"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FallbackPolicy;
    use crate::task::TaskId;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        calls: Mutex<Vec<ProviderCall>>,
        fail_models: Vec<&'static str>,
    }

    #[async_trait]
    impl Provider for Recorder {
        fn info(&self) -> Arc<ProviderInfo> {
            Arc::new(ProviderInfo {
                id: "recorder".to_string(),
                name: "Recorder".to_string(),
            })
        }

        async fn submit(&self, call: ProviderCall) -> Result<SubmitResponse, GenError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call.clone());
            if self.fail_models.contains(&call.model.as_str()) {
                return Err(GenError::provider_with_code("internal error", "500"));
            }
            Ok(SubmitResponse {
                task_ids: vec![TaskId(calls.len() as i64)],
            })
        }
    }

    #[derive(Debug)]
    struct Model {
        id: u32,
        name: &'static str,
        cost: u64,
        redirect: Option<ModelId>,
        fallback: Option<FallbackPolicy>,
    }

    impl Model {
        fn new(id: u32, name: &'static str, cost: u64) -> Self {
            Self {
                id,
                name,
                cost,
                redirect: None,
                fallback: None,
            }
        }
    }

    #[async_trait]
    impl ModelAdapter for Model {
        fn id(&self) -> ModelId {
            ModelId(self.id)
        }

        fn name(&self) -> &str {
            self.name
        }

        fn platform(&self) -> &str {
            "test"
        }

        fn task_type(&self) -> TaskType {
            TaskType::Video
        }

        async fn transform(
            &self,
            request: &GenerationRequest,
            _ctx: &TransformContext,
        ) -> Result<Transformed, GenError> {
            if request.prompt().is_none() {
                return Err(GenError::invalid_params("Prompt is required"));
            }
            Ok(Transformed::new(request.clone().into_value()).with_redirect(self.redirect))
        }

        async fn cost(&self, _request: &GenerationRequest) -> Result<u64, GenError> {
            Ok(self.cost)
        }

        fn redirect_targets(&self) -> &[ModelId] {
            self.redirect.as_slice()
        }

        fn fallback_policy(&self) -> Option<&FallbackPolicy> {
            self.fallback.as_ref()
        }
    }

    fn dispatcher(provider: Arc<Recorder>, registry: ModelRegistry) -> Dispatcher {
        Dispatcher::builder(provider)
            .registry(registry)
            .surcharges(Surcharges::none().with("type2", 7))
            .finish()
            .unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_skips_provider() {
        let provider = Arc::new(Recorder::default());
        let mut primary = Model::new(1, "primary", 10);
        primary.fallback = Some(FallbackPolicy::always(ModelId(2)));
        let registry = ModelRegistry::builder()
            .register(primary)
            .register(Model::new(2, "backup", 20))
            .build()
            .unwrap();

        let err = dispatcher(provider.clone(), registry)
            .dispatch(ModelId(1), GenerationRequest::new())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_uses_target_name_and_own_cost() {
        let provider = Arc::new(Recorder::default());
        let mut create = Model::new(47, "seedream-create", 55);
        create.redirect = Some(ModelId(48));
        let registry = ModelRegistry::builder()
            .register(create)
            .register(Model::new(48, "seedream-edit", 99))
            .build()
            .unwrap();

        let req = GenerationRequest::new().with("prompt", "a fox");
        let outcome = dispatcher(provider.clone(), registry)
            .dispatch(ModelId(47), req)
            .await
            .unwrap();
        assert_eq!(outcome.model_id, ModelId(48));
        assert_eq!(outcome.cost, 55);

        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls[0].model, "seedream-edit");
        assert_eq!(calls[0].payload.get("prompt"), Some(&serde_json::json!("a fox")));
    }

    #[tokio::test]
    async fn test_fallback_cost_is_recomputed() {
        let provider = Arc::new(Recorder {
            fail_models: vec!["primary"],
            ..Recorder::default()
        });
        let mut primary = Model::new(1, "primary", 10);
        primary.fallback = Some(FallbackPolicy::always(ModelId(2)));
        let registry = ModelRegistry::builder()
            .register(primary)
            .register(Model::new(2, "backup", 20))
            .build()
            .unwrap();

        let req = GenerationRequest::from_value(serde_json::json!({
            "prompt": "x",
            "meta_data": {"video_pipeline_type": "type2"}
        }))
        .unwrap();
        let outcome = dispatcher(provider, registry)
            .dispatch(ModelId(1), req)
            .await
            .unwrap();
        assert_eq!(outcome.cost, 27);
        assert_eq!(outcome.fallback_from, Some(ModelId(1)));
    }

    #[tokio::test]
    async fn test_multiple_outputs_are_capped() {
        let provider = Arc::new(Recorder::default());
        let registry = ModelRegistry::builder()
            .register(Model::new(1, "primary", 10))
            .build()
            .unwrap();
        let req = GenerationRequest::new().with("prompt", "x").with("num_images", 9);
        let outcome = dispatcher(provider.clone(), registry)
            .dispatch(ModelId(1), req)
            .await
            .unwrap();
        assert_eq!(outcome.task_ids.len(), 4);
        assert_eq!(provider.calls.lock().unwrap().len(), 4);
        assert_eq!(outcome.unit_cost, 10);
        assert_eq!(outcome.cost, 40);
    }

    #[test]
    fn test_rate_limit_error_wins() {
        let err = pick_error(vec![
            GenError::provider("boom"),
            GenError::envelope(ErrorCode::RateLimitExceeded, "slow down"),
        ]);
        assert!(matches!(
            err,
            GenError::Envelope {
                code: ErrorCode::RateLimitExceeded,
                ..
            }
        ));
    }
}
