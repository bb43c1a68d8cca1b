//! Model registry: an immutable catalog of model adapters.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::error::GenError;
use crate::middleware::{PipelineOutput, PromptPipeline};
use crate::types::*;

/// Everything a transform may use besides the request itself
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub pipeline: Arc<PromptPipeline>,
    pub request: RequestContext,
}

impl TransformContext {
    pub fn new(pipeline: Arc<PromptPipeline>, request: RequestContext) -> Self {
        Self { pipeline, request }
    }

    /// Run the prompt pipeline for `request`
    pub async fn rewrite_prompt(
        &self,
        request: &GenerationRequest,
        fallback_suffix: Option<&str>,
    ) -> PipelineOutput {
        self.pipeline
            .run(request, fallback_suffix, &self.request)
            .await
    }
}

/// Parameters merged into the request before a fallback hop
#[derive(Clone, Default)]
pub enum ParamsOverride {
    #[default]
    None,
    /// Shallow-merged into the request
    Static(Map<String, Value>),
    /// Computed from the request, then shallow-merged
    Dynamic(Arc<dyn Fn(&GenerationRequest) -> Map<String, Value> + Send + Sync>),
}

impl Debug for ParamsOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamsOverride::None => f.write_str("None"),
            ParamsOverride::Static(map) => f.debug_tuple("Static").field(map).finish(),
            ParamsOverride::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

type FallbackPredicate = Arc<dyn Fn(&FailureDescriptor) -> bool + Send + Sync>;

/// Where and when to fall back after a provider failure
#[derive(Clone)]
pub struct FallbackPolicy {
    pub target: ModelId,
    pub params_override: ParamsOverride,
    should_fallback: Option<FallbackPredicate>,
}

impl FallbackPolicy {
    /// Fall back on every provider failure
    pub fn always(target: ModelId) -> Self {
        Self {
            target,
            params_override: ParamsOverride::None,
            should_fallback: None,
        }
    }

    /// Fall back only when `predicate` accepts the failure
    pub fn when<F>(target: ModelId, predicate: F) -> Self
    where
        F: Fn(&FailureDescriptor) -> bool + Send + Sync + 'static,
    {
        Self {
            target,
            params_override: ParamsOverride::None,
            should_fallback: Some(Arc::new(predicate)),
        }
    }

    pub fn with_override(mut self, params: Map<String, Value>) -> Self {
        self.params_override = ParamsOverride::Static(params);
        self
    }

    pub fn with_dynamic_override<F>(mut self, f: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.params_override = ParamsOverride::Dynamic(Arc::new(f));
        self
    }

    /// Whether this failure should trigger the hop. No predicate means yes.
    pub fn should_fallback(&self, failure: &FailureDescriptor) -> bool {
        self.should_fallback
            .as_ref()
            .map_or(true, |predicate| predicate(failure))
    }

    /// The request for the fallback hop
    pub fn apply(&self, request: &GenerationRequest) -> GenerationRequest {
        let mut next = request.clone();
        match &self.params_override {
            ParamsOverride::None => {}
            ParamsOverride::Static(params) => next.merge(params),
            ParamsOverride::Dynamic(f) => next.merge(&f(request)),
        }
        next
    }
}

impl Debug for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallbackPolicy")
            .field("target", &self.target)
            .field("params_override", &self.params_override)
            .field("conditional", &self.should_fallback.is_some())
            .finish()
    }
}

/// Per-model behavior: how to build the provider payload and bill it.
#[async_trait]
pub trait ModelAdapter: Send + Sync + Debug + 'static {
    /// Registry key
    fn id(&self) -> ModelId;

    /// Provider-side model name
    fn name(&self) -> &str;

    /// Provider platform the call is routed to
    fn platform(&self) -> &str;

    fn task_type(&self) -> TaskType;

    /// Human alias, may depend on the request
    fn alias(&self, request: &GenerationRequest) -> String {
        let _ = request;
        self.name().to_string()
    }

    /// Build the provider payload.
    ///
    /// Validation failures must be reported as `GenError::InvalidParams`
    /// before any network call. The result may name a redirect target.
    async fn transform(
        &self,
        request: &GenerationRequest,
        ctx: &TransformContext,
    ) -> Result<Transformed, GenError>;

    /// Cost of one output, independent of the call's outcome
    async fn cost(&self, request: &GenerationRequest) -> Result<u64, GenError>;

    /// Every model `transform` may redirect to
    fn redirect_targets(&self) -> &[ModelId] {
        &[]
    }

    fn fallback_policy(&self) -> Option<&FallbackPolicy> {
        None
    }
}

/// Immutable catalog of model adapters, built once at startup.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Arc<HashMap<ModelId, Arc<dyn ModelAdapter>>>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Look up a model
    pub fn resolve(&self, id: ModelId) -> Result<Arc<dyn ModelAdapter>, GenError> {
        self.models
            .get(&id)
            .cloned()
            .ok_or(GenError::UnknownModel(id))
    }

    pub fn contains(&self, id: ModelId) -> bool {
        self.models.contains_key(&id)
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = self.models.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ModelAdapter>> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Builder for [`ModelRegistry`]
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    models: BTreeMap<ModelId, Arc<dyn ModelAdapter>>,
}

impl ModelRegistryBuilder {
    /// Register an adapter under its own id; a later registration replaces
    /// an earlier one
    pub fn register<A: ModelAdapter>(self, adapter: A) -> Self {
        self.register_arc(Arc::new(adapter))
    }

    pub fn register_arc(mut self, adapter: Arc<dyn ModelAdapter>) -> Self {
        self.models.insert(adapter.id(), adapter);
        self
    }

    /// Freeze the catalog.
    ///
    /// Fails when a fallback target or redirect target is not registered.
    pub fn build(self) -> Result<ModelRegistry, GenError> {
        for (id, adapter) in &self.models {
            if let Some(policy) = adapter.fallback_policy() {
                if !self.models.contains_key(&policy.target) {
                    return Err(GenError::configuration(format!(
                        "model {} falls back to unregistered model {}",
                        id, policy.target
                    )));
                }
            }
            for target in adapter.redirect_targets() {
                if !self.models.contains_key(target) {
                    return Err(GenError::configuration(format!(
                        "model {} redirects to unregistered model {}",
                        id, target
                    )));
                }
            }
        }

        Ok(ModelRegistry {
            models: Arc::new(self.models.into_iter().collect()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Stub {
        id: ModelId,
        fallback: Option<FallbackPolicy>,
        redirects: Vec<ModelId>,
    }

    impl Stub {
        fn new(id: u32) -> Self {
            Self {
                id: ModelId(id),
                fallback: None,
                redirects: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl ModelAdapter for Stub {
        fn id(&self) -> ModelId {
            self.id
        }

        fn name(&self) -> &str {
            "stub"
        }

        fn platform(&self) -> &str {
            "test"
        }

        fn task_type(&self) -> TaskType {
            TaskType::Image
        }

        async fn transform(
            &self,
            request: &GenerationRequest,
            _ctx: &TransformContext,
        ) -> Result<Transformed, GenError> {
            Ok(Transformed::new(request.clone().into_value()))
        }

        async fn cost(&self, _request: &GenerationRequest) -> Result<u64, GenError> {
            Ok(1)
        }

        fn redirect_targets(&self) -> &[ModelId] {
            &self.redirects
        }

        fn fallback_policy(&self) -> Option<&FallbackPolicy> {
            self.fallback.as_ref()
        }
    }

    #[test]
    fn test_unknown_model() {
        let registry = ModelRegistry::builder().register(Stub::new(1)).build().unwrap();
        assert!(registry.resolve(ModelId(1)).is_ok());
        assert!(matches!(
            registry.resolve(ModelId(2)),
            Err(GenError::UnknownModel(ModelId(2)))
        ));
    }

    #[test]
    fn test_dangling_fallback_rejected() {
        let mut primary = Stub::new(1);
        primary.fallback = Some(FallbackPolicy::always(ModelId(9)));
        let err = ModelRegistry::builder().register(primary).build().unwrap_err();
        assert!(matches!(err, GenError::Configuration(_)));
    }

    #[test]
    fn test_dangling_redirect_rejected() {
        let mut create = Stub::new(47);
        create.redirects = vec![ModelId(48)];
        assert!(ModelRegistry::builder().register(create).build().is_err());

        let mut create = Stub::new(47);
        create.redirects = vec![ModelId(48)];
        let registry = ModelRegistry::builder()
            .register(create)
            .register(Stub::new(48))
            .build()
            .unwrap();
        assert_eq!(registry.ids(), vec![ModelId(47), ModelId(48)]);
    }

    #[test]
    fn test_policy_override_and_predicate() {
        let policy = FallbackPolicy::when(ModelId(27), |f| f.code_is("500"))
            .with_override(json!({"resolution": "480p"}).as_object().unwrap().clone());
        let failure = FailureDescriptor {
            message: "boom".to_string(),
            code: Some("500".to_string()),
        };
        assert!(policy.should_fallback(&failure));
        assert!(!policy.should_fallback(&FailureDescriptor::default()));

        let req = GenerationRequest::new().with("resolution", "1080p");
        assert_eq!(policy.apply(&req).get_str("resolution"), Some("480p"));
        assert_eq!(req.get_str("resolution"), Some("1080p"));

        assert!(FallbackPolicy::always(ModelId(26)).should_fallback(&FailureDescriptor::default()));
    }
}
