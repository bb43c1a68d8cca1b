//! Prompt middleware pipeline.
//!
//! Stages rewrite a prompt draft in a fixed order: mention resolution, style
//! resolution, translation, enhancement. A stage reports its result as a
//! tagged outcome instead of an error, so the pipeline as a whole never
//! fails: every failure degrades to the best earlier result.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::GenError;
use crate::types::{GenerationRequest, RequestContext};

/// Style id used when a request asks for middleware without naming one
pub const DEFAULT_STYLE_ID: &str = "default";

/// Position of a stage in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    Mention,
    Style,
    Translate,
    Enhance,
}

/// Working state threaded through the stages
#[derive(Debug, Clone, PartialEq)]
pub struct PromptDraft {
    pub prompt: String,
    /// Source images plus images contributed by resolved mentions
    pub images: Vec<String>,
    /// Mentioned characters whose portrait was added to `images`
    pub portraits: Vec<Portrait>,
    pub style_id: String,
    pub template_inputs: Map<String, Value>,
    /// Image handed to the enhancer
    pub reference_image: Option<String>,
    pub no_translate: bool,
}

impl PromptDraft {
    /// Draft for a request. The request itself is never modified.
    pub fn from_request(request: &GenerationRequest) -> Self {
        let meta = request.meta();
        let mut images: Vec<String> = request.image().map(str::to_string).into_iter().collect();
        for image in request.images() {
            if !images.contains(&image) {
                images.push(image);
            }
        }

        Self {
            prompt: request.prompt().unwrap_or_default().to_string(),
            images,
            portraits: Vec::new(),
            style_id: meta
                .style_id
                .unwrap_or_else(|| DEFAULT_STYLE_ID.to_string()),
            template_inputs: meta.template_inputs,
            reference_image: request.image().map(str::to_string),
            no_translate: meta.no_translate,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }
}

/// Result of one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage ran, possibly as a no-op
    Continue(PromptDraft),
    /// The stage failed; the draft is the best result so far
    Degraded { draft: PromptDraft, reason: String },
    /// Stop the pipeline and use the caller's prompt
    Abort { reason: String },
}

impl StageOutcome {
    /// Degrade to `draft` because of `error`
    pub fn degraded(draft: PromptDraft, error: &GenError) -> Self {
        Self::Degraded {
            draft,
            reason: error.to_string(),
        }
    }
}

/// One prompt rewriting stage
#[async_trait]
pub trait PromptStage: Send + Sync + Debug + 'static {
    /// Stage name, used in logs
    fn name(&self) -> &str;

    /// Where the stage runs in the pipeline
    fn kind(&self) -> StageKind;

    /// Rewrite the draft
    async fn apply(&self, draft: PromptDraft, ctx: &RequestContext) -> StageOutcome;
}

/// Portrait image contributed by a mentioned character
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portrait {
    pub character_id: String,
    pub image: String,
}

/// A stored character a mention can resolve to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterProfile {
    pub id: String,
    pub alt_prompt: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

/// Lookup boundary for character mentions
#[async_trait]
pub trait CharacterDirectory: Send + Sync + Debug + 'static {
    /// Profiles for the ids that exist; unknown ids are simply absent
    async fn lookup(&self, ids: &[String]) -> Result<Vec<CharacterProfile>, GenError>;
}

/// Lookup boundary for style and effect prompt fragments
#[async_trait]
pub trait PromptSource: Send + Sync + Debug + 'static {
    fn name(&self) -> &str;

    /// Fragment for a style id, with template inputs applied
    async fn fetch(
        &self,
        style_id: &str,
        inputs: &Map<String, Value>,
    ) -> Result<Option<String>, GenError>;
}

/// Translation boundary
#[async_trait]
pub trait Translator: Send + Sync + Debug + 'static {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, GenError>;
}

/// Prompt enhancement boundary
#[async_trait]
pub trait Enhancer: Send + Sync + Debug + 'static {
    async fn enhance(&self, text: &str, image: Option<&str>) -> Result<String, GenError>;
}

/// A stage that did not complete normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageNote {
    pub stage: String,
    pub reason: String,
}

/// Final result reported back to the transform step
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub prompt: String,
    pub resolved_images: Vec<String>,
    pub portraits: Vec<Portrait>,
    /// Whether the stages ran at all
    pub rewritten: bool,
    pub notes: Vec<StageNote>,
}

/// `"{prompt}. {suffix}"` when a suffix is declared, else the prompt
pub fn standard_prompt(prompt: &str, suffix: Option<&str>) -> String {
    match suffix.filter(|s| !s.is_empty()) {
        Some(suffix) => format!("{}. {}", prompt, suffix),
        None => prompt.to_string(),
    }
}

/// Ordered prompt stages.
#[derive(Debug, Clone, Default)]
pub struct PromptPipeline {
    stages: Vec<Arc<dyn PromptStage>>,
}

impl PromptPipeline {
    /// Create a pipeline; stages are ordered by kind
    pub fn new(mut stages: Vec<Arc<dyn PromptStage>>) -> Self {
        stages.sort_by_key(|stage| stage.kind());
        Self { stages }
    }

    pub fn stages(&self) -> &[Arc<dyn PromptStage>] {
        &self.stages
    }

    /// Rewrite the prompt of a request.
    ///
    /// Runs only when `meta_data.need_middleware` is set; otherwise the
    /// standard prompt is returned. `fallback_suffix` is the model's style
    /// suffix used by standard processing and by enhancement failures.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        fallback_suffix: Option<&str>,
        ctx: &RequestContext,
    ) -> PipelineOutput {
        let original = request.prompt().unwrap_or_default();
        let mut draft = PromptDraft::from_request(request);

        if !request.meta().need_middleware {
            return PipelineOutput {
                prompt: standard_prompt(original, fallback_suffix),
                resolved_images: draft.images,
                portraits: draft.portraits,
                rewritten: false,
                notes: Vec::new(),
            };
        }

        debug!(
            request_id = %ctx.request_id,
            style_id = %draft.style_id,
            "running prompt middleware"
        );

        let mut notes = Vec::new();
        for stage in &self.stages {
            let before = draft.clone();
            match stage.apply(draft, ctx).await {
                StageOutcome::Continue(next) => draft = next,
                StageOutcome::Degraded { draft: next, reason } => {
                    warn!(stage = stage.name(), %reason, "prompt stage degraded");
                    notes.push(StageNote {
                        stage: stage.name().to_string(),
                        reason,
                    });
                    if stage.kind() == StageKind::Enhance {
                        return PipelineOutput {
                            prompt: standard_prompt(&before.prompt, fallback_suffix),
                            resolved_images: before.images,
                            portraits: before.portraits,
                            rewritten: true,
                            notes,
                        };
                    }
                    draft = next;
                }
                StageOutcome::Abort { reason } => {
                    warn!(stage = stage.name(), %reason, "prompt middleware aborted");
                    notes.push(StageNote {
                        stage: stage.name().to_string(),
                        reason,
                    });
                    return PipelineOutput {
                        prompt: standard_prompt(original, fallback_suffix),
                        resolved_images: before.images,
                        portraits: before.portraits,
                        rewritten: false,
                        notes,
                    };
                }
            }
        }

        PipelineOutput {
            prompt: draft.prompt,
            resolved_images: draft.images,
            portraits: draft.portraits,
            rewritten: true,
            notes,
        }
    }
}
