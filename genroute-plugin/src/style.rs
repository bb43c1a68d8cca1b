//! Style and effect resolution.

use async_trait::async_trait;
use genroute_core::middleware::{PromptDraft, PromptSource, PromptStage, StageKind, StageOutcome};
use genroute_core::types::RequestContext;
use std::sync::Arc;
use tracing::{debug, warn};

/// Replaces the prompt with the fragment for the draft's style id.
///
/// Sources are tried in order and the first non-empty fragment wins. A
/// source error counts as a miss. When every source misses the pipeline
/// is aborted.
#[derive(Debug, Clone)]
pub struct StyleStage {
    sources: Vec<Arc<dyn PromptSource>>,
}

impl StyleStage {
    pub fn new(sources: Vec<Arc<dyn PromptSource>>) -> Self {
        Self { sources }
    }

    /// Append a source after the existing ones
    pub fn source(mut self, source: Arc<dyn PromptSource>) -> Self {
        self.sources.push(source);
        self
    }
}

#[async_trait]
impl PromptStage for StyleStage {
    fn name(&self) -> &str {
        "style"
    }

    fn kind(&self) -> StageKind {
        StageKind::Style
    }

    async fn apply(&self, draft: PromptDraft, ctx: &RequestContext) -> StageOutcome {
        for source in &self.sources {
            match source.fetch(&draft.style_id, &draft.template_inputs).await {
                Ok(Some(fragment)) if !fragment.trim().is_empty() => {
                    debug!(
                        request_id = %ctx.request_id,
                        source = source.name(),
                        style_id = %draft.style_id,
                        "resolved style fragment"
                    );
                    return StageOutcome::Continue(draft.with_prompt(fragment.trim()));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(source = source.name(), error = %e, "prompt source failed");
                }
            }
        }

        StageOutcome::Abort {
            reason: format!("no prompt found for style {}", draft.style_id),
        }
    }
}
