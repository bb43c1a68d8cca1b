//! Fragment translation.

use async_trait::async_trait;
use genroute_core::middleware::{PromptDraft, PromptStage, StageKind, StageOutcome, Translator};
use genroute_core::types::RequestContext;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

static STYLE_TAG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\[.*?\]").ok());

/// Under a fifth of the text, `[tags]` aside, falls outside printable ASCII.
/// Blank text counts as English.
pub fn is_mostly_english(text: &str) -> bool {
    let untagged = match STYLE_TAG.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => text.into(),
    };
    let cleaned = untagged.trim();
    let total = cleaned.chars().count();
    if total == 0 {
        return true;
    }
    let foreign = cleaned.chars().filter(|c| !(' '..='~').contains(c)).count();
    foreign * 5 < total
}

/// Translates the draft into the target language.
///
/// Skipped when the request sets `no_translate`, and for ASCII text when
/// the target is English. A failed translation keeps the original text.
#[derive(Debug, Clone)]
pub struct TranslateStage {
    translator: Arc<dyn Translator>,
    target_lang: String,
}

impl TranslateStage {
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator,
            target_lang: "en".to_string(),
        }
    }

    pub fn target_lang(mut self, lang: impl Into<String>) -> Self {
        self.target_lang = lang.into();
        self
    }

    fn needs_translation(&self, draft: &PromptDraft) -> bool {
        if draft.no_translate || draft.prompt.trim().is_empty() {
            return false;
        }
        !(self.target_lang == "en" && draft.prompt.is_ascii())
    }
}

#[async_trait]
impl PromptStage for TranslateStage {
    fn name(&self) -> &str {
        "translate"
    }

    fn kind(&self) -> StageKind {
        StageKind::Translate
    }

    async fn apply(&self, draft: PromptDraft, ctx: &RequestContext) -> StageOutcome {
        if !self.needs_translation(&draft) {
            return StageOutcome::Continue(draft);
        }

        match self.translator.translate(&draft.prompt, &self.target_lang).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(request_id = %ctx.request_id, lang = %self.target_lang, "translated prompt");
                StageOutcome::Continue(draft.with_prompt(text.trim()))
            }
            Ok(_) => StageOutcome::Degraded {
                draft,
                reason: "translator returned empty text".to_string(),
            },
            Err(e) => StageOutcome::degraded(draft, &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genroute_core::error::GenError;
    use genroute_core::types::{GenerationRequest, ModelId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Translator for Counting {
        async fn translate(&self, text: &str, target_lang: &str) -> Result<String, GenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GenError::provider("translator timed out"));
            }
            Ok(format!("[{}] {}", target_lang, text))
        }
    }

    fn draft(prompt: &str, no_translate: bool) -> PromptDraft {
        let request = GenerationRequest::from_value(json!({
            "prompt": prompt,
            "meta_data": {"no_translate": no_translate}
        }))
        .unwrap();
        PromptDraft::from_request(&request)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(ModelId(4))
    }

    #[tokio::test]
    async fn test_english_is_left_alone() {
        let translator = Arc::new(Counting::default());
        let stage = TranslateStage::new(translator.clone());
        let input = draft("a cat on a roof", false);
        assert_eq!(stage.apply(input.clone(), &ctx()).await, StageOutcome::Continue(input));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_ascii_is_translated() {
        let stage = TranslateStage::new(Arc::new(Counting::default()));
        match stage.apply(draft("屋根の上の猫", false), &ctx()).await {
            StageOutcome::Continue(out) => assert_eq!(out.prompt, "[en] 屋根の上の猫"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_translate_flag() {
        let translator = Arc::new(Counting::default());
        let stage = TranslateStage::new(translator.clone());
        stage.apply(draft("屋根の上の猫", true), &ctx()).await;
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_keeps_text() {
        let stage = TranslateStage::new(Arc::new(Counting {
            fail: true,
            ..Default::default()
        }));
        match stage.apply(draft("屋根の上の猫", false), &ctx()).await {
            StageOutcome::Degraded { draft, .. } => assert_eq!(draft.prompt, "屋根の上の猫"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_mostly_english() {
        assert!(is_mostly_english("a cat on a roof [pop-anime-style]"));
        assert!(is_mostly_english("un château au bord du lac"));
        assert!(is_mostly_english("  [only-a-tag]  "));
        assert!(!is_mostly_english("屋根の上の猫 cat"));
    }
}
