//! Prompt enhancement.

use async_trait::async_trait;
use genroute_core::error::GenError;
use genroute_core::middleware::{
    Enhancer, PromptDraft, PromptStage, StageKind, StageOutcome, Translator,
};
use genroute_core::types::RequestContext;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::translate::is_mostly_english;

/// Hands the draft and its reference image to an [`Enhancer`].
///
/// An empty answer is retried once. When enhancement still yields nothing,
/// non-English text goes to the fallback translator if one is set; English
/// text, or a failed translation, degrades to the unenhanced prompt.
#[derive(Debug, Clone)]
pub struct EnhanceStage {
    enhancer: Arc<dyn Enhancer>,
    fallback: Option<Arc<dyn Translator>>,
}

impl EnhanceStage {
    pub fn new(enhancer: Arc<dyn Enhancer>) -> Self {
        Self {
            enhancer,
            fallback: None,
        }
    }

    /// Translate to English when enhancement fails on non-English text
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.fallback = Some(translator);
        self
    }

    async fn enhance(&self, draft: &PromptDraft) -> Result<String, GenError> {
        let image = draft.reference_image.as_deref();
        let first = self.enhancer.enhance(&draft.prompt, image).await?;
        if !first.trim().is_empty() {
            return Ok(first);
        }
        warn!("enhancer returned empty text, retrying once");
        let second = self.enhancer.enhance(&draft.prompt, image).await?;
        if second.trim().is_empty() {
            return Err(GenError::stage("enhance", "enhancer returned empty text"));
        }
        Ok(second)
    }

    async fn translate_fallback(&self, draft: &PromptDraft) -> Option<String> {
        let translator = self.fallback.as_ref()?;
        if is_mostly_english(&draft.prompt) {
            return None;
        }
        match translator.translate(&draft.prompt, "en").await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "fallback translation failed");
                None
            }
        }
    }
}

#[async_trait]
impl PromptStage for EnhanceStage {
    fn name(&self) -> &str {
        "enhance"
    }

    fn kind(&self) -> StageKind {
        StageKind::Enhance
    }

    async fn apply(&self, draft: PromptDraft, ctx: &RequestContext) -> StageOutcome {
        let err = match self.enhance(&draft).await {
            Ok(text) => {
                debug!(
                    request_id = %ctx.request_id,
                    with_image = draft.reference_image.is_some(),
                    "enhanced prompt"
                );
                return StageOutcome::Continue(draft.with_prompt(text.trim()));
            }
            Err(err) => err,
        };

        match self.translate_fallback(&draft).await {
            Some(text) => {
                debug!(
                    request_id = %ctx.request_id,
                    error = %err,
                    "enhancement failed, using translation"
                );
                StageOutcome::Continue(draft.with_prompt(text))
            }
            None => StageOutcome::degraded(draft, &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genroute_core::types::{GenerationRequest, ModelId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Echo;

    #[async_trait]
    impl Enhancer for Echo {
        async fn enhance(&self, text: &str, image: Option<&str>) -> Result<String, GenError> {
            match image {
                Some(url) => Ok(format!("{} (matching {})", text, url)),
                None => Err(GenError::timeout("enhancer")),
            }
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(ModelId(4))
    }

    #[tokio::test]
    async fn test_reference_image_is_passed() {
        let request = GenerationRequest::from_value(json!({
            "prompt": "a dancer",
            "image": "https://cdn/ref.png"
        }))
        .unwrap();
        let stage = EnhanceStage::new(Arc::new(Echo));
        match stage.apply(PromptDraft::from_request(&request), &ctx()).await {
            StageOutcome::Continue(out) => {
                assert_eq!(out.prompt, "a dancer (matching https://cdn/ref.png)")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_degrades() {
        let request = GenerationRequest::from_value(json!({"prompt": "a dancer"})).unwrap();
        let stage = EnhanceStage::new(Arc::new(Echo));
        assert!(matches!(
            stage.apply(PromptDraft::from_request(&request), &ctx()).await,
            StageOutcome::Degraded { .. }
        ));
    }

    /// Answers from a script, then keeps repeating the last answer
    #[derive(Debug)]
    struct Scripted {
        answers: Mutex<Vec<Result<String, String>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(answers: &[Result<&str, &str>]) -> Self {
            let answers = answers
                .iter()
                .map(|a| a.map(str::to_string).map_err(str::to_string))
                .collect();
            Self {
                answers: Mutex::new(answers),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Enhancer for Scripted {
        async fn enhance(&self, _text: &str, _image: Option<&str>) -> Result<String, GenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock().unwrap();
            let answer = if answers.len() > 1 {
                answers.remove(0)
            } else {
                answers[0].clone()
            };
            answer.map_err(GenError::provider)
        }
    }

    #[derive(Debug, Default)]
    struct ToEnglish {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for ToEnglish {
        async fn translate(&self, text: &str, target_lang: &str) -> Result<String, GenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("({}) {}", target_lang, text))
        }
    }

    fn draft(prompt: &str) -> PromptDraft {
        let request = GenerationRequest::from_value(json!({"prompt": prompt})).unwrap();
        PromptDraft::from_request(&request)
    }

    #[tokio::test]
    async fn test_empty_answer_is_retried_once() {
        let enhancer = Arc::new(Scripted::new(&[Ok(""), Ok("a dancer on a moonlit stage")]));
        let stage = EnhanceStage::new(enhancer.clone());
        match stage.apply(draft("a dancer"), &ctx()).await {
            StageOutcome::Continue(out) => assert_eq!(out.prompt, "a dancer on a moonlit stage"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(enhancer.calls(), 2);
    }

    #[tokio::test]
    async fn test_english_prompt_degrades_without_translation() {
        let enhancer = Arc::new(Scripted::new(&[Ok("  ")]));
        let translator = Arc::new(ToEnglish::default());
        let stage = EnhanceStage::new(enhancer.clone()).with_translator(translator.clone());
        match stage.apply(draft("a dancer [pop-anime-style]"), &ctx()).await {
            StageOutcome::Degraded { draft, .. } => {
                assert_eq!(draft.prompt, "a dancer [pop-anime-style]")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(enhancer.calls(), 2);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_english_prompt_falls_back_to_translation() {
        let enhancer = Arc::new(Scripted::new(&[Err("model overloaded")]));
        let translator = Arc::new(ToEnglish::default());
        let stage = EnhanceStage::new(enhancer.clone()).with_translator(translator.clone());
        match stage.apply(draft("月夜の舞台で踊る少女"), &ctx()).await {
            StageOutcome::Continue(out) => assert_eq!(out.prompt, "(en) 月夜の舞台で踊る少女"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        // errors are not retried, only empty answers
        assert_eq!(enhancer.calls(), 1);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_without_translator_non_english_degrades() {
        let stage = EnhanceStage::new(Arc::new(Scripted::new(&[Ok("")])));
        assert!(matches!(
            stage.apply(draft("月夜の舞台"), &ctx()).await,
            StageOutcome::Degraded { .. }
        ));
    }
}
