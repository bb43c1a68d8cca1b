//! OpenAI-compatible prompt assist using async-openai.
//!
//! Backs the enhancement and translation boundaries of the prompt pipeline
//! with a chat completion model.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequestArgs, ImageUrlArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use genroute_core::error::GenError;
use genroute_core::middleware::{Enhancer, Translator};
use genroute_core::types::ProviderInfo;
use std::sync::Arc;

const DEFAULT_ENHANCE_INSTRUCTION: &str = "You rewrite prompts for image and video generation models. \
Expand the user's prompt into one vivid, concrete description of the subject, motion, lighting and camera. \
If a reference image is given, keep its subject and composition. Reply with the prompt only.";

/// Chat-completion backed enhancer and translator
#[derive(Clone)]
pub struct OpenAiPromptAssist {
    client: Client<OpenAIConfig>,
    model: String,
    enhance_instruction: String,
    info: Arc<ProviderInfo>,
}

impl std::fmt::Debug for OpenAiPromptAssist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiPromptAssist")
            .field("info", &self.info)
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiPromptAssist {
    /// Create a builder for more configuration options
    pub fn builder() -> OpenAiBuilder {
        OpenAiBuilder::default()
    }

    pub fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    fn system_message(content: &str) -> Result<ChatCompletionRequestMessage, GenError> {
        let msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()
            .map_err(|e| GenError::provider(format!("Failed to build system message: {}", e)))?;
        Ok(ChatCompletionRequestMessage::System(msg))
    }

    fn user_message(
        text: &str,
        image: Option<&str>,
    ) -> Result<ChatCompletionRequestMessage, GenError> {
        let text_part = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(text)
            .build()
            .map_err(|e| GenError::provider(format!("Failed to build text part: {}", e)))?;
        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![text_part.into()];

        if let Some(url) = image {
            let image_url = ImageUrlArgs::default()
                .url(url)
                .build()
                .map_err(|e| GenError::provider(format!("Failed to build image url: {}", e)))?;
            let image_part = ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(image_url)
                .build()
                .map_err(|e| GenError::provider(format!("Failed to build image part: {}", e)))?;
            parts.push(image_part.into());
        }

        let msg = ChatCompletionRequestUserMessageArgs::default()
            .content(parts)
            .build()
            .map_err(|e| GenError::provider(format!("Failed to build user message: {}", e)))?;
        Ok(ChatCompletionRequestMessage::User(msg))
    }

    /// One completion, returning the first choice's text
    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<String, GenError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()
            .map_err(|e| GenError::provider(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| GenError::provider(format!("OpenAI API error: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| GenError::provider("No content in response"))
    }
}

#[async_trait]
impl Enhancer for OpenAiPromptAssist {
    async fn enhance(&self, text: &str, image: Option<&str>) -> Result<String, GenError> {
        let messages = vec![
            Self::system_message(&self.enhance_instruction)?,
            Self::user_message(text, image)?,
        ];
        self.complete(messages).await
    }
}

#[async_trait]
impl Translator for OpenAiPromptAssist {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, GenError> {
        let instruction = format!(
            "Translate the user's text to the language with code '{}'. Keep names, \
             placeholders and punctuation. Reply with the translation only.",
            target_lang
        );
        let messages = vec![
            Self::system_message(&instruction)?,
            Self::user_message(text, None)?,
        ];
        self.complete(messages).await
    }
}

/// Builder for the prompt assist client
#[derive(Default)]
pub struct OpenAiBuilder {
    api_key: Option<String>,
    api_base: Option<String>,
    org_id: Option<String>,
    model: Option<String>,
    enhance_instruction: Option<String>,
}

impl OpenAiBuilder {
    /// Set API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set API base URL (for OpenAI-compatible APIs like DeepSeek)
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = Some(api_base.into());
        self
    }

    /// Set organization ID
    pub fn organization(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Chat model used for both enhancement and translation
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Replace the enhancement system instruction
    pub fn enhance_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.enhance_instruction = Some(instruction.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<OpenAiPromptAssist, GenError> {
        self.build_with_id("openai", "OpenAI")
    }

    /// Build a client with a custom provider ID and name, for
    /// OpenAI-compatible endpoints
    pub fn build_with_id(
        self,
        provider_id: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Result<OpenAiPromptAssist, GenError> {
        let api_key = self
            .api_key
            .ok_or_else(|| GenError::configuration("API key is required"))?;

        let mut config = OpenAIConfig::new().with_api_key(api_key);

        if let Some(api_base) = self.api_base {
            config = config.with_api_base(api_base);
        }

        if let Some(org_id) = self.org_id {
            config = config.with_org_id(org_id);
        }

        Ok(OpenAiPromptAssist {
            client: Client::with_config(config),
            model: self.model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            enhance_instruction: self
                .enhance_instruction
                .unwrap_or_else(|| DEFAULT_ENHANCE_INSTRUCTION.to_string()),
            info: Arc::new(ProviderInfo {
                id: provider_id.into(),
                name: provider_name.into(),
            }),
        })
    }
}
