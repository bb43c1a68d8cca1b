//! # genroute providers
//!
//! Concrete boundaries for the genroute core:
//! - [`HttpGateway`]: submit and status-query client for the job gateway
//! - [`OpenAiPromptAssist`]: prompt enhancement and translation over any
//!   OpenAI-compatible chat API
//! - [`models`]: the built-in model catalog and its pricing

pub mod gateway;
pub mod models;
pub mod openai;

// Re-exports
pub use gateway::{HttpGateway, HttpGatewayBuilder};
pub use models::{default_registry, ids};
pub use openai::{OpenAiBuilder, OpenAiPromptAssist};

use genroute_core::error::GenError;

/// Create a DeepSeek-backed prompt assist (OpenAI-compatible)
///
/// DeepSeek speaks the OpenAI protocol on a different endpoint.
///
/// # Example
///
/// ```ignore
/// use genroute_provider::deepseek;
///
/// let assist = deepseek("your-api-key")?;
/// ```
pub fn deepseek(api_key: impl Into<String>) -> Result<OpenAiPromptAssist, GenError> {
    OpenAiPromptAssist::builder()
        .api_key(api_key)
        .api_base("https://api.deepseek.com/v1")
        .model("deepseek-chat")
        .build_with_id("deepseek", "DeepSeek")
}
