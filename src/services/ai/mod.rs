pub mod azure;
pub mod extractor;
pub mod ollama;
pub mod openai;
pub mod responder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON-object-only completion.
    pub json_mode: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 300,
            json_mode: false,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, GatewayError>;
}
