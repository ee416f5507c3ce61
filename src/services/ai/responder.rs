use std::sync::Arc;
use std::time::Duration;

use crate::errors::GatewayError;
use crate::models::Message;
use crate::services::ai::{ChatMessage, CompletionOptions, LlmProvider};

/// Number of persisted messages handed to the model as context.
pub const CONTEXT_WINDOW: usize = 5;

const SYSTEM_PROMPT: &str = r#"You are a helpful AI appointment assistant. You help users schedule medical appointments and answer questions about their calendar.
Be friendly, professional, and concise in your responses.
Reply in the same language the user writes in.
If a user asks about scheduling an appointment, acknowledge their request and ask for the type of appointment, the date and the time."#;

pub const UNAVAILABLE_REPLY: &str =
    "I apologize, but I'm experiencing some technical difficulties. Please try again later.";

/// Plain conversational replies, used when no appointment was booked.
pub struct ChatResponder {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl ChatResponder {
    pub fn new(llm: Arc<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// `history` is oldest first and ends with the message being answered. Never fails.
    pub async fn reply(&self, history: &[Message]) -> String {
        let messages: Vec<ChatMessage> = history
            .iter()
            .map(|m| ChatMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        let options = CompletionOptions {
            temperature: 0.7,
            max_tokens: 300,
            json_mode: false,
        };

        let result = tokio::time::timeout(
            self.timeout,
            self.llm.chat(SYSTEM_PROMPT, &messages, &options),
        )
        .await
        .unwrap_or(Err(GatewayError::Timeout(self.timeout)));

        match result {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                tracing::error!(error = %e, "failed to generate chat response");
                UNAVAILABLE_REPLY.to_string()
            }
        }
    }
}
