use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use super::{ChatMessage, CompletionOptions, LlmProvider};
use crate::errors::GatewayError;

/// Any OpenAI-compatible chat completions endpoint (OpenAI, Groq, vLLM, ...).
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, GatewayError> {
        let mut body = chat_completion_body(system_prompt, messages, options);
        body["model"] = json!(self.model);

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        read_chat_completion(resp).await
    }
}

/// Request body shared by OpenAI-style providers; the caller adds `model` if needed.
pub(crate) fn chat_completion_body(
    system_prompt: &str,
    messages: &[ChatMessage],
    options: &CompletionOptions,
) -> serde_json::Value {
    let mut chat_messages = vec![json!({
        "role": "system",
        "content": system_prompt,
    })];

    for msg in messages {
        chat_messages.push(json!({
            "role": msg.role,
            "content": msg.content,
        }));
    }

    let mut body = json!({
        "messages": chat_messages,
        "temperature": options.temperature,
        "max_tokens": options.max_tokens,
    });

    if options.json_mode {
        body["response_format"] = json!({ "type": "json_object" });
    }

    body
}

pub(crate) async fn read_chat_completion(resp: reqwest::Response) -> Result<String, GatewayError> {
    let status = resp.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(GatewayError::RateLimited);
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GatewayError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let data: serde_json::Value = resp.json().await?;

    data["choices"][0]["message"]["content"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
        .ok_or(GatewayError::EmptyResponse)
}
