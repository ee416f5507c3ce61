use async_trait::async_trait;
use serde_json::json;

use super::{ChatMessage, CompletionOptions, LlmProvider};
use crate::errors::GatewayError;

pub struct OllamaProvider {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, GatewayError> {
        let mut ollama_messages = vec![json!({
            "role": "system",
            "content": system_prompt,
        })];

        for msg in messages {
            ollama_messages.push(json!({
                "role": msg.role,
                "content": msg.content,
            }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": ollama_messages,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        });

        if options.json_mode {
            body["format"] = json!("json");
        }

        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = resp.json().await?;

        data["message"]["content"]
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
            .ok_or(GatewayError::EmptyResponse)
    }
}
