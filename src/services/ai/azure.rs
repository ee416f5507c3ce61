use async_trait::async_trait;

use super::openai::{chat_completion_body, read_chat_completion};
use super::{ChatMessage, CompletionOptions, LlmProvider};
use crate::errors::GatewayError;

pub struct AzureOpenAiProvider {
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    client: reqwest::Client,
}

impl AzureOpenAiProvider {
    pub fn new(endpoint: String, api_key: String, deployment: String, api_version: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            deployment,
            api_version,
            client: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.endpoint, self.deployment
        )
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, GatewayError> {
        let body = chat_completion_body(system_prompt, messages, options);

        let resp = self
            .client
            .post(self.completions_url())
            .query(&[("api-version", self.api_version.as_str())])
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        read_chat_completion(resp).await
    }
}
