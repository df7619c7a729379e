use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use tracing::debug;

use super::{CompletionError, CompletionProvider, RawCompletionStream};
use crate::config::OpenAIConfig;
use crate::protocol::{ApiErrorEnvelope, ChatCompletionRequest};

const ORGANIZATION_HEADER: &str = "OpenAI-Organization";

/// OpenAI chat completions client. Built once at startup and shared.
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: Option<String>,
    organization: Option<String>,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(config: &OpenAIConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Some(Duration::from_secs(50)))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &OpenAIConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            organization: config.organization.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Message from an OpenAI error body, or the body itself.
fn error_message(body: String) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error)
        .and_then(|error| error.message)
        .filter(|message| !message.is_empty())
        .unwrap_or(body)
}

#[async_trait]
impl CompletionProvider for OpenAIClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<RawCompletionStream, CompletionError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(CompletionError::MissingApiKey)?;

        let mut builder = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .header(ACCEPT, "text/event-stream")
            .json(request);
        if let Some(organization) = &self.organization {
            builder = builder.header(ORGANIZATION_HEADER, organization);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => format!("Failed to read upstream error body: {}", err),
            };
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: error_message(body),
            });
        }

        debug!(
            "Completion stream opened for model {} ({} messages)",
            request.model,
            request.messages.len()
        );
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(CompletionError::from));
        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("configured", &self.api_key.is_some())
            .field("organization", &self.organization)
            .finish()
    }
}
