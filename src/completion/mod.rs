//! Streaming chat completion provider.

pub mod openai;
pub mod stream;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

pub use openai::OpenAIClient;
pub use stream::{SseDecoder, SseEvent, TextStream};

use crate::protocol::ChatCompletionRequest;

/// Raw provider response body, as it arrives on the wire.
pub type RawCompletionStream = Pin<Box<dyn Stream<Item = Result<Bytes, CompletionError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Missing OpenAI API Key.")]
    MissingApiKey,

    #[error("Failed to reach completion provider: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{status} {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    Stream(String),
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Whether a credential is available to call the provider.
    fn is_configured(&self) -> bool;

    /// Start a streaming completion. Resolves once the provider has accepted
    /// the request; the body is consumed through the returned stream.
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<RawCompletionStream, CompletionError>;
}
