//! The chat relay: credential check, caller resolution, credit check,
//! upstream completion, credit deduction, in that order.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::completion::{CompletionProvider, TextStream};
use crate::credits::Credits;
use crate::error::RelayError;
use crate::identity::{IdentityProvider, SessionCredentials};
use crate::protocol::{ChatCompletionRequest, ChatRequest};

#[derive(Clone)]
pub struct ChatRelay {
    identity: Arc<dyn IdentityProvider>,
    completion: Arc<dyn CompletionProvider>,
    model: String,
}

impl ChatRelay {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        completion: Arc<dyn CompletionProvider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            completion,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Relay one conversation. `body` is parsed only after the caller has
    /// been authorized.
    ///
    /// A credit is consumed as soon as the provider accepts the request; the
    /// returned stream is not awaited for that.
    pub async fn relay(
        &self,
        session: &SessionCredentials,
        body: &[u8],
    ) -> Result<TextStream, RelayError> {
        if !self.completion.is_configured() {
            return Err(RelayError::MissingApiKey);
        }

        let user = self
            .identity
            .current_user(session)
            .await?
            .ok_or(RelayError::Unauthenticated)?;

        let credits = Credits::from_metadata(&user.public_metadata);
        if credits.is_exhausted() {
            return Err(RelayError::NoCredits);
        }

        let request: ChatRequest = serde_json::from_slice(body)?;
        let upstream = self
            .completion
            .create_chat_completion(&ChatCompletionRequest::streaming(
                self.model.as_str(),
                request.messages,
            ))
            .await?;

        let remaining = credits.decremented();
        match self
            .identity
            .update_public_metadata(&user.id, remaining.to_patch())
            .await
        {
            Ok(()) => debug!("User {} has {} credits left", user.id, remaining),
            Err(e) => warn!("Failed to deduct credit for user {}: {}", user.id, e),
        }

        Ok(TextStream::new(upstream))
    }

    /// Balance of the signed-in caller.
    pub async fn credits(&self, session: &SessionCredentials) -> Result<Credits, RelayError> {
        let user = self
            .identity
            .current_user(session)
            .await?
            .ok_or(RelayError::Unauthenticated)?;
        let metadata = self.identity.public_metadata(&user.id).await?;
        Ok(Credits::from_metadata(&metadata))
    }
}

impl std::fmt::Debug for ChatRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRelay")
            .field("model", &self.model)
            .field("configured", &self.completion.is_configured())
            .finish()
    }
}
