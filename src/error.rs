//! Outcomes of a relay request that end in an error response.

use actix_web::{HttpResponse, ResponseError, http::StatusCode, http::header::ContentType};

use crate::completion::CompletionError;
use crate::identity::IdentityError;

const FALLBACK_MESSAGE: &str = "Something went wrong!";

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Missing OpenAI API Key.")]
    MissingApiKey,

    #[error("You need to sign in first.")]
    Unauthenticated,

    #[error("You have no credits left.")]
    NoCredits,

    #[error("{}", failure_message(.0))]
    Failed(String),
}

fn failure_message(message: &str) -> &str {
    if message.is_empty() {
        FALLBACK_MESSAGE
    } else {
        message
    }
}

impl RelayError {
    pub fn failed(message: impl Into<String>) -> Self {
        RelayError::Failed(message.into())
    }
}

impl From<IdentityError> for RelayError {
    fn from(err: IdentityError) -> Self {
        RelayError::Failed(err.to_string())
    }
}

impl From<CompletionError> for RelayError {
    fn from(err: CompletionError) -> Self {
        RelayError::Failed(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Failed(err.to_string())
    }
}

impl ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MissingApiKey => StatusCode::BAD_REQUEST,
            RelayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            RelayError::NoCredits => StatusCode::PAYMENT_REQUIRED,
            RelayError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type(ContentType::plaintext())
            .body(self.to_string())
    }
}
