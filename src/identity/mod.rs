//! Identity and per-user metadata provider.
//!
//! The relay resolves the caller and reads/patches the caller's public
//! metadata through [`IdentityProvider`]. Production deployments use
//! [`ClerkIdentityProvider`]; [`MemoryIdentityProvider`] keeps everything in
//! process.

pub mod clerk;
pub mod jwks;
pub mod memory;
pub mod session;

use async_trait::async_trait;

pub use clerk::ClerkIdentityProvider;
pub use memory::MemoryIdentityProvider;
pub use session::SessionCredentials;

use crate::credits::PublicMetadata;

/// Externally owned identity record.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub public_metadata: PublicMetadata,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Identity provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to load signing keys: {0}")]
    Jwks(String),

    #[error("Invalid identity provider response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the signed-in user, `None` when the caller is anonymous or the
    /// session is not valid.
    async fn current_user(
        &self,
        session: &SessionCredentials,
    ) -> Result<Option<User>, IdentityError>;

    async fn public_metadata(&self, user_id: &str) -> Result<PublicMetadata, IdentityError>;

    /// Merge `patch` into the user's public metadata.
    async fn update_public_metadata(
        &self,
        user_id: &str,
        patch: PublicMetadata,
    ) -> Result<(), IdentityError>;
}
