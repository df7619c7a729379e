use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{IdentityError, IdentityProvider, SessionCredentials, User};
use crate::credits::PublicMetadata;

/// In-process identity store: session tokens map to user ids, user ids to
/// public metadata.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    sessions: RwLock<HashMap<String, String>>,
    users: RwLock<HashMap<String, PublicMetadata>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user_id: impl Into<String>, public_metadata: PublicMetadata) {
        self.users
            .write()
            .await
            .insert(user_id.into(), public_metadata);
    }

    pub async fn insert_session(&self, token: impl Into<String>, user_id: impl Into<String>) {
        self.sessions
            .write()
            .await
            .insert(token.into(), user_id.into());
    }

    /// Current value of one metadata entry, for inspection.
    pub async fn metadata_value(&self, user_id: &str, key: &str) -> Option<Value> {
        self.users
            .read()
            .await
            .get(user_id)
            .and_then(|metadata| metadata.get(key).cloned())
    }

    fn unknown_user(user_id: &str) -> IdentityError {
        IdentityError::Api {
            status: 404,
            message: format!("User {} not found", user_id),
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn current_user(
        &self,
        session: &SessionCredentials,
    ) -> Result<Option<User>, IdentityError> {
        let Some(token) = session.token() else {
            return Ok(None);
        };
        let Some(user_id) = self.sessions.read().await.get(token).cloned() else {
            return Ok(None);
        };
        Ok(self
            .users
            .read()
            .await
            .get(&user_id)
            .map(|metadata| User {
                id: user_id.clone(),
                public_metadata: metadata.clone(),
            }))
    }

    async fn public_metadata(&self, user_id: &str) -> Result<PublicMetadata, IdentityError> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| Self::unknown_user(user_id))
    }

    async fn update_public_metadata(
        &self,
        user_id: &str,
        patch: PublicMetadata,
    ) -> Result<(), IdentityError> {
        let mut users = self.users.write().await;
        let metadata = users
            .get_mut(user_id)
            .ok_or_else(|| Self::unknown_user(user_id))?;
        metadata.extend(patch);
        Ok(())
    }
}
