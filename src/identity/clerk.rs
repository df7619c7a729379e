//! Clerk backend API adapter.
//!
//! Session tokens are verified locally against the instance JWKS (RS256);
//! users and their public metadata are read and patched through the backend
//! REST API using the instance secret key.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{IdentityError, IdentityProvider, SessionCredentials, User, jwks::JwksCache};
use crate::config::ClerkConfig;
use crate::credits::PublicMetadata;

/// Claims of a Clerk session token that the relay looks at.
#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[serde(default)]
    azp: Option<String>,
    #[serde(default)]
    sid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClerkUser {
    id: String,
    #[serde(default)]
    public_metadata: PublicMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ClerkErrorBody {
    #[serde(default)]
    errors: Vec<ClerkErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ClerkErrorItem {
    #[serde(default)]
    message: String,
    #[serde(default)]
    long_message: Option<String>,
}

pub struct ClerkIdentityProvider {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
    authorized_parties: Vec<String>,
    jwks: JwksCache,
}

impl ClerkIdentityProvider {
    pub fn new(client: reqwest::Client, config: &ClerkConfig) -> Self {
        let api_url = config.api_url.trim_end_matches('/').to_string();
        let jwks = JwksCache::new(
            client.clone(),
            format!("{}/v1/jwks", api_url),
            config.secret_key.clone(),
            Duration::from_secs(config.jwks_cache_ttl_secs),
        );
        Self {
            client,
            api_url,
            secret_key: config.secret_key.clone(),
            authorized_parties: config.authorized_parties.clone(),
            jwks,
        }
    }

    fn user_url(&self, user_id: &str) -> String {
        format!("{}/v1/users/{}", self.api_url, user_id)
    }

    /// Verified claims, or `None` when the token should be treated as absent.
    async fn verify_session(&self, token: &str) -> Result<Option<SessionClaims>, IdentityError> {
        let header = match decode_header(token) {
            Ok(header) => header,
            Err(e) => {
                debug!("Rejecting malformed session token: {}", e);
                return Ok(None);
            }
        };
        if header.alg != Algorithm::RS256 {
            debug!("Rejecting session token signed with {:?}", header.alg);
            return Ok(None);
        }
        let Some(kid) = header.kid else {
            debug!("Rejecting session token without kid");
            return Ok(None);
        };
        let Some(jwk) = self.jwks.get_key(&kid).await? else {
            debug!("Rejecting session token with unknown kid {}", kid);
            return Ok(None);
        };
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| IdentityError::Jwks(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = match decode::<SessionClaims>(token, &key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!("Session token rejected: {}", e);
                return Ok(None);
            }
        };

        if !self.authorized_parties.is_empty() {
            let allowed = claims
                .azp
                .as_deref()
                .is_some_and(|azp| self.authorized_parties.iter().any(|p| p == azp));
            if !allowed {
                debug!("Session token azp {:?} is not an authorized party", claims.azp);
                return Ok(None);
            }
        }

        Ok(Some(claims))
    }

    async fn fetch_user(&self, user_id: &str) -> Result<Option<ClerkUser>, IdentityError> {
        let response = self
            .client
            .get(self.user_url(user_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        let user = response
            .json::<ClerkUser>()
            .await
            .map_err(|e| IdentityError::InvalidResponse(e.to_string()))?;
        Ok(Some(user))
    }
}

async fn ensure_success(response: Response) -> Result<Response, IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ClerkErrorBody>(&body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next())
        .map(|item| item.long_message.unwrap_or(item.message))
        .filter(|message| !message.is_empty())
        .unwrap_or(body);
    Err(IdentityError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl IdentityProvider for ClerkIdentityProvider {
    async fn current_user(
        &self,
        session: &SessionCredentials,
    ) -> Result<Option<User>, IdentityError> {
        let Some(token) = session.token() else {
            return Ok(None);
        };
        let Some(claims) = self.verify_session(token).await? else {
            return Ok(None);
        };
        debug!(
            "Session {} verified for user {}",
            claims.sid.as_deref().unwrap_or("-"),
            claims.sub
        );

        Ok(self.fetch_user(&claims.sub).await?.map(|user| User {
            id: user.id,
            public_metadata: user.public_metadata,
        }))
    }

    async fn public_metadata(&self, user_id: &str) -> Result<PublicMetadata, IdentityError> {
        self.fetch_user(user_id)
            .await?
            .map(|user| user.public_metadata)
            .ok_or_else(|| IdentityError::Api {
                status: StatusCode::NOT_FOUND.as_u16(),
                message: format!("User {} not found", user_id),
            })
    }

    async fn update_public_metadata(
        &self,
        user_id: &str,
        patch: PublicMetadata,
    ) -> Result<(), IdentityError> {
        let response = self
            .client
            .patch(format!("{}/metadata", self.user_url(user_id)))
            .bearer_auth(&self.secret_key)
            .json(&json!({ "public_metadata": patch }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

impl std::fmt::Debug for ClerkIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClerkIdentityProvider")
            .field("api_url", &self.api_url)
            .field("jwks_uri", &self.jwks.jwks_uri())
            .field("authorized_parties", &self.authorized_parties)
            .finish()
    }
}
