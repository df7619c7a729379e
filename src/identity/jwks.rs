//! Signing key cache for session token verification.

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::IdentityError;

/// Maximum JWKS response size (1 MB).
const MAX_JWKS_RESPONSE_SIZE: u64 = 1024 * 1024;

/// Minimum time between refetches triggered by an unknown `kid`.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Cached key set with expiration tracking.
struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedJwks {
    fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() > self.ttl
    }
}

/// Fetches the instance key set from the identity provider's backend API and
/// keeps it for `ttl`.
pub struct JwksCache {
    client: reqwest::Client,
    jwks_uri: String,
    secret_key: String,
    cache: RwLock<Option<CachedJwks>>,
    ttl: Duration,
    last_refresh: RwLock<Option<Instant>>,
}

impl JwksCache {
    pub fn new(
        client: reqwest::Client,
        jwks_uri: impl Into<String>,
        secret_key: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            client,
            jwks_uri: jwks_uri.into(),
            secret_key: secret_key.into(),
            cache: RwLock::new(None),
            ttl,
            last_refresh: RwLock::new(None),
        }
    }

    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, IdentityError> {
        debug!("Fetching JWKS from: {}", self.jwks_uri);

        let response = self
            .client
            .get(&self.jwks_uri)
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IdentityError::Jwks(format!("HTTP {}", response.status())));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_JWKS_RESPONSE_SIZE {
                return Err(too_large(content_length));
            }
        }

        let bytes = response.bytes().await?;
        if bytes.len() as u64 > MAX_JWKS_RESPONSE_SIZE {
            return Err(too_large(bytes.len() as u64));
        }
        let jwks: JwkSet =
            serde_json::from_slice(&bytes).map_err(|e| IdentityError::Jwks(e.to_string()))?;

        debug!("Fetched JWKS with {} keys", jwks.keys.len());
        Ok(jwks)
    }

    async fn store(&self, jwks: JwkSet) {
        *self.cache.write().await = Some(CachedJwks {
            jwks,
            fetched_at: Instant::now(),
            ttl: self.ttl,
        });
    }

    async fn get_jwks(&self) -> Result<JwkSet, IdentityError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if !cached.is_expired() {
                return Ok(cached.jwks.clone());
            }
        }

        let jwks = self.fetch_jwks().await?;
        self.store(jwks.clone()).await;
        Ok(jwks)
    }

    /// Claim the refresh-on-miss slot; at most one per `MIN_REFRESH_INTERVAL`.
    async fn try_begin_refresh(&self) -> bool {
        let mut last = self.last_refresh.write().await;
        if last.is_some_and(|at| at.elapsed() < MIN_REFRESH_INTERVAL) {
            return false;
        }
        *last = Some(Instant::now());
        true
    }

    /// Key for `kid`, refetching when the cached set does not have it (keys
    /// may have been rotated). `Ok(None)` when the key is still unknown or a
    /// refetch ran too recently.
    pub async fn get_key(&self, kid: &str) -> Result<Option<Jwk>, IdentityError> {
        let jwks = self.get_jwks().await?;
        if let Some(key) = jwks.find(kid) {
            return Ok(Some(key.clone()));
        }

        if !self.try_begin_refresh().await {
            debug!("Key {} not found in cached JWKS, refresh throttled", kid);
            return Ok(None);
        }

        warn!("Key {} not found in cached JWKS, refreshing...", kid);
        let jwks = self.fetch_jwks().await?;
        let key = jwks.find(kid).cloned();
        self.store(jwks).await;
        Ok(key)
    }
}

fn too_large(size: u64) -> IdentityError {
    IdentityError::Jwks(format!(
        "Response too large: {} bytes (max: {})",
        size, MAX_JWKS_RESPONSE_SIZE
    ))
}
