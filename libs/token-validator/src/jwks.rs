// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Key provider backed by JWKS endpoints.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

use crate::keys::{JwkError, KeyProvider, VerificationKey};

/// Default timeout for JWKS requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default time after which fetching is retried when no key could be fetched.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);

/// A key to fetch: the JWKS endpoint and the key id to select from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwksSource {
    /// URL of the JWK set.
    pub url: Url,
    /// Key id inside the set.
    pub kid: String,
}

/// Errors fetching a single key.
#[derive(Debug, Error)]
pub enum KeyFetchError {
    /// The endpoint could not be reached.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Endpoint.
        url: Url,
        /// Underlying error.
        source: reqwest::Error,
    },
    /// The endpoint answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status {
        /// Endpoint.
        url: Url,
        /// Returned status.
        status: reqwest::StatusCode,
    },
    /// The body is not a JWK set.
    #[error("invalid JWK set from {url}: {source}")]
    InvalidSet {
        /// Endpoint.
        url: Url,
        /// Underlying error.
        source: reqwest::Error,
    },
    /// The set does not contain the requested key id.
    #[error("{url} has no key with id {kid}")]
    MissingKid {
        /// Endpoint.
        url: Url,
        /// Requested key id.
        kid: String,
    },
    /// The key cannot be used for verification.
    #[error("unusable key {kid}: {source}")]
    UnusableKey {
        /// Requested key id.
        kid: String,
        /// Underlying error.
        source: JwkError,
    },
}

/// Fetches one key per [JwksSource] and caches the result.
///
/// Failing sources are skipped. If no key could be fetched the empty result is cached for the
/// retry window only, so callers during a DAPS outage do not each trigger a fetch.
pub struct JwksKeyProvider {
    client: reqwest::Client,
    sources: Vec<JwksSource>,
    retry_after: Duration,
    cache: RwLock<CachedKeys>,
}

enum CachedKeys {
    Unfetched,
    Fetched(Arc<[VerificationKey]>),
    Failed { at: Instant },
}

impl CachedKeys {
    fn current(&self, retry_after: Duration) -> Option<Arc<[VerificationKey]>> {
        match self {
            Self::Unfetched => None,
            Self::Fetched(keys) => Some(keys.clone()),
            Self::Failed { at } if at.elapsed() < retry_after => Some(Arc::from(Vec::new())),
            Self::Failed { .. } => None,
        }
    }
}

impl JwksKeyProvider {
    /// Creates a provider with its own HTTP client.
    pub fn new(sources: Vec<JwksSource>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, sources))
    }

    /// Creates a provider using the given client.
    pub fn with_client(client: reqwest::Client, sources: Vec<JwksSource>) -> Self {
        Self {
            client,
            sources,
            retry_after: DEFAULT_RETRY_AFTER,
            cache: RwLock::new(CachedKeys::Unfetched),
        }
    }

    /// Sets how long an empty fetch result is served before fetching again.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// The configured sources.
    pub fn sources(&self) -> &[JwksSource] {
        &self.sources
    }

    async fn fetch(&self, source: &JwksSource) -> Result<VerificationKey, KeyFetchError> {
        let response = self
            .client
            .get(source.url.clone())
            .send()
            .await
            .map_err(|source_err| {
                KeyFetchError::Request {
                    url: source.url.clone(),
                    source: source_err,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyFetchError::Status {
                url: source.url.clone(),
                status,
            });
        }

        let set: JwkSet = response.json().await.map_err(|source_err| {
            KeyFetchError::InvalidSet {
                url: source.url.clone(),
                source: source_err,
            }
        })?;

        let jwk = set.find(&source.kid).ok_or_else(|| {
            KeyFetchError::MissingKid {
                url: source.url.clone(),
                kid: source.kid.clone(),
            }
        })?;

        VerificationKey::from_jwk(jwk).map_err(|source_err| {
            KeyFetchError::UnusableKey {
                kid: source.kid.clone(),
                source: source_err,
            }
        })
    }

    async fn fetch_all(&self) -> Vec<VerificationKey> {
        let mut keys = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match self.fetch(source).await {
                Ok(key) => keys.push(key),
                Err(e) => {
                    tracing::warn!(url = %source.url, kid = %source.kid, error = %e, "Failed to fetch DAPS key");
                }
            }
        }
        keys
    }
}

#[async_trait]
impl KeyProvider for JwksKeyProvider {
    async fn keys(&self) -> Arc<[VerificationKey]> {
        if let Some(keys) = self.cache.read().await.current(self.retry_after) {
            return keys;
        }

        let mut cache = self.cache.write().await;
        // Another caller may have fetched while we waited for the lock.
        if let Some(keys) = cache.current(self.retry_after) {
            return keys;
        }

        let keys: Arc<[VerificationKey]> = self.fetch_all().await.into();
        if keys.is_empty() {
            tracing::warn!(
                sources = self.sources.len(),
                retry_after = ?self.retry_after,
                "No DAPS key could be fetched"
            );
            *cache = CachedKeys::Failed { at: Instant::now() };
        } else {
            tracing::debug!(count = keys.len(), "Fetched DAPS keys");
            *cache = CachedKeys::Fetched(keys.clone());
        }
        keys
    }

    async fn invalidate(&self) {
        *self.cache.write().await = CachedKeys::Unfetched;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
    use jsonwebtoken::{Algorithm, jwk::JwkSet};
    use test_log::test;
    use tokio::net::TcpListener;

    use super::*;
    use crate::keys::{ed25519_jwk, insecure_ed25519_signing_key};

    #[derive(Clone)]
    struct JwksState {
        set: Arc<JwkSet>,
        hits: Arc<AtomicUsize>,
    }

    async fn jwks(State(state): State<JwksState>) -> Json<JwkSet> {
        state.hits.fetch_add(1, Ordering::SeqCst);
        Json((*state.set).clone())
    }

    async fn jwks_server() -> (SocketAddr, Arc<AtomicUsize>) {
        let set = JwkSet {
            keys: vec![
                ed25519_jwk("k1", &insecure_ed25519_signing_key(1).verifying_key()),
                ed25519_jwk("k2", &insecure_ed25519_signing_key(2).verifying_key()),
            ],
        };
        let hits = Arc::new(AtomicUsize::new(0));
        let state = JwksState {
            set: Arc::new(set),
            hits: hits.clone(),
        };
        let router = Router::new()
            .route("/jwks.json", get(jwks))
            .route("/broken", get(|| async { (StatusCode::OK, "not a key set") }))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        (addr, hits)
    }

    fn source(addr: SocketAddr, path: &str, kid: &str) -> JwksSource {
        JwksSource {
            url: Url::parse(&format!("http://{addr}{path}")).unwrap(),
            kid: kid.to_string(),
        }
    }

    #[test(tokio::test)]
    #[ntest::timeout(10_000)]
    async fn should_skip_failing_sources_and_cache() {
        let (addr, hits) = jwks_server().await;
        let provider = JwksKeyProvider::new(
            vec![
                source(addr, "/missing", "k1"),
                source(addr, "/broken", "k1"),
                source(addr, "/jwks.json", "unknown"),
                source(addr, "/jwks.json", "k2"),
                source(addr, "/jwks.json", "k1"),
            ],
            DEFAULT_TIMEOUT,
        )
        .unwrap();

        let keys = provider.keys().await;
        let kids: Vec<_> = keys.iter().map(|k| k.kid.as_str()).collect();
        assert_eq!(kids, ["k2", "k1"]);
        assert!(keys.iter().all(|k| k.algorithm == Algorithm::EdDSA));
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        // Cached.
        assert_eq!(provider.keys().await.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        provider.invalidate().await;
        assert_eq!(provider.keys().await.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 6);
    }

    #[test(tokio::test)]
    #[ntest::timeout(10_000)]
    async fn empty_result_is_retried_after_window() {
        let (addr, hits) = jwks_server().await;
        let provider = Arc::new(
            JwksKeyProvider::new(
                vec![source(addr, "/jwks.json", "unknown")],
                DEFAULT_TIMEOUT,
            )
            .unwrap()
            .with_retry_after(Duration::from_millis(300)),
        );

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.keys().await.len() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), 0);
        }
        assert!(provider.keys().await.is_empty());
        // One fetch for the whole outage window.
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(provider.keys().await.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        provider.invalidate().await;
        assert!(provider.keys().await.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test(tokio::test)]
    #[ntest::timeout(10_000)]
    async fn concurrent_callers_share_one_fetch() {
        let (addr, hits) = jwks_server().await;
        let provider = Arc::new(
            JwksKeyProvider::new(vec![source(addr, "/jwks.json", "k1")], DEFAULT_TIMEOUT)
                .unwrap(),
        );

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let provider = provider.clone();
                tokio::spawn(async move { provider.keys().await.len() })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap(), 1);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
