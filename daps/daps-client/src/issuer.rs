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
//! DAT acquisition from a DAPS.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use ids_sdk_token_validator::{
    claims::unix_seconds,
    keys::KeyProvider,
    validator::{DatValidator, TokenValidator},
};
use jsonwebtoken::errors::Error as JwtError;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::{
    DeploymentMode, INVALID_TOKEN,
    assertion::{AssertionSigner, DatRequestForm, sign_assertion},
    fingerprint::{FingerprintError, fingerprint_from_pem},
    token_provider::TokenProvider,
};

/// Default remaining lifetime below which a cached DAT is replaced.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(30);
/// Default timeout of DAPS requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors obtaining a DAT.
#[derive(Debug, Error)]
pub enum DapsError {
    /// The connector certificate lacks an extension needed for the fingerprint.
    #[error("certificate has no {0} extension")]
    MissingCertificateExtension(&'static str),
    /// The connector certificate cannot be parsed.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(der::Error),
    /// The connector private key cannot be loaded.
    #[error("invalid private key: {0}")]
    InvalidKey(JwtError),
    /// The client assertion cannot be signed.
    #[error("signing client assertion failed: {0}")]
    Signing(JwtError),
    /// The HTTP client cannot be created.
    #[error("HTTP client error: {0}")]
    HttpClient(reqwest::Error),
    /// The DAPS cannot be reached.
    #[error("DAPS at {url} unreachable: {source}")]
    Unreachable {
        /// Token endpoint.
        url: Url,
        /// Underlying error.
        source: reqwest::Error,
    },
    /// The DAPS rejected the request.
    #[error("DAPS returned status {status}: {body}")]
    DapsStatus {
        /// Returned status.
        status: StatusCode,
        /// Response body.
        body: String,
    },
    /// The DAPS response carries no token.
    #[error("DAPS response has no access token")]
    EmptyResponse,
    /// The DAPS response cannot be parsed.
    #[error("invalid DAPS response: {0}")]
    InvalidResponse(String),
}

impl From<FingerprintError> for DapsError {
    fn from(e: FingerprintError) -> Self {
        match e {
            FingerprintError::InvalidCertificate(e) => DapsError::InvalidCertificate(e),
            FingerprintError::MissingExtension(ext) => DapsError::MissingCertificateExtension(ext),
        }
    }
}

/// Identity used to authenticate to the DAPS.
#[derive(Clone)]
pub struct ConnectorCredentials {
    fingerprint: String,
    signer: AssertionSigner,
}

impl ConnectorCredentials {
    /// Creates credentials from a fingerprint and signer.
    pub fn new(fingerprint: impl Into<String>, signer: AssertionSigner) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            signer,
        }
    }

    /// Loads the credentials from a PEM certificate and a PEM private key.
    pub fn from_pem(certificate: &[u8], private_key: &[u8]) -> Result<Self, DapsError> {
        let fingerprint = fingerprint_from_pem(certificate)?;
        let signer = AssertionSigner::from_pem(private_key).map_err(DapsError::InvalidKey)?;
        Ok(Self::new(fingerprint, signer))
    }

    /// The connector fingerprint, used as DAPS client id.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Configuration of a [DapsTokenIssuer].
#[derive(Debug, Clone)]
pub struct DapsIssuerConfig {
    /// DAPS token endpoint.
    pub token_url: Url,
    /// Deployment mode.
    pub mode: DeploymentMode,
    /// Cached tokens are replaced once they expire in less than this.
    pub refresh_margin: Duration,
    /// Timeout of the token request.
    pub timeout: Duration,
}

impl DapsIssuerConfig {
    /// Creates a configuration with default margin and timeout.
    pub fn new(token_url: Url, mode: DeploymentMode) -> Self {
        Self {
            token_url,
            mode,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DatResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Obtains DATs from a DAPS and caches them.
///
/// A cached token is reused while it validates against the DAPS keys and expires later than the
/// refresh margin. Concurrent callers wait for a single request.
pub struct DapsTokenIssuer {
    client: reqwest::Client,
    config: DapsIssuerConfig,
    credentials: ConnectorCredentials,
    keys: Arc<dyn KeyProvider>,
    validator: DatValidator,
    cached: Mutex<Option<String>>,
}

impl DapsTokenIssuer {
    /// Creates an issuer. `keys` are the DAPS keys used to check cached tokens.
    pub fn new(
        config: DapsIssuerConfig,
        credentials: ConnectorCredentials,
        keys: Arc<dyn KeyProvider>,
    ) -> Result<Self, DapsError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DapsError::HttpClient)?;

        Ok(Self {
            client,
            config,
            credentials,
            keys,
            validator: DatValidator::new(),
            cached: Mutex::new(None),
        })
    }

    /// Returns a DAT, from the cache if possible.
    ///
    /// In [DeploymentMode::Test] failures are logged and [INVALID_TOKEN] is returned.
    pub async fn get_dat(&self) -> Result<String, DapsError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_deref() {
            if self.is_reusable(token).await {
                tracing::trace!("Reusing cached DAT");
                return Ok(token.to_string());
            }
        }

        match self.request_dat().await {
            Ok(token) => {
                *cached = Some(token.clone());
                Ok(token)
            }
            Err(e) if self.config.mode.is_test() => {
                tracing::warn!(error = %e, "Could not obtain DAT, using placeholder token in test deployment");
                Ok(INVALID_TOKEN.to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Requests a fresh DAT, bypassing the cache.
    pub async fn request_dat(&self) -> Result<String, DapsError> {
        let assertion = sign_assertion(
            self.credentials.fingerprint(),
            SystemTime::now(),
            &self.credentials.signer,
        )
        .map_err(DapsError::Signing)?;

        let url = self.config.token_url.clone();
        tracing::debug!(%url, client_id = %self.credentials.fingerprint(), "Requesting DAT");

        let response = self
            .client
            .post(url.clone())
            .form(&DatRequestForm::new(&assertion))
            .send()
            .await
            .map_err(|source| DapsError::Unreachable { url, source })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DapsError::DapsStatus { status, body });
        }

        let body: DatResponse = response
            .json()
            .await
            .map_err(|e| DapsError::InvalidResponse(e.to_string()))?;

        match body.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(DapsError::EmptyResponse),
        }
    }

    async fn is_reusable(&self, token: &str) -> bool {
        let now = SystemTime::now();
        let keys = self.keys.keys().await;
        match self.validator.validate(now, token, &keys, None) {
            Ok(claims) => {
                claims.exp - unix_seconds(now) > self.config.refresh_margin.as_secs() as i64
            }
            Err(e) => {
                tracing::debug!(error = %e, "Cached DAT is no longer valid");
                false
            }
        }
    }

    /// The fingerprint this issuer authenticates with.
    pub fn fingerprint(&self) -> &str {
        self.credentials.fingerprint()
    }
}

#[async_trait]
impl TokenProvider for DapsTokenIssuer {
    async fn get_token(&self) -> Result<String, DapsError> {
        self.get_dat().await
    }
}
