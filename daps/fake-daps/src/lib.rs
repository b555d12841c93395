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
//! A fake DAPS for tests and local setups.
//!
//! [FakeDaps] issues DATs signed with an Ed25519 key for client assertions and serves the
//! matching JWK set. Client assertions of registered clients are verified against the client's
//! key; unknown clients are accepted if configured. It talks the DAPS wire protocol, see
//! [api::start].

use std::{
    collections::HashMap,
    sync::{
        RwLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use ed25519_dalek::SigningKey;
use ids_sdk_token_validator::{
    claims::{Audience, DatClaims},
    keys::{
        JwkError, VerificationKey, ed25519_encoding_key, ed25519_jwk,
        insecure_ed25519_signing_key,
    },
    profile::SecurityProfile,
    validator::{DatValidator, TokenValidator},
};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Validation, decode, errors::Error as JwtError,
    jwk::JwkSet,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod api;

/// Default issuer of the fake DAPS.
pub const FAKE_DAPS_ISSUER: &str = "https://daps.fake.local";
/// Default key id of the fake DAPS signing key.
pub const FAKE_DAPS_KID: &str = "fake-daps";

const CLIENT_CREDENTIALS_GRANT_TYPE: &str = "client_credentials";
const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const IDS_CONNECTORS_ALL: &str = "idsc:IDS_CONNECTORS_ALL";
const IDS_CONNECTOR_ATTRIBUTES_ALL: &str = "idsc:IDS_CONNECTOR_ATTRIBUTES_ALL";
const IDS_CONTEXT: &str = "https://w3id.org/idsa/contexts/context.jsonld";
const DAT_PAYLOAD_TYPE: &str = "ids:DatPayload";

/// DAT request as posted by a connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Must be `client_credentials`.
    pub grant_type: String,
    /// Must be the JWT bearer assertion type.
    pub client_assertion_type: String,
    /// The signed client assertion.
    pub client_assertion: String,
    /// Requested scope.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Successful DAT response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The DAT.
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: String,
    /// Lifetime of the DAT in seconds.
    pub expires_in: u64,
    /// Granted scope.
    pub scope: String,
}

/// Reasons a DAT request is refused.
#[derive(Debug, Error, PartialEq)]
pub enum IssueError {
    /// The grant type is not `client_credentials`.
    #[error("unsupported grant type: {0}")]
    UnsupportedGrantType(String),
    /// The client assertion type is not the JWT bearer type.
    #[error("unsupported client assertion type: {0}")]
    UnsupportedAssertionType(String),
    /// The client assertion cannot be decoded or does not verify.
    #[error("invalid client assertion: {0}")]
    InvalidAssertion(String),
    /// The client is not registered and unknown clients are refused.
    #[error("unknown client: {0}")]
    UnknownClient(String),
    /// The DAT cannot be signed.
    #[error("signing DAT failed: {0}")]
    Signing(#[from] JwtError),
}

/// A client known to the fake DAPS.
#[derive(Debug, Clone, Default)]
pub struct FakeClient {
    /// Key the client assertions must verify against. If `None` the signature is not checked.
    pub key: Option<VerificationKey>,
    /// `referringConnector` claim of DATs issued to the client.
    pub referring_connector: Option<String>,
    /// Security profile of DATs issued to the client. Falls back to
    /// [FakeDapsConfig::default_security_profile].
    pub security_profile: Option<SecurityProfile>,
}

/// Configuration of a [FakeDaps].
#[derive(Debug, Clone)]
pub struct FakeDapsConfig {
    /// `iss` of issued DATs.
    pub issuer: String,
    /// Key id of the signing key in the JWK set.
    pub kid: String,
    /// Signing key.
    pub signing_key: SigningKey,
    /// Lifetime of issued DATs.
    pub token_lifetime: Duration,
    /// Security profile of clients without their own.
    pub default_security_profile: SecurityProfile,
    /// Whether unregistered clients get a DAT.
    pub accept_unknown_clients: bool,
}

impl Default for FakeDapsConfig {
    fn default() -> Self {
        Self {
            issuer: FAKE_DAPS_ISSUER.to_string(),
            kid: FAKE_DAPS_KID.to_string(),
            signing_key: insecure_ed25519_signing_key(42),
            token_lifetime: Duration::from_secs(3600),
            default_security_profile: SecurityProfile::Base,
            accept_unknown_clients: true,
        }
    }
}

/// Errors creating a [FakeDaps].
#[derive(Debug, Error)]
pub enum FakeDapsError {
    /// The signing key cannot be encoded.
    #[error("invalid signing key: {0}")]
    SigningKey(#[from] ed25519_dalek::pkcs8::Error),
    /// The verification key cannot be derived.
    #[error("invalid verification key: {0}")]
    VerificationKey(#[from] JwkError),
}

/// The fake DAPS.
pub struct FakeDaps {
    config: FakeDapsConfig,
    encoding_key: EncodingKey,
    verification_key: VerificationKey,
    clients: RwLock<HashMap<String, FakeClient>>,
    validator: DatValidator,
    issued: AtomicUsize,
}

impl FakeDaps {
    /// Creates a fake DAPS.
    pub fn new(config: FakeDapsConfig) -> Result<Self, FakeDapsError> {
        let encoding_key = ed25519_encoding_key(&config.signing_key)?;
        let verification_key =
            VerificationKey::ed25519(config.kid.clone(), &config.signing_key.verifying_key())?;
        Ok(Self {
            config,
            encoding_key,
            verification_key,
            clients: RwLock::new(HashMap::new()),
            validator: DatValidator::new(),
            issued: AtomicUsize::new(0),
        })
    }

    /// Registers a client under its id (the connector fingerprint).
    pub fn register_client(&self, client_id: impl Into<String>, client: FakeClient) {
        let mut clients = self
            .clients
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        clients.insert(client_id.into(), client);
    }

    /// The issuer name.
    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    /// The JWK set containing the signing key.
    pub fn jwks(&self) -> JwkSet {
        JwkSet {
            keys: vec![ed25519_jwk(
                self.config.kid.clone(),
                &self.config.signing_key.verifying_key(),
            )],
        }
    }

    /// Key to validate issued DATs with.
    pub fn verification_key(&self) -> VerificationKey {
        self.verification_key.clone()
    }

    /// Number of DATs issued so far.
    pub fn issued_count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    /// Handles a DAT request at time `now`.
    pub fn issue(&self, req: &TokenRequest, now: SystemTime) -> Result<TokenResponse, IssueError> {
        if req.grant_type != CLIENT_CREDENTIALS_GRANT_TYPE {
            return Err(IssueError::UnsupportedGrantType(req.grant_type.clone()));
        }
        if req.client_assertion_type != JWT_BEARER_ASSERTION_TYPE {
            return Err(IssueError::UnsupportedAssertionType(
                req.client_assertion_type.clone(),
            ));
        }

        let client_id = assertion_subject(&req.client_assertion)
            .map_err(|e| IssueError::InvalidAssertion(e.to_string()))?;

        let client = {
            let clients = self
                .clients
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            clients.get(&client_id).cloned()
        };

        let client = match client {
            Some(client) => {
                if let Some(key) = &client.key {
                    self.validator
                        .validate(now, &req.client_assertion, std::slice::from_ref(key), None)
                        .map_err(|e| IssueError::InvalidAssertion(e.to_string()))?;
                }
                client
            }
            None if self.config.accept_unknown_clients => {
                tracing::debug!(%client_id, "Issuing DAT to unregistered client");
                FakeClient::default()
            }
            None => return Err(IssueError::UnknownClient(client_id)),
        };

        let scope = req
            .scope
            .clone()
            .unwrap_or_else(|| IDS_CONNECTOR_ATTRIBUTES_ALL.to_string());

        let mut claims = DatClaims::new(
            self.config.issuer.clone(),
            client_id,
            now,
            self.config.token_lifetime,
        );
        claims.aud = Some(Audience::Single(IDS_CONNECTORS_ALL.to_string()));
        claims.security_profile = Some(
            client
                .security_profile
                .unwrap_or(self.config.default_security_profile)
                .iri(),
        );
        claims.referring_connector = client.referring_connector;
        claims.scopes = vec![scope.clone()];
        claims
            .extra
            .insert("@context".to_string(), Value::from(IDS_CONTEXT));
        claims
            .extra
            .insert("@type".to_string(), Value::from(DAT_PAYLOAD_TYPE));

        let access_token = claims.sign(
            Algorithm::EdDSA,
            Some(&self.config.kid),
            &self.encoding_key,
        )?;
        self.issued.fetch_add(1, Ordering::SeqCst);

        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
            expires_in: self.config.token_lifetime.as_secs(),
            scope,
        })
    }
}

/// Reads the subject of an assertion without verifying it.
fn assertion_subject(assertion: &str) -> Result<String, JwtError> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<DatClaims>(assertion, &DecodingKey::from_secret(b""), &validation)?;
    Ok(data.claims.sub)
}
