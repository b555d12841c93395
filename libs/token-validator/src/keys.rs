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
//! Verification keys and key providers.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{
    SigningKey, VerifyingKey,
    pkcs8::{EncodePrivateKey, EncodePublicKey},
};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey,
    errors::Error as JwtError,
    jwk::{
        AlgorithmParameters, CommonParameters, EllipticCurve, Jwk, KeyAlgorithm,
        OctetKeyPairParameters, OctetKeyPairType,
    },
};
use pem::Pem;
use thiserror::Error;

/// A public key that may have signed a DAT.
#[derive(Clone)]
pub struct VerificationKey {
    /// Key id as published by the DAPS.
    pub kid: String,
    /// Signature algorithm used with this key.
    pub algorithm: Algorithm,
    /// The key material.
    pub key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Errors converting a JWK to a [VerificationKey].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JwkError {
    /// The JWK has no `kid`.
    #[error("JWK has no key id")]
    MissingKeyId,
    /// The JWK names an algorithm that cannot verify signatures, or the key type has no default
    /// algorithm.
    #[error("unsupported JWK algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// The key material is invalid.
    #[error("invalid JWK: {0}")]
    Invalid(#[from] JwtError),
}

impl VerificationKey {
    /// Creates a key from an Ed25519 public key.
    pub fn ed25519(kid: impl Into<String>, key: &VerifyingKey) -> Result<Self, JwkError> {
        let x = URL_SAFE_NO_PAD.encode(key.as_bytes());
        Ok(Self {
            kid: kid.into(),
            algorithm: Algorithm::EdDSA,
            key: DecodingKey::from_ed_components(&x)?,
        })
    }

    /// Converts a JWK. The algorithm is taken from `alg` where present, otherwise derived from
    /// the key type.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, JwkError> {
        let kid = jwk.common.key_id.clone().ok_or(JwkError::MissingKeyId)?;
        let algorithm = match jwk.common.key_algorithm {
            Some(alg) => signing_algorithm(alg)?,
            None => default_algorithm(&jwk.algorithm)?,
        };
        let key = DecodingKey::from_jwk(jwk)?;
        Ok(Self {
            kid,
            algorithm,
            key,
        })
    }
}

fn signing_algorithm(alg: KeyAlgorithm) -> Result<Algorithm, JwkError> {
    let algorithm = match alg {
        KeyAlgorithm::HS256 => Algorithm::HS256,
        KeyAlgorithm::HS384 => Algorithm::HS384,
        KeyAlgorithm::HS512 => Algorithm::HS512,
        KeyAlgorithm::ES256 => Algorithm::ES256,
        KeyAlgorithm::ES384 => Algorithm::ES384,
        KeyAlgorithm::RS256 => Algorithm::RS256,
        KeyAlgorithm::RS384 => Algorithm::RS384,
        KeyAlgorithm::RS512 => Algorithm::RS512,
        KeyAlgorithm::PS256 => Algorithm::PS256,
        KeyAlgorithm::PS384 => Algorithm::PS384,
        KeyAlgorithm::PS512 => Algorithm::PS512,
        KeyAlgorithm::EdDSA => Algorithm::EdDSA,
        other => return Err(JwkError::UnsupportedAlgorithm(format!("{other:?}"))),
    };
    Ok(algorithm)
}

fn default_algorithm(params: &AlgorithmParameters) -> Result<Algorithm, JwkError> {
    match params {
        AlgorithmParameters::RSA(_) => Ok(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(ec) => {
            match ec.curve {
                EllipticCurve::P256 => Ok(Algorithm::ES256),
                EllipticCurve::P384 => Ok(Algorithm::ES384),
                ref other => Err(JwkError::UnsupportedAlgorithm(format!("{other:?}"))),
            }
        }
        AlgorithmParameters::OctetKeyPair(_) => Ok(Algorithm::EdDSA),
        AlgorithmParameters::OctetKey(_) => {
            Err(JwkError::UnsupportedAlgorithm(
                "symmetric key without alg".to_string(),
            ))
        }
    }
}

/// Source of the candidate keys a DAT is validated against.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Returns the current key set, in configuration order. The set may be empty if no key
    /// could be obtained.
    async fn keys(&self) -> Arc<[VerificationKey]>;

    /// Drops any cached keys so that the next call to [KeyProvider::keys] fetches them again.
    async fn invalidate(&self) {}
}

/// Serves a fixed key set.
#[derive(Debug, Clone)]
pub struct StaticKeyProvider {
    keys: Arc<[VerificationKey]>,
}

impl StaticKeyProvider {
    /// Creates a provider for the given keys.
    pub fn new(keys: impl Into<Arc<[VerificationKey]>>) -> Self {
        Self { keys: keys.into() }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn keys(&self) -> Arc<[VerificationKey]> {
        self.keys.clone()
    }
}

/// Returns the public JWK of an Ed25519 key.
pub fn ed25519_jwk(kid: impl Into<String>, key: &VerifyingKey) -> Jwk {
    Jwk {
        common: CommonParameters {
            key_id: Some(kid.into()),
            key_algorithm: Some(KeyAlgorithm::EdDSA),
            ..Default::default()
        },
        algorithm: AlgorithmParameters::OctetKeyPair(OctetKeyPairParameters {
            key_type: OctetKeyPairType::OctetKeyPair,
            curve: EllipticCurve::Ed25519,
            x: URL_SAFE_NO_PAD.encode(key.as_bytes()),
        }),
    }
}

/// Returns the `jsonwebtoken` signing key of an Ed25519 key.
pub fn ed25519_encoding_key(key: &SigningKey) -> Result<EncodingKey, ed25519_dalek::pkcs8::Error> {
    let der = key.to_pkcs8_der()?;
    Ok(EncodingKey::from_ed_der(der.as_bytes()))
}

/// Returns a deterministic Ed25519 signing key derived from `seed`. For tests and local setups
/// only.
pub fn insecure_ed25519_signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Returns the deterministic key pair for `seed` as PKCS#8 and SPKI PEM.
pub fn insecure_ed25519_key_pair_pem(seed: u8) -> Result<(Pem, Pem), ed25519_dalek::pkcs8::Error> {
    let signing_key = insecure_ed25519_signing_key(seed);
    let private_der = signing_key.to_pkcs8_der()?;
    let public_der = signing_key
        .verifying_key()
        .to_public_key_der()
        .map_err(ed25519_dalek::pkcs8::Error::from)?;

    Ok((
        Pem::new("PRIVATE KEY", private_der.as_bytes()),
        Pem::new("PUBLIC KEY", public_der.as_bytes()),
    ))
}
