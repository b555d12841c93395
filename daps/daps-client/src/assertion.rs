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
//! Client assertion sent to the DAPS token endpoint.

use std::time::{Duration, SystemTime};

use ids_sdk_token_validator::claims::{Audience, DatClaims};
use jsonwebtoken::{Algorithm, EncodingKey, errors::Error as JwtError};
use serde::Serialize;
use serde_json::Value;

/// Audience of client assertions and DATs.
pub const IDS_CONNECTORS_ALL: &str = "idsc:IDS_CONNECTORS_ALL";
/// JSON-LD context of client assertions.
pub const IDS_CONTEXT: &str = "https://w3id.org/idsa/contexts/context.jsonld";
/// `@type` of client assertions.
pub const DAT_REQUEST_TOKEN_TYPE: &str = "ids:DatRequestToken";
/// OAuth grant type used for the DAT request.
pub const CLIENT_CREDENTIALS_GRANT_TYPE: &str = "client_credentials";
/// OAuth client assertion type used for the DAT request.
pub const JWT_BEARER_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
/// Scope requested from the DAPS.
pub const IDS_CONNECTOR_ATTRIBUTES_ALL: &str = "idsc:IDS_CONNECTOR_ATTRIBUTES_ALL";

/// Clock skew allowance: the assertion is valid from 10 seconds in the past.
const BACKDATE: Duration = Duration::from_secs(10);
/// Lifetime of an assertion.
const LIFETIME: Duration = Duration::from_secs(10 * 60);

/// Signing key of the connector and the algorithm it is used with.
#[derive(Clone)]
pub struct AssertionSigner {
    algorithm: Algorithm,
    key: EncodingKey,
}

impl AssertionSigner {
    /// Creates a signer.
    pub fn new(algorithm: Algorithm, key: EncodingKey) -> Self {
        Self { algorithm, key }
    }

    /// Loads a PEM private key. Ed25519 (PKCS#8) keys sign with EdDSA, RSA keys with RS256.
    pub fn from_pem(pem: &[u8]) -> Result<Self, JwtError> {
        match EncodingKey::from_ed_pem(pem) {
            Ok(key) => Ok(Self::new(Algorithm::EdDSA, key)),
            Err(_) => Ok(Self::new(Algorithm::RS256, EncodingKey::from_rsa_pem(pem)?)),
        }
    }

    /// The signature algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

/// Builds the claims of a client assertion for `fingerprint` at `now`.
pub fn assertion_claims(fingerprint: &str, now: SystemTime) -> DatClaims {
    let mut claims = DatClaims::new(fingerprint, fingerprint, now - BACKDATE, LIFETIME + BACKDATE);
    claims.aud = Some(Audience::Single(IDS_CONNECTORS_ALL.to_string()));
    claims
        .extra
        .insert("@context".to_string(), Value::from(IDS_CONTEXT));
    claims
        .extra
        .insert("@type".to_string(), Value::from(DAT_REQUEST_TOKEN_TYPE));
    claims
}

/// Builds and signs a client assertion.
pub fn sign_assertion(
    fingerprint: &str,
    now: SystemTime,
    signer: &AssertionSigner,
) -> Result<String, JwtError> {
    assertion_claims(fingerprint, now).sign(signer.algorithm, None, &signer.key)
}

/// Form body of a DAT request.
#[derive(Debug, Clone, Serialize)]
pub struct DatRequestForm<'a> {
    /// Always [CLIENT_CREDENTIALS_GRANT_TYPE].
    pub grant_type: &'a str,
    /// Always [JWT_BEARER_ASSERTION_TYPE].
    pub client_assertion_type: &'a str,
    /// The signed client assertion.
    pub client_assertion: &'a str,
    /// Always [IDS_CONNECTOR_ATTRIBUTES_ALL].
    pub scope: &'a str,
}

impl<'a> DatRequestForm<'a> {
    /// Creates the form for `client_assertion`.
    pub fn new(client_assertion: &'a str) -> Self {
        Self {
            grant_type: CLIENT_CREDENTIALS_GRANT_TYPE,
            client_assertion_type: JWT_BEARER_ASSERTION_TYPE,
            client_assertion,
            scope: IDS_CONNECTOR_ATTRIBUTES_ALL,
        }
    }
}

#[cfg(test)]
mod tests {
    use ids_sdk_token_validator::{
        claims::unix_seconds,
        keys::{VerificationKey, insecure_ed25519_key_pair_pem, insecure_ed25519_signing_key},
        validator::{DatValidator, TokenValidator},
    };

    use super::*;

    #[test]
    fn claims_follow_daps_conventions() {
        let now = SystemTime::now();
        let claims = assertion_claims("AA:keyid:BB", now);

        assert_eq!(claims.iss, "AA:keyid:BB");
        assert_eq!(claims.sub, "AA:keyid:BB");
        assert_eq!(claims.iat, unix_seconds(now) - 10);
        assert_eq!(claims.nbf, claims.iat);
        assert_eq!(claims.exp, unix_seconds(now) + 600);
        assert_eq!(
            claims.aud,
            Some(Audience::Single("idsc:IDS_CONNECTORS_ALL".to_string()))
        );
        assert_eq!(claims.extra["@type"], "ids:DatRequestToken");
        assert_eq!(
            claims.extra["@context"],
            "https://w3id.org/idsa/contexts/context.jsonld"
        );
    }

    #[test]
    fn signed_assertion_verifies() {
        let (private_pem, _) = insecure_ed25519_key_pair_pem(7).unwrap();
        let signer = AssertionSigner::from_pem(private_pem.to_string().as_bytes()).unwrap();
        assert_eq!(signer.algorithm(), Algorithm::EdDSA);

        let now = SystemTime::now();
        let assertion = sign_assertion("AA:keyid:BB", now, &signer).unwrap();

        let key =
            VerificationKey::ed25519("client", &insecure_ed25519_signing_key(7).verifying_key())
                .unwrap();
        let claims = DatValidator::new()
            .validate(now, &assertion, &[key], None)
            .unwrap();
        assert_eq!(claims.sub, "AA:keyid:BB");
    }

    #[test]
    fn form_has_fixed_fields() {
        let form = serde_json::to_value(DatRequestForm::new("jwt")).unwrap();
        assert_eq!(form["grant_type"], "client_credentials");
        assert_eq!(
            form["client_assertion_type"],
            "urn:ietf:params:oauth:client-assertion-type:jwt-bearer"
        );
        assert_eq!(form["client_assertion"], "jwt");
        assert_eq!(form["scope"], "idsc:IDS_CONNECTOR_ATTRIBUTES_ALL");
    }
}
