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
//! DAT claims.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, errors::Error as JwtError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The audience of a JWT, either a single value or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience.
    Single(String),
    /// Multiple audiences.
    Many(Vec<String>),
}

impl Audience {
    /// Returns true if `aud` is one of the audiences.
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::Single(a) => a == aud,
            Audience::Many(all) => all.iter().any(|a| a == aud),
        }
    }
}

/// Decoded body of a Dynamic Attribute Token.
///
/// Timestamps are seconds since the UNIX epoch. Attributes that are not modelled explicitly are
/// kept in [DatClaims::extra].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatClaims {
    /// Issuer, the DAPS.
    pub iss: String,
    /// Subject, the connector fingerprint.
    pub sub: String,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    /// Issued at.
    pub iat: i64,
    /// Not before.
    pub nbf: i64,
    /// Expiration.
    pub exp: i64,
    /// Security profile registered for the connector
    /// (e.g. `idsc:BASE_SECURITY_PROFILE`).
    #[serde(
        rename = "securityProfile",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub security_profile: Option<String>,
    /// Connector that the token was issued for.
    #[serde(
        rename = "referringConnector",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub referring_connector: Option<String>,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Every other attribute of the token (`@context`, `@type`, `transportCertsSha256`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatClaims {
    /// Creates claims valid from `now` for `lifetime`.
    pub fn new(
        issuer: impl Into<String>,
        subject: impl Into<String>,
        now: SystemTime,
        lifetime: Duration,
    ) -> Self {
        let iat = unix_seconds(now);
        Self {
            iss: issuer.into(),
            sub: subject.into(),
            aud: None,
            iat,
            nbf: iat,
            exp: iat.saturating_add(lifetime.as_secs() as i64),
            security_profile: None,
            referring_connector: None,
            scopes: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Returns the expiration as [SystemTime].
    pub fn exp_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.exp.max(0) as u64)
    }

    /// Signs the claims as compact JWS.
    pub fn sign(
        &self,
        algorithm: Algorithm,
        key_id: Option<&str>,
        key: &EncodingKey,
    ) -> Result<String, JwtError> {
        let mut header = Header::new(algorithm);
        header.kid = key_id.map(ToOwned::to_owned);
        jsonwebtoken::encode(&header, self, key)
    }
}

/// Converts `time` to seconds since the UNIX epoch. Times before the epoch map to 0.
pub fn unix_seconds(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
