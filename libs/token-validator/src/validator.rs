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
//! DAT validator.

use std::{sync::Arc, time::SystemTime};

use jsonwebtoken::{Validation, decode, errors::Error as JwtError};
use thiserror::Error;

use crate::{
    claims::{DatClaims, unix_seconds},
    keys::VerificationKey,
    profile::SecurityProfile,
    rules::{DatValidationRule, RuleOutcome},
};

/// Validates a DAT and extracts the claims.
pub trait TokenValidator: Send + Sync {
    /// Validates `token` against the candidate `keys` at time `now`. If `expected_profile` is
    /// given, the registered security profile of the token must satisfy it.
    fn validate(
        &self,
        now: SystemTime,
        token: &str,
        keys: &[VerificationKey],
        expected_profile: Option<SecurityProfile>,
    ) -> Result<DatClaims, ClaimsError>;
}

/// DAT validation errors.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ClaimsError {
    /// None of the candidate keys verifies the signature. Holds the error per key, in order.
    #[error("no given signing key could validate token ({} tried)", attempts.len())]
    NoValidSigningKey {
        /// One error per candidate key.
        attempts: Vec<JwtError>,
    },
    /// The token is expired.
    #[error("token expired at {exp} (now {now})")]
    Expired {
        /// Expiration.
        exp: i64,
        /// Validation time.
        now: i64,
    },
    /// The token expires before it was issued.
    #[error("token expires at {exp} before it was issued at {iat}")]
    ExpiresBeforeIssued {
        /// Expiration.
        exp: i64,
        /// Issued at.
        iat: i64,
    },
    /// The token was issued in the future.
    #[error("token issued in the future at {iat} (now {now})")]
    IssuedInFuture {
        /// Issued at.
        iat: i64,
        /// Validation time.
        now: i64,
    },
    /// The token is not valid yet.
    #[error("token not valid before {nbf} (now {now})")]
    NotYetValid {
        /// Not before.
        nbf: i64,
        /// Validation time.
        now: i64,
    },
    /// The registered security profile is missing or unknown.
    #[error("unknown security profile: {0:?}")]
    UnknownSecurityProfile(String),
    /// The registered security profile is weaker than the expected one.
    #[error("security profile {registered} does not satisfy {expected}")]
    ProfileViolation {
        /// Profile of the token.
        registered: SecurityProfile,
        /// Profile required by the caller.
        expected: SecurityProfile,
    },
    /// A custom rule rejected the claims or failed.
    #[error("validation rule failed: {0}")]
    RuleFailed(String),
}

/// Validator for DATs.
///
/// Checks, in this order: the signature against each candidate key, the temporal claims, the
/// security profile, and the custom rules in registration order.
#[derive(Clone, Default)]
pub struct DatValidator {
    rules: Vec<Arc<dyn DatValidationRule>>,
}

impl DatValidator {
    /// Creates a validator without custom rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule. Builder variant of [DatValidator::add_rule].
    pub fn with_rule(mut self, rule: impl DatValidationRule + 'static) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Adds a rule that runs after all previously added ones.
    pub fn add_rule(&mut self, rule: Arc<dyn DatValidationRule>) {
        self.rules.push(rule);
    }

    /// Returns true if [TokenValidator::validate] succeeds.
    pub fn is_valid(
        &self,
        now: SystemTime,
        token: &str,
        keys: &[VerificationKey],
        expected_profile: Option<SecurityProfile>,
    ) -> bool {
        self.validate(now, token, keys, expected_profile).is_ok()
    }

    fn verify_signature(
        token: &str,
        keys: &[VerificationKey],
    ) -> Result<DatClaims, ClaimsError> {
        let mut attempts = Vec::with_capacity(keys.len());
        for key in keys {
            match decode::<DatClaims>(token, &key.key, &signature_only(key)) {
                Ok(data) => return Ok(data.claims),
                Err(e) => {
                    tracing::trace!(kid = %key.kid, error = %e, "Key did not verify token");
                    attempts.push(e);
                }
            }
        }
        Err(ClaimsError::NoValidSigningKey { attempts })
    }
}

impl TokenValidator for DatValidator {
    fn validate(
        &self,
        now: SystemTime,
        token: &str,
        keys: &[VerificationKey],
        expected_profile: Option<SecurityProfile>,
    ) -> Result<DatClaims, ClaimsError> {
        let claims = Self::verify_signature(token, keys)?;

        check_temporal(&claims, unix_seconds(now))?;

        if let Some(expected) = expected_profile {
            check_profile(&claims, expected)?;
        }

        for rule in &self.rules {
            match rule.validate(&claims) {
                Ok(RuleOutcome::Success) => {}
                Ok(RuleOutcome::Failure(msg)) => return Err(ClaimsError::RuleFailed(msg)),
                Err(e) => return Err(ClaimsError::RuleFailed(e.to_string())),
            }
        }

        Ok(claims)
    }
}

/// Validation that only checks the signature. Temporal claims are checked by
/// [check_temporal].
fn signature_only(key: &VerificationKey) -> Validation {
    let mut validation = Validation::new(key.algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.leeway = 0;
    validation.required_spec_claims.clear();
    validation
}

fn check_temporal(claims: &DatClaims, now: i64) -> Result<(), ClaimsError> {
    if claims.exp <= now {
        return Err(ClaimsError::Expired {
            exp: claims.exp,
            now,
        });
    }
    if claims.exp < claims.iat {
        return Err(ClaimsError::ExpiresBeforeIssued {
            exp: claims.exp,
            iat: claims.iat,
        });
    }
    if now < claims.iat {
        return Err(ClaimsError::IssuedInFuture {
            iat: claims.iat,
            now,
        });
    }
    if now < claims.nbf {
        return Err(ClaimsError::NotYetValid {
            nbf: claims.nbf,
            now,
        });
    }
    Ok(())
}

fn check_profile(claims: &DatClaims, expected: SecurityProfile) -> Result<(), ClaimsError> {
    let raw = claims.security_profile.as_deref().unwrap_or_default();
    let registered: SecurityProfile = raw
        .parse()
        .map_err(|_| ClaimsError::UnknownSecurityProfile(raw.to_string()))?;

    if !registered.satisfies(expected) {
        return Err(ClaimsError::ProfileViolation {
            registered,
            expected,
        });
    }
    Ok(())
}
