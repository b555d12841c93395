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
//! Custom DAT validation rules.

use crate::claims::{Audience, DatClaims};

/// Error raised by a rule that could not be evaluated.
pub type RuleError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The claims satisfy the rule.
    Success,
    /// The claims violate the rule.
    Failure(String),
}

/// A rule applied to the claims of a DAT after signature, temporal and security profile checks
/// succeeded.
pub trait DatValidationRule: Send + Sync {
    /// Checks the claims.
    fn validate(&self, claims: &DatClaims) -> Result<RuleOutcome, RuleError>;
}

/// Allow any closure matching the signature to be used as a rule.
impl<F> DatValidationRule for F
where
    F: Fn(&DatClaims) -> Result<RuleOutcome, RuleError> + Send + Sync,
{
    fn validate(&self, claims: &DatClaims) -> Result<RuleOutcome, RuleError> {
        (self)(claims)
    }
}

/// Requires the token to be issued by one of the given issuers.
#[derive(Debug, Clone)]
pub struct IssuerRule {
    issuers: Vec<String>,
}

impl IssuerRule {
    /// Creates the rule.
    pub fn new(issuers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            issuers: issuers.into_iter().map(Into::into).collect(),
        }
    }
}

impl DatValidationRule for IssuerRule {
    fn validate(&self, claims: &DatClaims) -> Result<RuleOutcome, RuleError> {
        if self.issuers.iter().any(|iss| iss == &claims.iss) {
            return Ok(RuleOutcome::Success);
        }
        Ok(RuleOutcome::Failure(format!(
            "token issuer {} is not trusted",
            claims.iss
        )))
    }
}

/// Requires the token audience to contain the given value.
#[derive(Debug, Clone)]
pub struct AudienceRule {
    audience: String,
}

impl AudienceRule {
    /// Creates the rule.
    pub fn new(audience: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
        }
    }
}

impl DatValidationRule for AudienceRule {
    fn validate(&self, claims: &DatClaims) -> Result<RuleOutcome, RuleError> {
        match &claims.aud {
            Some(aud) if aud.contains(&self.audience) => Ok(RuleOutcome::Success),
            Some(Audience::Single(aud)) => {
                Ok(RuleOutcome::Failure(format!(
                    "token audience {aud} does not contain {}",
                    self.audience
                )))
            }
            Some(Audience::Many(_)) | None => {
                Ok(RuleOutcome::Failure(format!(
                    "token audience does not contain {}",
                    self.audience
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn claims() -> DatClaims {
        let mut claims = DatClaims::new("daps", "sub", SystemTime::now(), Duration::from_secs(60));
        claims.aud = Some(Audience::Many(vec!["idsc:IDS_CONNECTORS_ALL".into()]));
        claims
    }

    #[test]
    fn issuer_rule() {
        assert_eq!(
            IssuerRule::new(["daps"]).validate(&claims()).unwrap(),
            RuleOutcome::Success
        );
        assert!(matches!(
            IssuerRule::new(["other"]).validate(&claims()).unwrap(),
            RuleOutcome::Failure(_)
        ));
    }

    #[test]
    fn audience_rule() {
        assert_eq!(
            AudienceRule::new("idsc:IDS_CONNECTORS_ALL")
                .validate(&claims())
                .unwrap(),
            RuleOutcome::Success
        );
        assert!(matches!(
            AudienceRule::new("idsc:OTHER").validate(&claims()).unwrap(),
            RuleOutcome::Failure(_)
        ));
    }

    #[test]
    fn closures_are_rules() {
        let rule = |claims: &DatClaims| -> Result<RuleOutcome, RuleError> {
            if claims.scopes.is_empty() {
                return Err("no scopes".into());
            }
            Ok(RuleOutcome::Success)
        };
        assert!(rule.validate(&claims()).is_err());
    }
}
