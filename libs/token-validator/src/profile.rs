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
//! IDS security profiles.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const IDSC_PREFIX: &str = "idsc:";
const IDSC_IRI_PREFIX: &str = "https://w3id.org/idsa/code/";
const PROFILE_SUFFIX: &str = "_SECURITY_PROFILE";

/// Security profile of a connector. Ordered by strength: `Base < Trust < TrustPlus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SecurityProfile {
    /// `idsc:BASE_SECURITY_PROFILE`
    Base,
    /// `idsc:TRUST_SECURITY_PROFILE`
    Trust,
    /// `idsc:TRUST_PLUS_SECURITY_PROFILE`
    TrustPlus,
}

impl SecurityProfile {
    /// Short form used for comparisons, e.g. `TRUST_PLUS`.
    pub fn short_name(&self) -> &'static str {
        match self {
            SecurityProfile::Base => "BASE",
            SecurityProfile::Trust => "TRUST",
            SecurityProfile::TrustPlus => "TRUST_PLUS",
        }
    }

    /// Prefixed IRI, e.g. `idsc:TRUST_PLUS_SECURITY_PROFILE`.
    pub fn iri(&self) -> String {
        format!("{IDSC_PREFIX}{}{PROFILE_SUFFIX}", self.short_name())
    }

    /// The requirements a connector registered with this profile fulfils.
    pub fn satisfied_requirements(&self) -> &'static [SecurityProfile] {
        match self {
            SecurityProfile::Base => &[SecurityProfile::Base],
            SecurityProfile::Trust => &[SecurityProfile::Base, SecurityProfile::Trust],
            SecurityProfile::TrustPlus => {
                &[
                    SecurityProfile::Base,
                    SecurityProfile::Trust,
                    SecurityProfile::TrustPlus,
                ]
            }
        }
    }

    /// Returns true if a connector registered with this profile may be trusted where `required`
    /// is expected.
    pub fn satisfies(&self, required: SecurityProfile) -> bool {
        self.satisfied_requirements().contains(&required)
    }
}

/// Unknown security profile value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown security profile: {0}")]
pub struct UnknownSecurityProfile(pub String);

impl FromStr for SecurityProfile {
    type Err = UnknownSecurityProfile;

    /// Accepts `idsc:X_SECURITY_PROFILE`, the full IRI, `X_SECURITY_PROFILE` and `X`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let short = trimmed
            .strip_prefix(IDSC_IRI_PREFIX)
            .or_else(|| trimmed.strip_prefix(IDSC_PREFIX))
            .unwrap_or(trimmed);
        let short = short.strip_suffix(PROFILE_SUFFIX).unwrap_or(short);

        match short {
            "BASE" => Ok(SecurityProfile::Base),
            "TRUST" => Ok(SecurityProfile::Trust),
            "TRUST_PLUS" => Ok(SecurityProfile::TrustPlus),
            _ => Err(UnknownSecurityProfile(value.to_string())),
        }
    }
}

impl TryFrom<String> for SecurityProfile {
    type Error = UnknownSecurityProfile;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SecurityProfile> for String {
    fn from(profile: SecurityProfile) -> Self {
        profile.iri()
    }
}

impl Display for SecurityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}
