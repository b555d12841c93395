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
//! Client side of the Dynamic Attribute Provisioning Service (DAPS).
//!
//! A connector authenticates to the DAPS with a JWT client assertion signed by its private key
//! and receives a Dynamic Attribute Token (DAT) that it attaches to every outbound message.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod assertion;
pub mod fingerprint;
pub mod issuer;
pub mod token_provider;

/// Token value used instead of a DAT when none could be obtained in [DeploymentMode::Test].
pub const INVALID_TOKEN: &str = "INVALID_TOKEN";

/// Deployment mode of a connector.
///
/// In [DeploymentMode::Test] DAPS failures are tolerated and inbound tokens are not validated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentMode {
    /// Tokens are not enforced.
    #[serde(rename = "TEST_DEPLOYMENT")]
    Test,
    /// Tokens are enforced.
    #[default]
    #[serde(rename = "PRODUCTIVE_DEPLOYMENT")]
    Productive,
}

impl DeploymentMode {
    /// Returns true in [DeploymentMode::Test].
    pub fn is_test(&self) -> bool {
        matches!(self, DeploymentMode::Test)
    }
}

impl Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentMode::Test => write!(f, "TEST_DEPLOYMENT"),
            DeploymentMode::Productive => write!(f, "PRODUCTIVE_DEPLOYMENT"),
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEST_DEPLOYMENT" | "test" => Ok(DeploymentMode::Test),
            "PRODUCTIVE_DEPLOYMENT" | "productive" => Ok(DeploymentMode::Productive),
            other => Err(format!("unknown deployment mode: {other}")),
        }
    }
}
