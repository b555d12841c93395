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
//! Infomodel version matching.

use serde::{Deserialize, Serialize};

/// Infomodel version written by this implementation.
pub const DEFAULT_MODEL_VERSION: &str = "4.2.7";

const WILDCARD: &str = "*";

/// Returns true if `version` matches `pattern`.
///
/// Both are split on `.`. They match if they have the same number of segments and every pattern
/// segment is either `*` or equal to the version segment. `4.*.*` matches `4.2.7` but not `4.2`.
pub fn check_infomodel_containment(version: &str, pattern: &str) -> bool {
    let version: Vec<&str> = version.split('.').collect();
    let pattern: Vec<&str> = pattern.split('.').collect();

    version.len() == pattern.len()
        && version
            .iter()
            .zip(&pattern)
            .all(|(v, p)| *p == WILDCARD || v == p)
}

/// The inbound Infomodel versions a connector accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupportedVersions {
    patterns: Vec<String>,
}

impl SupportedVersions {
    /// Accepts versions matching any of `patterns`.
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true if `version` matches at least one pattern.
    pub fn accepts(&self, version: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| check_infomodel_containment(version, pattern))
    }

    /// The configured patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for SupportedVersions {
    fn default() -> Self {
        Self::new(["4.*.*"])
    }
}
