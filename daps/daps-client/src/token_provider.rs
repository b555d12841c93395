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
//! Source of the DAT attached to outbound messages.

use async_trait::async_trait;

use crate::issuer::DapsError;

/// A source for the connector's own DAT.
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    /// Gets a token, possibly requesting a fresh one from the DAPS.
    async fn get_token(&self) -> Result<String, DapsError>;
}

/// A token provider that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Creates a provider for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> Result<String, DapsError> {
        Ok(self.token.clone())
    }
}
