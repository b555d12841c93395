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
//! Checks applied to every inbound header before it reaches a handler.

use std::sync::Arc;

use crate::message::Message;

/// Error raised by a filter that could not run.
pub type FilterError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// The message may proceed.
    Success,
    /// The message is rejected as malformed.
    Failure(String),
}

/// An inspection step on inbound headers.
pub trait PreDispatchFilter: Send + Sync {
    /// Inspects `message`.
    fn check(&self, message: &Message) -> Result<FilterOutcome, FilterError>;
}

impl<F> PreDispatchFilter for F
where
    F: Fn(&Message) -> Result<FilterOutcome, FilterError> + Send + Sync,
{
    fn check(&self, message: &Message) -> Result<FilterOutcome, FilterError> {
        self(message)
    }
}

/// Filters in the order they run.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn PreDispatchFilter>>,
}

impl FilterChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `filter`. Builder variant of [FilterChain::push].
    pub fn with_filter(mut self, filter: impl PreDispatchFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Appends `filter`.
    pub fn push(&mut self, filter: Arc<dyn PreDispatchFilter>) {
        self.filters.push(filter);
    }

    /// Number of filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns true if the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs all filters in order and stops at the first failure or error.
    pub fn run(&self, message: &Message) -> Result<FilterOutcome, FilterError> {
        for filter in &self.filters {
            match filter.check(message)? {
                FilterOutcome::Success => {}
                failure => return Ok(failure),
            }
        }
        Ok(FilterOutcome::Success)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .finish()
    }
}

/// Rejects headers whose `ids:issuerConnector` is not in the allow list.
#[derive(Debug, Clone)]
pub struct IssuerConnectorFilter {
    allowed: Vec<url::Url>,
}

impl IssuerConnectorFilter {
    /// Allows `allowed` connectors only.
    pub fn new(allowed: impl IntoIterator<Item = url::Url>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl PreDispatchFilter for IssuerConnectorFilter {
    fn check(&self, message: &Message) -> Result<FilterOutcome, FilterError> {
        let issuer = &message.header().issuer_connector;
        if self.allowed.contains(issuer) {
            Ok(FilterOutcome::Success)
        } else {
            Ok(FilterOutcome::Failure(format!(
                "issuer connector {issuer} is not allowed"
            )))
        }
    }
}
