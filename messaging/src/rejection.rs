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
//! Rejection reasons.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const IDSC_PREFIX: &str = "idsc:";
const IDSC_IRI_PREFIX: &str = "https://w3id.org/idsa/code/";

/// Why a message was rejected. Serialized as `idsc:<NAME>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RejectionReason {
    /// The message could not be parsed.
    MalformedMessage,
    /// The Infomodel version is not supported.
    VersionNotSupported,
    /// The sender is not authorized.
    NotAuthorized,
    /// The sender could not be authenticated.
    NotAuthenticated,
    /// The message carries inconsistent parameters.
    BadParameters,
    /// The recipient failed while processing the message.
    InternalRecipientError,
    /// No handler exists for the message type.
    MessageTypeNotSupported,
    /// The requested element does not exist.
    NotFound,
    /// The query matches too many results.
    TooManyResults,
    /// The recipient is temporarily unavailable.
    TemporarilyNotAvailable,
}

impl RejectionReason {
    /// All reasons.
    pub const ALL: [RejectionReason; 10] = [
        RejectionReason::MalformedMessage,
        RejectionReason::VersionNotSupported,
        RejectionReason::NotAuthorized,
        RejectionReason::NotAuthenticated,
        RejectionReason::BadParameters,
        RejectionReason::InternalRecipientError,
        RejectionReason::MessageTypeNotSupported,
        RejectionReason::NotFound,
        RejectionReason::TooManyResults,
        RejectionReason::TemporarilyNotAvailable,
    ];

    /// The code name, e.g. `NOT_AUTHORIZED`.
    pub fn name(&self) -> &'static str {
        match self {
            RejectionReason::MalformedMessage => "MALFORMED_MESSAGE",
            RejectionReason::VersionNotSupported => "VERSION_NOT_SUPPORTED",
            RejectionReason::NotAuthorized => "NOT_AUTHORIZED",
            RejectionReason::NotAuthenticated => "NOT_AUTHENTICATED",
            RejectionReason::BadParameters => "BAD_PARAMETERS",
            RejectionReason::InternalRecipientError => "INTERNAL_RECIPIENT_ERROR",
            RejectionReason::MessageTypeNotSupported => "MESSAGE_TYPE_NOT_SUPPORTED",
            RejectionReason::NotFound => "NOT_FOUND",
            RejectionReason::TooManyResults => "TOO_MANY_RESULTS",
            RejectionReason::TemporarilyNotAvailable => "TEMPORARILY_NOT_AVAILABLE",
        }
    }
}

/// Unknown rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown rejection reason: {0}")]
pub struct UnknownRejectionReason(pub String);

impl FromStr for RejectionReason {
    type Err = UnknownRejectionReason;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = value
            .strip_prefix(IDSC_IRI_PREFIX)
            .or_else(|| value.strip_prefix(IDSC_PREFIX))
            .unwrap_or(value);
        RejectionReason::ALL
            .into_iter()
            .find(|reason| reason.name() == name)
            .ok_or_else(|| UnknownRejectionReason(value.to_string()))
    }
}

impl TryFrom<String> for RejectionReason {
    type Error = UnknownRejectionReason;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RejectionReason> for String {
    fn from(reason: RejectionReason) -> Self {
        reason.to_string()
    }
}

impl Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{IDSC_PREFIX}{}", self.name())
    }
}
