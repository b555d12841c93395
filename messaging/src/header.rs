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
//! Attributes shared by all IDS message headers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// `@type` of [DynamicAttributeToken].
pub const DAT_TYPE: &str = "ids:DynamicAttributeToken";
/// Token format of JWT based DATs.
pub const JWT_TOKEN_FORMAT: &str = "idsc:JWT";

/// The security token attached to a message header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicAttributeToken {
    /// Always [DAT_TYPE].
    #[serde(rename = "@type", default = "dat_type")]
    pub type_name: String,
    /// Always [JWT_TOKEN_FORMAT].
    #[serde(rename = "ids:tokenFormat", default = "jwt_token_format")]
    pub token_format: String,
    /// The compact JWS.
    #[serde(rename = "ids:tokenValue")]
    pub token_value: String,
}

fn dat_type() -> String {
    DAT_TYPE.to_string()
}

fn jwt_token_format() -> String {
    JWT_TOKEN_FORMAT.to_string()
}

impl DynamicAttributeToken {
    /// Wraps a JWT.
    pub fn jwt(token_value: impl Into<String>) -> Self {
        Self {
            type_name: dat_type(),
            token_format: jwt_token_format(),
            token_value: token_value.into(),
        }
    }
}

/// Header attributes common to every message type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Message id.
    #[serde(rename = "@id")]
    pub id: Url,
    /// Creation time.
    #[serde(rename = "ids:issued")]
    pub issued: DateTime<Utc>,
    /// Infomodel version the message conforms to.
    #[serde(rename = "ids:modelVersion")]
    pub model_version: String,
    /// Connector that issued the message.
    #[serde(rename = "ids:issuerConnector")]
    pub issuer_connector: Url,
    /// Agent on whose behalf the message was sent.
    #[serde(rename = "ids:senderAgent")]
    pub sender_agent: Url,
    /// The DAT of the sender.
    #[serde(
        rename = "ids:securityToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub security_token: Option<DynamicAttributeToken>,
    /// Intended recipient connectors.
    #[serde(
        rename = "ids:recipientConnector",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub recipient_connector: Vec<Url>,
    /// Intended recipient agents.
    #[serde(
        rename = "ids:recipientAgent",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub recipient_agent: Vec<Url>,
    /// The message this one answers.
    #[serde(
        rename = "ids:correlationMessage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_message: Option<Url>,
    /// Contract governing the exchange.
    #[serde(
        rename = "ids:transferContract",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transfer_contract: Option<Url>,
    /// Version of the payload content.
    #[serde(
        rename = "ids:contentVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_version: Option<String>,
}

impl MessageHeader {
    /// Returns the token value of the security token, if present.
    pub fn token_value(&self) -> Option<&str> {
        self.security_token
            .as_ref()
            .map(|token| token.token_value.as_str())
    }

    /// Sets the security token to `token_value`.
    pub fn set_token(&mut self, token_value: impl Into<String>) {
        self.security_token = Some(DynamicAttributeToken::jwt(token_value));
    }
}
