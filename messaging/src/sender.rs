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
//! Outbound messages.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use bytes::Bytes;
use http::{StatusCode, header::CONTENT_TYPE};
use ids_daps_client::{DeploymentMode, issuer::DapsError, token_provider::TokenProvider};
use ids_sdk_token_validator::{
    claims::DatClaims,
    keys::KeyProvider,
    profile::SecurityProfile,
    validator::{ClaimsError, TokenValidator},
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
    message::{HeaderError, Message},
    multipart::{MultipartCodec, MultipartError},
    payload::{InboundPayload, MessageAndPayload},
};

/// Default timeout of outbound requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbound errors.
#[derive(Debug, Error)]
pub enum SendError {
    /// No DAT could be obtained.
    #[error("could not obtain DAT: {0}")]
    Token(#[from] DapsError),
    /// The message could not be encoded.
    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),
    /// The request failed.
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Target.
        url: Url,
        /// Cause.
        #[source]
        source: reqwest::Error,
    },
    /// The response is not a multipart message.
    #[error("invalid multipart response: {0}")]
    Multipart(#[from] MultipartError),
    /// The response header could not be decoded.
    #[error("invalid response header: {0}")]
    Header(#[from] HeaderError),
    /// The response has no DAT.
    #[error("response has no security token")]
    MissingResponseToken,
    /// The DAT of the response is invalid.
    #[error("invalid response DAT: {0}")]
    InvalidResponseToken(#[source] ClaimsError),
    /// The response does not answer the request.
    #[error("response correlates to {found:?}, expected {expected}")]
    CorrelationMismatch {
        /// Id of the request.
        expected: Url,
        /// `ids:correlationMessage` of the response.
        found: Option<Url>,
    },
}

/// Sender settings.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// In [DeploymentMode::Test] response DATs are not validated.
    pub mode: DeploymentMode,
    /// Minimum security profile of response DATs.
    pub required_security_profile: Option<SecurityProfile>,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Productive,
            required_security_profile: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A decoded response.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// HTTP status.
    pub status: StatusCode,
    /// The response header.
    pub message: Message,
    /// The response payload.
    pub payload: InboundPayload,
    /// Claims of the response DAT. `None` in test deployments.
    pub claims: Option<DatClaims>,
}

/// Sends messages to other connectors.
pub struct MessageSender {
    client: reqwest::Client,
    codec: MultipartCodec,
    config: SenderConfig,
    tokens: Arc<dyn TokenProvider>,
    validator: Arc<dyn TokenValidator>,
    keys: Arc<dyn KeyProvider>,
}

impl MessageSender {
    /// Creates a sender. Outbound messages carry DATs from `tokens`; response DATs are validated
    /// with `validator` against `keys`.
    pub fn new(
        config: SenderConfig,
        tokens: Arc<dyn TokenProvider>,
        validator: Arc<dyn TokenValidator>,
        keys: Arc<dyn KeyProvider>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            codec: MultipartCodec::default(),
            config,
            tokens,
            validator,
            keys,
        })
    }

    /// Sends `map` to `url` and returns the decoded response. `None` if the response has no
    /// body.
    ///
    /// The response must correlate to the sent message. Rejections are returned as regular
    /// responses and may be uncorrelated when the peer could not decode the message.
    pub async fn send(
        &self,
        url: &Url,
        mut map: MessageAndPayload,
    ) -> Result<Option<ReceivedMessage>, SendError> {
        let token = self.tokens.get_token().await?;
        map.header_mut().set_token(token);
        let request_id = map.message().header().id.clone();

        let (content_type, body) = self.codec.build(&map.to_multipart()?);
        debug!(%url, message_id = %request_id, message_type = map.message().type_name(), "Sending message");

        let transport = |source: reqwest::Error| SendError::Transport {
            url: url.clone(),
            source,
        };
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body: Bytes = response.bytes().await.map_err(transport)?;
        if body.is_empty() {
            debug!(%url, %status, "Response has no body");
            return Ok(None);
        }

        let response = self
            .codec
            .parse(content_type.as_deref().unwrap_or_default(), body)
            .await?;
        let message = Message::from_json_str(&response.header)?;

        let correlation = message.header().correlation_message.clone();
        match (&message, correlation.as_ref()) {
            (_, Some(id)) if *id == request_id => {}
            (Message::Rejection(_), None) => {
                debug!(%url, message_id = %request_id, "Peer rejected the message without correlation");
            }
            _ => {
                return Err(SendError::CorrelationMismatch {
                    expected: request_id,
                    found: correlation,
                });
            }
        }

        let claims = self.validate_response(&message).await?;
        Ok(Some(ReceivedMessage {
            status,
            message,
            payload: InboundPayload::new(response.payload),
            claims,
        }))
    }

    async fn validate_response(&self, message: &Message) -> Result<Option<DatClaims>, SendError> {
        if self.config.mode.is_test() {
            warn!(message_id = %message.header().id, "Test deployment, DAT of response is not validated");
            return Ok(None);
        }

        let token = message
            .header()
            .token_value()
            .ok_or(SendError::MissingResponseToken)?;
        let keys = self.keys.keys().await;
        self.validator
            .validate(
                SystemTime::now(),
                token,
                &keys,
                self.config.required_security_profile,
            )
            .map(Some)
            .map_err(SendError::InvalidResponseToken)
    }
}
