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
//! Transport independent inbound endpoint.
//!
//! | Outcome | Status | Rejection |
//! |---|---|---|
//! | multipart framing error | 500 | `MALFORMED_MESSAGE` |
//! | body over the size limit | 413 | `MALFORMED_MESSAGE` |
//! | no header part, undecodable header | 400 | `MALFORMED_MESSAGE` |
//! | unsupported model version | 400 | `VERSION_NOT_SUPPORTED` |
//! | failing pre-dispatch filter | 500 | `INTERNAL_RECIPIENT_ERROR` |
//! | any dispatcher result | 200 | as decided by the dispatcher |

use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use http::StatusCode;
use tracing::{debug, error, info};

use crate::{
    dispatcher::MessageDispatcher,
    handler::{ErrorResponse, MessageResponse},
    message::Message,
    multipart::{MultipartCodec, MultipartError, MultipartMap},
    payload::InboundPayload,
    rejection::RejectionReason,
    response::ResponseAssembler,
    version::SupportedVersions,
};

/// HTTP answer to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerResponse {
    /// Status code.
    pub status: StatusCode,
    /// Content type and multipart body. `None` for an empty body.
    pub body: Option<(String, Bytes)>,
}

impl ControllerResponse {
    fn empty(status: StatusCode) -> Self {
        Self { status, body: None }
    }
}

/// Decodes inbound multipart messages, dispatches them and encodes the answer.
pub struct MessageController {
    codec: MultipartCodec,
    versions: SupportedVersions,
    dispatcher: Arc<MessageDispatcher>,
    assembler: ResponseAssembler,
}

impl MessageController {
    /// Creates a controller accepting the model `versions`.
    pub fn new(
        codec: MultipartCodec,
        versions: SupportedVersions,
        dispatcher: Arc<MessageDispatcher>,
        assembler: ResponseAssembler,
    ) -> Self {
        Self {
            codec,
            versions,
            dispatcher,
            assembler,
        }
    }

    /// The response assembler.
    pub fn assembler(&self) -> &ResponseAssembler {
        &self.assembler
    }

    /// Handles one inbound request body.
    pub async fn handle(&self, content_type: Option<&str>, body: Bytes) -> ControllerResponse {
        let map = self.codec.parse(content_type.unwrap_or_default(), body).await;
        self.handle_parsed(map).await
    }

    /// Handles one inbound request body read from `body`. The codec size limit applies while
    /// reading.
    pub async fn handle_stream<S, E>(&self, content_type: Option<&str>, body: S) -> ControllerResponse
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
    {
        let map = self
            .codec
            .parse_stream(content_type.unwrap_or_default(), body)
            .await;
        self.handle_parsed(map).await
    }

    async fn handle_parsed(&self, map: Result<MultipartMap, MultipartError>) -> ControllerResponse {
        let map = match map {
            Ok(map) => map,
            Err(e) => {
                info!(error = %e, "Rejecting undecodable multipart body");
                let status = match &e {
                    MultipartError::MissingHeader | MultipartError::HeaderNotUtf8(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    MultipartError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    MultipartError::InvalidBoundary(_) | MultipartError::Framing(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                return self
                    .reject(status, None, RejectionReason::MalformedMessage, e.to_string())
                    .await;
            }
        };

        let message = match Message::from_json_str(&map.header) {
            Ok(message) => message,
            Err(e) => {
                info!(error = %e, "Rejecting undecodable message header");
                return self
                    .reject(
                        StatusCode::BAD_REQUEST,
                        None,
                        RejectionReason::MalformedMessage,
                        e.to_string(),
                    )
                    .await;
            }
        };

        let version = &message.header().model_version;
        if !self.versions.accepts(version) {
            info!(message_id = %message.header().id, %version, "Rejecting unsupported model version");
            return self
                .reject(
                    StatusCode::BAD_REQUEST,
                    Some(&message),
                    RejectionReason::VersionNotSupported,
                    format!("model version {version} is not supported"),
                )
                .await;
        }

        debug!(message_id = %message.header().id, message_type = message.type_name(), "Dispatching message");
        let response = match self
            .dispatcher
            .dispatch(&message, InboundPayload::new(map.payload))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(message_id = %message.header().id, error = %e, "Message dispatch failed");
                return self
                    .reject(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Some(&message),
                        RejectionReason::InternalRecipientError,
                        "message could not be processed".to_string(),
                    )
                    .await;
            }
        };

        self.respond(StatusCode::OK, Some(&message), response).await
    }

    async fn reject(
        &self,
        status: StatusCode,
        inbound: Option<&Message>,
        reason: RejectionReason,
        message: String,
    ) -> ControllerResponse {
        let rejection = MessageResponse::Rejection(ErrorResponse::new(reason, message));
        self.respond(status, inbound, rejection).await
    }

    async fn respond(
        &self,
        status: StatusCode,
        inbound: Option<&Message>,
        response: MessageResponse,
    ) -> ControllerResponse {
        match self.assembler.assemble(inbound, response).await {
            Ok(Some(map)) => ControllerResponse {
                status,
                body: Some(self.codec.build(&map)),
            },
            Ok(None) => ControllerResponse::empty(status),
            Err(e) => {
                error!(error = %e, "Could not encode response");
                ControllerResponse::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
