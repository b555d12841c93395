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
//! Message handlers and their registry.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use ids_sdk_token_validator::claims::DatClaims;
use tracing::warn;

use crate::{
    message::{Message, MessageType},
    payload::{MessageAndPayload, InboundPayload},
    rejection::RejectionReason,
};

/// A rejection produced while handling a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// The reason.
    pub reason: RejectionReason,
    /// Explanation sent as rejection payload.
    pub message: String,
}

impl ErrorResponse {
    /// Creates a rejection.
    pub fn new(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// What the dispatcher hands back for an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageResponse {
    /// A response message with payload.
    Map(MessageAndPayload),
    /// A rejection.
    Rejection(ErrorResponse),
    /// No response body.
    NoContent,
}

impl MessageResponse {
    /// Shorthand for [MessageResponse::Rejection].
    pub fn rejection(reason: RejectionReason, message: impl Into<String>) -> Self {
        MessageResponse::Rejection(ErrorResponse::new(reason, message))
    }
}

impl From<MessageAndPayload> for MessageResponse {
    fn from(map: MessageAndPayload) -> Self {
        MessageResponse::Map(map)
    }
}

/// Handles messages of one type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles `message`. An `Err` is answered with an internal recipient error.
    async fn handle(
        &self,
        message: &Message,
        payload: InboundPayload,
    ) -> anyhow::Result<MessageResponse>;
}

/// Handles messages of one type and receives the claims of the validated DAT.
#[async_trait]
pub trait ClaimsAwareHandler: Send + Sync {
    /// Handles `message`. `claims` is `None` if the DAT was not validated (test deployment).
    async fn handle(
        &self,
        message: &Message,
        payload: InboundPayload,
        claims: Option<&DatClaims>,
    ) -> anyhow::Result<MessageResponse>;
}

/// A registered handler.
#[derive(Clone)]
pub enum RegisteredHandler {
    /// Handler without claims.
    Plain(Arc<dyn MessageHandler>),
    /// Handler with claims.
    WithClaims(Arc<dyn ClaimsAwareHandler>),
}

impl RegisteredHandler {
    /// Invokes the handler.
    pub async fn invoke(
        &self,
        message: &Message,
        payload: InboundPayload,
        claims: Option<&DatClaims>,
    ) -> anyhow::Result<MessageResponse> {
        match self {
            RegisteredHandler::Plain(handler) => handler.handle(message, payload).await,
            RegisteredHandler::WithClaims(handler) => {
                handler.handle(message, payload, claims).await
            }
        }
    }
}

impl std::fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisteredHandler::Plain(_) => f.write_str("RegisteredHandler::Plain"),
            RegisteredHandler::WithClaims(_) => f.write_str("RegisteredHandler::WithClaims"),
        }
    }
}

/// Maps message types to handlers. One handler per type.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageType, RegisteredHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `message_type`. Returns the replaced handler, if any.
    pub fn register(
        &mut self,
        message_type: MessageType,
        handler: Arc<dyn MessageHandler>,
    ) -> Option<RegisteredHandler> {
        self.insert(message_type, RegisteredHandler::Plain(handler))
    }

    /// Registers a claims-aware `handler` for `message_type`. Returns the replaced handler, if
    /// any.
    pub fn register_with_claims(
        &mut self,
        message_type: MessageType,
        handler: Arc<dyn ClaimsAwareHandler>,
    ) -> Option<RegisteredHandler> {
        self.insert(message_type, RegisteredHandler::WithClaims(handler))
    }

    /// Builder variant of [HandlerRegistry::register].
    pub fn with_handler(
        mut self,
        message_type: MessageType,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        self.register(message_type, handler);
        self
    }

    fn insert(
        &mut self,
        message_type: MessageType,
        handler: RegisteredHandler,
    ) -> Option<RegisteredHandler> {
        let previous = self.handlers.insert(message_type, handler);
        if previous.is_some() {
            warn!(?message_type, "Replacing registered message handler");
        }
        previous
    }

    /// The handler for `message_type`.
    pub fn resolve(&self, message_type: MessageType) -> Option<&RegisteredHandler> {
        self.handlers.get(&message_type)
    }

    /// The types with a registered handler.
    pub fn message_types(&self) -> impl Iterator<Item = MessageType> + '_ {
        self.handlers.keys().copied()
    }
}
