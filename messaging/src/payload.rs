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
//! Message payloads and the message-and-payload pair.

use std::fmt::Display;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::{
    header::MessageHeader,
    message::{Message, MessageType, RejectionMessage},
    multipart::MultipartMap,
};

/// Outbound payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    /// No payload part.
    #[default]
    Empty,
    /// Free text.
    Text(String),
    /// A JSON(-LD) entity, e.g. a self-description or contract.
    Entity(Value),
    /// Raw bytes.
    Binary(Bytes),
}

impl Payload {
    /// Short name used in errors and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Text(_) => "text",
            Payload::Entity(_) => "entity",
            Payload::Binary(_) => "binary",
        }
    }

    /// The wire form of the payload part. `None` if there is no payload part.
    pub fn to_bytes(&self) -> Result<Option<Bytes>, serde_json::Error> {
        Ok(match self {
            Payload::Empty => None,
            Payload::Text(text) => Some(Bytes::from(text.clone())),
            Payload::Entity(value) => Some(Bytes::from(serde_json::to_vec(value)?)),
            Payload::Binary(bytes) => Some(bytes.clone()),
        })
    }
}

/// The kind of payload a message type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// No payload.
    None,
    /// An entity.
    Entity,
    /// An entity, or nothing.
    OptionalEntity,
    /// Free text.
    Text,
    /// Raw bytes.
    Binary,
    /// Anything.
    Any,
}

impl PayloadKind {
    /// Returns true if `payload` may be sent with a message of this kind.
    pub fn accepts(&self, payload: &Payload) -> bool {
        match self {
            PayloadKind::None => matches!(payload, Payload::Empty),
            PayloadKind::Entity => matches!(payload, Payload::Entity(_) | Payload::Text(_)),
            PayloadKind::OptionalEntity => matches!(
                payload,
                Payload::Empty | Payload::Entity(_) | Payload::Text(_)
            ),
            PayloadKind::Text => matches!(payload, Payload::Text(_)),
            PayloadKind::Binary => matches!(payload, Payload::Binary(_) | Payload::Text(_)),
            PayloadKind::Any => true,
        }
    }
}

impl Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PayloadKind::None => "none",
            PayloadKind::Entity => "entity",
            PayloadKind::OptionalEntity => "optional entity",
            PayloadKind::Text => "text",
            PayloadKind::Binary => "binary",
            PayloadKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// The payload does not fit the message type.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message_type:?} expects a {expected} payload, got {found}")]
pub struct PayloadMismatch {
    /// The message type.
    pub message_type: MessageType,
    /// What the message type accepts.
    pub expected: PayloadKind,
    /// What was given.
    pub found: &'static str,
}

/// A message together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageAndPayload {
    message: Message,
    payload: Payload,
}

impl MessageAndPayload {
    /// Pairs `message` with `payload`, checking the payload kind of the message type.
    pub fn new(message: Message, payload: Payload) -> Result<Self, PayloadMismatch> {
        let message_type = message.message_type();
        let expected = message_type.payload_kind();
        if !expected.accepts(&payload) {
            return Err(PayloadMismatch {
                message_type,
                expected,
                found: payload.kind_name(),
            });
        }
        Ok(Self { message, payload })
    }

    /// A rejection with its explanation text.
    pub fn rejection(message: RejectionMessage, explanation: impl Into<String>) -> Self {
        Self {
            message: Message::Rejection(message),
            payload: Payload::Text(explanation.into()),
        }
    }

    /// The message.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The common header of the message, mutable. The message type and its payload rule stay
    /// fixed.
    pub fn header_mut(&mut self) -> &mut MessageHeader {
        self.message.header_mut()
    }

    /// The payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Splits the pair.
    pub fn into_parts(self) -> (Message, Payload) {
        (self.message, self.payload)
    }

    /// Encodes header and payload into the wire map.
    pub fn to_multipart(&self) -> Result<MultipartMap, serde_json::Error> {
        Ok(MultipartMap {
            header: self.message.to_json_string()?,
            payload: self.payload.to_bytes()?,
        })
    }
}

/// The payload part of an inbound message, not interpreted yet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InboundPayload(Option<Bytes>);

impl InboundPayload {
    /// Wraps the raw payload part.
    pub fn new(payload: Option<Bytes>) -> Self {
        Self(payload)
    }

    /// Returns true if there was no payload part.
    pub fn is_empty(&self) -> bool {
        self.0.as_ref().is_none_or(|bytes| bytes.is_empty())
    }

    /// The raw bytes.
    pub fn bytes(&self) -> Option<&Bytes> {
        self.0.as_ref()
    }

    /// The payload as UTF-8 text.
    pub fn text(&self) -> Option<Result<&str, std::str::Utf8Error>> {
        self.0.as_deref().map(std::str::from_utf8)
    }

    /// Decodes the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.0.as_deref().map(serde_json::from_slice)
    }

    /// Unwraps the raw payload.
    pub fn into_inner(self) -> Option<Bytes> {
        self.0
    }
}
