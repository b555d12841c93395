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
//! IDS Infomodel message headers.
//!
//! Headers are JSON-LD objects whose `@type` selects the message subtype. [Message] is the closed
//! set of supported subtypes; any other `@type` decodes as [Message::Generic] and keeps its type
//! name and attributes.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _, ser::Error as _};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::{header::MessageHeader, payload::PayloadKind, rejection::RejectionReason};

const IDS_IRI_PREFIX: &str = "https://w3id.org/idsa/core/";
const IDS_PREFIX: &str = "ids:";

/// Returns the JSON-LD context written into every header.
pub fn ids_context() -> Value {
    serde_json::json!({
        "ids": IDS_IRI_PREFIX,
        "idsc": "https://w3id.org/idsa/code/",
    })
}

/// Errors decoding a message header.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// The header is not valid JSON or misses required attributes.
    #[error("invalid header: {0}")]
    Json(#[from] serde_json::Error),
    /// The header is not a JSON object.
    #[error("header is not a JSON object")]
    NotAnObject,
    /// The header has no `@type`.
    #[error("header has no @type")]
    MissingType,
}

macro_rules! header_only_messages {
    ($( $(#[$doc:meta])* $name:ident ),+ $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
            pub struct $name {
                /// Common attributes.
                #[serde(flatten)]
                pub header: MessageHeader,
            }

            impl $name {
                /// Creates the message.
                pub fn new(header: MessageHeader) -> Self {
                    Self { header }
                }
            }
        )+
    };
}

header_only_messages!(
    /// Answers a description request with the requested self-description.
    DescriptionResponseMessage,
    /// Returns the requested artifact as payload.
    ArtifactResponseMessage,
    /// Offers a contract, carried as payload.
    ContractOfferMessage,
    /// Requests a contract, carried as payload.
    ContractRequestMessage,
    /// Answers a contract request with a counter offer.
    ContractResponseMessage,
    /// Confirms the agreed contract.
    ContractAgreementMessage,
    /// Carries the result of a query.
    ResultMessage,
    /// Acknowledges a message without returning data.
    MessageProcessedNotificationMessage,
);

/// Requests the self-description of a connector or one of its elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionRequestMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// Element to describe. The connector itself if absent.
    #[serde(
        rename = "ids:requestedElement",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub requested_element: Option<Url>,
}

/// Requests an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRequestMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// The artifact.
    #[serde(rename = "ids:requestedArtifact")]
    pub requested_artifact: Url,
}

/// Rejects a contract negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRejectionMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// Why the contract is rejected.
    #[serde(
        rename = "ids:contractRejectionReason",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub contract_rejection_reason: Option<String>,
}

/// Announces a new or changed resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUpdateMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// The resource.
    #[serde(rename = "ids:affectedResource")]
    pub affected_resource: Url,
}

/// Announces that a resource is no longer available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUnavailableMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// The resource.
    #[serde(rename = "ids:affectedResource")]
    pub affected_resource: Url,
}

/// Announces a new or changed connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorUpdateMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// The connector.
    #[serde(rename = "ids:affectedConnector")]
    pub affected_connector: Url,
}

/// Announces that a connector is no longer available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorUnavailableMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// The connector.
    #[serde(rename = "ids:affectedConnector")]
    pub affected_connector: Url,
}

/// Announces a new or changed participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantUpdateMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// The participant.
    #[serde(rename = "ids:affectedParticipant")]
    pub affected_participant: Url,
}

/// Announces that a participant is no longer available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantUnavailableMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// The participant.
    #[serde(rename = "ids:affectedParticipant")]
    pub affected_participant: Url,
}

/// Carries a query as payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// Query language, e.g. `idsc:SPARQL`.
    #[serde(rename = "ids:queryLanguage")]
    pub query_language: String,
    /// Which stored data is queried, e.g. `idsc:ALL`.
    #[serde(rename = "ids:queryScope")]
    pub query_scope: String,
    /// Which recipients are addressed, e.g. `idsc:ANY`.
    #[serde(rename = "ids:recipientScope")]
    pub recipient_scope: String,
}

/// Rejects a message. The payload explains why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionMessage {
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// The reason.
    #[serde(rename = "ids:rejectionReason")]
    pub rejection_reason: RejectionReason,
}

/// A message of a type without a dedicated variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericMessage {
    /// The `@type` as received.
    #[serde(skip)]
    pub type_name: String,
    /// Common attributes.
    #[serde(flatten)]
    pub header: MessageHeader,
    /// All type specific attributes.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

macro_rules! ids_messages {
    ($( $variant:ident($ty:ident) => $type_name:literal, $kind:ident; )+) => {
        /// An IDS message header.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $(
                #[doc = concat!("`", $type_name, "`")]
                $variant($ty),
            )+
            /// Any other message type.
            Generic(GenericMessage),
        }

        /// The subtype of a [Message]. Used as handler registry key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MessageType {
            $(
                #[doc = concat!("`", $type_name, "`")]
                $variant,
            )+
            /// Any message type without a dedicated variant.
            Generic,
        }

        impl MessageType {
            /// All message types.
            pub const ALL: &'static [MessageType] = &[$(MessageType::$variant,)+ MessageType::Generic];

            /// The `@type` of the subtype. `None` for [MessageType::Generic].
            pub fn type_name(&self) -> Option<&'static str> {
                match self {
                    $(MessageType::$variant => Some($type_name),)+
                    MessageType::Generic => None,
                }
            }

            /// Resolves a `@type`, in prefixed or full IRI form. Unknown types map to
            /// [MessageType::Generic].
            pub fn from_type_name(name: &str) -> MessageType {
                let short = name.strip_prefix(IDS_IRI_PREFIX).map(|local| format!("{IDS_PREFIX}{local}"));
                match short.as_deref().unwrap_or(name) {
                    $($type_name => MessageType::$variant,)+
                    _ => MessageType::Generic,
                }
            }

            /// The payload kind messages of this type carry.
            pub fn payload_kind(&self) -> PayloadKind {
                match self {
                    $(MessageType::$variant => PayloadKind::$kind,)+
                    MessageType::Generic => PayloadKind::Any,
                }
            }
        }

        impl Message {
            /// The subtype.
            pub fn message_type(&self) -> MessageType {
                match self {
                    $(Message::$variant(_) => MessageType::$variant,)+
                    Message::Generic(_) => MessageType::Generic,
                }
            }

            /// The common attributes.
            pub fn header(&self) -> &MessageHeader {
                match self {
                    $(Message::$variant(m) => &m.header,)+
                    Message::Generic(m) => &m.header,
                }
            }

            /// The common attributes, mutable.
            pub fn header_mut(&mut self) -> &mut MessageHeader {
                match self {
                    $(Message::$variant(m) => &mut m.header,)+
                    Message::Generic(m) => &mut m.header,
                }
            }

            /// The `@type`.
            pub fn type_name(&self) -> &str {
                match self {
                    $(Message::$variant(_) => $type_name,)+
                    Message::Generic(m) => &m.type_name,
                }
            }

            fn attributes(&self) -> Result<Value, serde_json::Error> {
                match self {
                    $(Message::$variant(m) => serde_json::to_value(m),)+
                    Message::Generic(m) => serde_json::to_value(m),
                }
            }

            fn from_attributes(
                message_type: MessageType,
                type_name: String,
                attributes: Value,
            ) -> Result<Self, serde_json::Error> {
                match message_type {
                    $(MessageType::$variant => Ok(Message::$variant(serde_json::from_value(attributes)?)),)+
                    MessageType::Generic => {
                        let mut message: GenericMessage = serde_json::from_value(attributes)?;
                        message.type_name = type_name;
                        Ok(Message::Generic(message))
                    }
                }
            }
        }

        $(
            impl From<$ty> for Message {
                fn from(message: $ty) -> Self {
                    Message::$variant(message)
                }
            }
        )+
    };
}

ids_messages! {
    DescriptionRequest(DescriptionRequestMessage) => "ids:DescriptionRequestMessage", None;
    DescriptionResponse(DescriptionResponseMessage) => "ids:DescriptionResponseMessage", Entity;
    ArtifactRequest(ArtifactRequestMessage) => "ids:ArtifactRequestMessage", None;
    ArtifactResponse(ArtifactResponseMessage) => "ids:ArtifactResponseMessage", Binary;
    ContractOffer(ContractOfferMessage) => "ids:ContractOfferMessage", Entity;
    ContractRequest(ContractRequestMessage) => "ids:ContractRequestMessage", Entity;
    ContractResponse(ContractResponseMessage) => "ids:ContractResponseMessage", Entity;
    ContractAgreement(ContractAgreementMessage) => "ids:ContractAgreementMessage", Entity;
    ContractRejection(ContractRejectionMessage) => "ids:ContractRejectionMessage", Text;
    ResourceUpdate(ResourceUpdateMessage) => "ids:ResourceUpdateMessage", Entity;
    ResourceUnavailable(ResourceUnavailableMessage) => "ids:ResourceUnavailableMessage", OptionalEntity;
    ConnectorUpdate(ConnectorUpdateMessage) => "ids:ConnectorUpdateMessage", Entity;
    ConnectorUnavailable(ConnectorUnavailableMessage) => "ids:ConnectorUnavailableMessage", OptionalEntity;
    ParticipantUpdate(ParticipantUpdateMessage) => "ids:ParticipantUpdateMessage", Entity;
    ParticipantUnavailable(ParticipantUnavailableMessage) => "ids:ParticipantUnavailableMessage", OptionalEntity;
    Query(QueryMessage) => "ids:QueryMessage", Text;
    Result(ResultMessage) => "ids:ResultMessage", Text;
    Rejection(RejectionMessage) => "ids:RejectionMessage", Text;
    MessageProcessedNotification(MessageProcessedNotificationMessage) => "ids:MessageProcessedNotificationMessage", None;
}

impl Message {
    /// Decodes a header from its JSON-LD form.
    pub fn from_json_str(header: &str) -> Result<Self, HeaderError> {
        Self::from_value(serde_json::from_str(header)?)
    }

    /// Decodes a header from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, HeaderError> {
        let Value::Object(mut attributes) = value else {
            return Err(HeaderError::NotAnObject);
        };
        let type_name = match attributes.remove("@type") {
            Some(Value::String(type_name)) => type_name,
            _ => return Err(HeaderError::MissingType),
        };
        attributes.remove("@context");

        let message_type = MessageType::from_type_name(&type_name);
        Ok(Self::from_attributes(
            message_type,
            type_name,
            Value::Object(attributes),
        )?)
    }

    /// Encodes the header in its JSON-LD form.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Encodes the header as JSON value.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let Value::Object(attributes) = self.attributes()? else {
            return Err(<serde_json::Error as serde::ser::Error>::custom(
                "message is not a JSON object",
            ));
        };
        let mut object = Map::with_capacity(attributes.len() + 2);
        object.insert("@context".to_string(), ids_context());
        object.insert("@type".to_string(), Value::from(self.type_name()));
        object.extend(attributes);
        Ok(Value::Object(object))
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Message::from_value(value).map_err(D::Error::custom)
    }
}
