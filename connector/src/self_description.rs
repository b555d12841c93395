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
//! Self-description of the connector, served for `ids:DescriptionRequestMessage`.

use async_trait::async_trait;
use ids_messaging::{
    handler::{MessageHandler, MessageResponse},
    identity::ConnectorIdentity,
    message::{DescriptionResponseMessage, Message, ids_context},
    payload::{InboundPayload, MessageAndPayload, Payload},
    rejection::RejectionReason,
};
use serde_json::{Value, json};
use url::Url;

/// What the self-description announces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfDescription {
    /// `@id` of the connector.
    pub connector_id: Url,
    /// `ids:title`.
    pub title: String,
    /// `ids:description`.
    pub description: Option<String>,
    /// `ids:outboundModelVersion`.
    pub outbound_model_version: String,
    /// `ids:inboundModelVersion`.
    pub inbound_model_versions: Vec<String>,
    /// Access URL of the inbound endpoint.
    pub access_url: Url,
}

impl SelfDescription {
    /// The JSON-LD `ids:BaseConnector` document.
    pub fn to_json_ld(&self) -> Value {
        let mut document = json!({
            "@context": ids_context(),
            "@type": "ids:BaseConnector",
            "@id": self.connector_id,
            "ids:title": [{ "@value": self.title }],
            "ids:outboundModelVersion": self.outbound_model_version,
            "ids:inboundModelVersion": self.inbound_model_versions,
            "ids:hasDefaultEndpoint": {
                "@type": "ids:ConnectorEndpoint",
                "@id": self.access_url,
                "ids:accessURL": { "@id": self.access_url },
            },
        });
        if let Some(description) = &self.description {
            document["ids:description"] = json!([{ "@value": description }]);
        }
        document
    }
}

/// Answers description requests for the connector itself. Requests for any other element are
/// rejected with `NOT_FOUND`.
pub struct SelfDescriptionHandler {
    identity: ConnectorIdentity,
    document: Value,
}

impl SelfDescriptionHandler {
    /// Serves `description` as the local connector `identity`.
    pub fn new(identity: ConnectorIdentity, description: &SelfDescription) -> Self {
        Self {
            identity,
            document: description.to_json_ld(),
        }
    }
}

#[async_trait]
impl MessageHandler for SelfDescriptionHandler {
    async fn handle(
        &self,
        message: &Message,
        _payload: InboundPayload,
    ) -> anyhow::Result<MessageResponse> {
        let Message::DescriptionRequest(request) = message else {
            anyhow::bail!(
                "self-description handler registered for {}",
                message.type_name()
            );
        };

        if let Some(element) = &request.requested_element {
            if *element != self.identity.connector_id {
                tracing::debug!(%element, "Description of unknown element requested");
                return Ok(MessageResponse::rejection(
                    RejectionReason::NotFound,
                    format!("no description for {element}"),
                ));
            }
        }

        let response = DescriptionResponseMessage::new(self.identity.reply_header(message));
        Ok(MessageAndPayload::new(response.into(), Payload::Entity(self.document.clone()))?.into())
    }
}
