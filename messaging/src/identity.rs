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
//! Identity of the local connector and header templates.

use chrono::Utc;
use url::Url;
use uuid::Uuid;

use crate::{header::MessageHeader, message::Message, version::DEFAULT_MODEL_VERSION};

/// The local connector as it appears in message headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorIdentity {
    /// `ids:issuerConnector` of outbound messages.
    pub connector_id: Url,
    /// `ids:senderAgent` of outbound messages.
    pub sender_agent: Url,
    /// `ids:modelVersion` of outbound messages.
    pub model_version: String,
}

impl ConnectorIdentity {
    /// Creates an identity that sends as `connector_id` with the default model version.
    pub fn new(connector_id: Url) -> Self {
        Self {
            sender_agent: connector_id.clone(),
            connector_id,
            model_version: DEFAULT_MODEL_VERSION.to_string(),
        }
    }

    /// A fresh header: new `@id`, issued now, no token and no recipients.
    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            id: new_message_id(),
            issued: Utc::now(),
            model_version: self.model_version.clone(),
            issuer_connector: self.connector_id.clone(),
            sender_agent: self.sender_agent.clone(),
            security_token: None,
            recipient_connector: Vec::new(),
            recipient_agent: Vec::new(),
            correlation_message: None,
            transfer_contract: None,
            content_version: None,
        }
    }

    /// A fresh header answering `inbound`.
    pub fn reply_header(&self, inbound: &Message) -> MessageHeader {
        let mut header = self.header();
        reply_to(&mut header, inbound);
        header
    }
}

/// Points `header` at the sender of `inbound`.
pub(crate) fn reply_to(header: &mut MessageHeader, inbound: &Message) {
    let inbound = inbound.header();
    header.correlation_message = Some(inbound.id.clone());
    header.recipient_connector = vec![inbound.issuer_connector.clone()];
    header.recipient_agent = vec![inbound.sender_agent.clone()];
}

/// A new `urn:uuid:` message id.
pub fn new_message_id() -> Url {
    Url::parse(&Uuid::new_v4().urn().to_string()).expect("URN UUIDs are valid URLs")
}
