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
//! Turns dispatcher results into wire responses.

use std::sync::Arc;

use ids_daps_client::{INVALID_TOKEN, token_provider::TokenProvider};
use tracing::error;

use crate::{
    handler::{ErrorResponse, MessageResponse},
    identity::{ConnectorIdentity, reply_to},
    message::{Message, RejectionMessage},
    multipart::MultipartMap,
    payload::MessageAndPayload,
};

/// Assembles response messages of the local connector.
///
/// Every response carries a current DAT of the local connector and points at the inbound
/// message it answers.
#[derive(Clone)]
pub struct ResponseAssembler {
    identity: ConnectorIdentity,
    tokens: Arc<dyn TokenProvider>,
}

impl ResponseAssembler {
    /// Creates an assembler that signs responses with DATs from `tokens`.
    pub fn new(identity: ConnectorIdentity, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { identity, tokens }
    }

    /// The local connector.
    pub fn identity(&self) -> &ConnectorIdentity {
        &self.identity
    }

    /// Builds a rejection of `inbound`. Without `inbound` (undecodable header) the rejection
    /// correlates to nothing.
    pub fn rejection(&self, inbound: Option<&Message>, rejection: &ErrorResponse) -> MessageAndPayload {
        let mut header = self.identity.header();
        if let Some(inbound) = inbound {
            reply_to(&mut header, inbound);
        }
        MessageAndPayload::rejection(
            RejectionMessage {
                header,
                rejection_reason: rejection.reason,
            },
            rejection.message.clone(),
        )
    }

    /// Turns `response` into the wire map. `None` for [MessageResponse::NoContent].
    pub async fn assemble(
        &self,
        inbound: Option<&Message>,
        response: MessageResponse,
    ) -> Result<Option<MultipartMap>, serde_json::Error> {
        let mut map = match response {
            MessageResponse::NoContent => return Ok(None),
            MessageResponse::Rejection(rejection) => self.rejection(inbound, &rejection),
            MessageResponse::Map(map) => map,
        };

        let header = map.header_mut();
        if let Some(inbound) = inbound {
            let inbound = inbound.header();
            if header.correlation_message.is_none() {
                header.correlation_message = Some(inbound.id.clone());
            }
            if header.recipient_connector.is_empty() {
                header.recipient_connector = vec![inbound.issuer_connector.clone()];
            }
        }
        header.set_token(self.token().await);

        map.to_multipart().map(Some)
    }

    async fn token(&self) -> String {
        match self.tokens.get_token().await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Could not obtain DAT for response");
                INVALID_TOKEN.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use ids_daps_client::{issuer::DapsError, token_provider::StaticTokenProvider};
    use test_log::test;
    use url::Url;

    use super::*;
    use crate::{
        message::{DescriptionResponseMessage, MessageType, ResultMessage},
        payload::Payload,
        rejection::RejectionReason,
    };

    struct FailingTokens;

    #[async_trait]
    impl TokenProvider for FailingTokens {
        async fn get_token(&self) -> Result<String, DapsError> {
            Err(DapsError::EmptyResponse)
        }
    }

    fn identity(url: &str) -> ConnectorIdentity {
        ConnectorIdentity::new(Url::parse(url).unwrap())
    }

    fn inbound() -> Message {
        Message::from(ResultMessage::new(identity("https://peer.example").header()))
    }

    #[test(tokio::test)]
    async fn rejection_is_well_formed() {
        let assembler = ResponseAssembler::new(
            identity("https://local.example"),
            Arc::new(StaticTokenProvider::new("local.dat")),
        );
        let inbound = inbound();

        let map = assembler
            .assemble(
                Some(&inbound),
                MessageResponse::rejection(RejectionReason::NotAuthorized, "DAT could not be validated"),
            )
            .await
            .unwrap()
            .unwrap();

        let message = Message::from_json_str(&map.header).unwrap();
        let Message::Rejection(rejection) = &message else {
            panic!("expected rejection, got {message:?}");
        };
        assert_eq!(rejection.rejection_reason, RejectionReason::NotAuthorized);
        assert_eq!(
            rejection.header.correlation_message.as_ref(),
            Some(&inbound.header().id)
        );
        assert_eq!(rejection.header.token_value(), Some("local.dat"));
        assert_eq!(
            map.payload.as_deref(),
            Some(b"DAT could not be validated".as_slice())
        );
    }

    #[test(tokio::test)]
    async fn should_fill_correlation_of_handler_responses() {
        let local = identity("https://local.example");
        let assembler = ResponseAssembler::new(local.clone(), Arc::new(FailingTokens));
        let inbound = inbound();
        let response = MessageAndPayload::new(
            DescriptionResponseMessage::new(local.header()).into(),
            Payload::Text("{}".to_string()),
        )
        .unwrap();

        let map = assembler
            .assemble(Some(&inbound), response.into())
            .await
            .unwrap()
            .unwrap();

        let message = Message::from_json_str(&map.header).unwrap();
        assert_eq!(message.message_type(), MessageType::DescriptionResponse);
        assert_eq!(
            message.header().correlation_message.as_ref(),
            Some(&inbound.header().id)
        );
        assert_eq!(
            message.header().recipient_connector,
            vec![inbound.header().issuer_connector.clone()]
        );
        assert_eq!(message.header().token_value(), Some(INVALID_TOKEN));
    }

    #[test(tokio::test)]
    async fn no_content_has_no_body() {
        let assembler = ResponseAssembler::new(
            identity("https://local.example"),
            Arc::new(StaticTokenProvider::new("t")),
        );
        assert!(
            assembler
                .assemble(Some(&inbound()), MessageResponse::NoContent)
                .await
                .unwrap()
                .is_none()
        );
    }
}
