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
//! Outbound sending against an in process peer.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use ids_daps_client::token_provider::StaticTokenProvider;
use ids_messaging::{
    DeploymentMode,
    controller::MessageController,
    dispatcher::{DispatcherConfig, MessageDispatcher},
    filter::FilterChain,
    handler::{HandlerRegistry, MessageHandler, MessageResponse},
    identity::ConnectorIdentity,
    message::{ArtifactRequestMessage, ArtifactResponseMessage, Message, MessageType},
    rejection::RejectionReason,
    multipart::MultipartCodec,
    payload::{InboundPayload, MessageAndPayload, Payload},
    response::ResponseAssembler,
    sender::{MessageSender, SendError, SenderConfig},
    version::SupportedVersions,
};
use ids_sdk_token_validator::{
    claims::DatClaims,
    keys::{
        KeyProvider, StaticKeyProvider, VerificationKey, ed25519_encoding_key,
        insecure_ed25519_signing_key,
    },
    validator::DatValidator,
};
use jsonwebtoken::Algorithm;
use test_log::test;
use tokio_util::sync::CancellationToken;
use url::Url;

const DAPS_SEED: u8 = 21;
const DAPS_KID: &str = "daps";
const ARTIFACT: &[u8] = b"\x00artifact bytes\xff";

fn token(subject: &str) -> String {
    let key = ed25519_encoding_key(&insecure_ed25519_signing_key(DAPS_SEED)).unwrap();
    DatClaims::new(
        "https://daps.example",
        subject,
        SystemTime::now(),
        Duration::from_secs(600),
    )
    .sign(Algorithm::EdDSA, Some(DAPS_KID), &key)
    .unwrap()
}

fn keys() -> Arc<dyn KeyProvider> {
    let key = VerificationKey::ed25519(
        DAPS_KID,
        &insecure_ed25519_signing_key(DAPS_SEED).verifying_key(),
    )
    .unwrap();
    Arc::new(StaticKeyProvider::new(vec![key]))
}

fn provider() -> ConnectorIdentity {
    ConnectorIdentity::new(Url::parse("https://provider.example/").unwrap())
}

fn consumer() -> ConnectorIdentity {
    ConnectorIdentity::new(Url::parse("https://consumer.example/").unwrap())
}

struct ServeArtifact {
    correlate: bool,
}

#[async_trait]
impl MessageHandler for ServeArtifact {
    async fn handle(
        &self,
        message: &Message,
        _payload: InboundPayload,
    ) -> anyhow::Result<MessageResponse> {
        let mut header = provider().reply_header(message);
        if !self.correlate {
            header.correlation_message = Some(Url::parse("urn:uuid:00000000-0000-0000-0000-000000000000")?);
        }
        let response = MessageAndPayload::new(
            ArtifactResponseMessage::new(header).into(),
            Payload::Binary(Bytes::from_static(ARTIFACT)),
        )?;
        Ok(response.into())
    }
}

async fn inbound(
    State(controller): State<Arc<MessageController>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let response = controller.handle(content_type, body).await;
    match response.body {
        Some((content_type, body)) => {
            (response.status, [(CONTENT_TYPE, content_type)], body).into_response()
        }
        None => response.status.into_response(),
    }
}

struct Peer {
    cancel: CancellationToken,
    url: Url,
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn peer(response_token: &str, correlate: bool) -> Peer {
    peer_with_codec(response_token, correlate, MultipartCodec::default()).await
}

async fn peer_with_codec(response_token: &str, correlate: bool, codec: MultipartCodec) -> Peer {
    let handlers = HandlerRegistry::new().with_handler(
        MessageType::ArtifactRequest,
        Arc::new(ServeArtifact { correlate }),
    );
    let dispatcher = MessageDispatcher::new(
        DispatcherConfig::default(),
        Arc::new(DatValidator::new()),
        keys(),
        FilterChain::new(),
        handlers,
    );
    let controller = Arc::new(MessageController::new(
        codec,
        SupportedVersions::default(),
        Arc::new(dispatcher),
        ResponseAssembler::new(provider(), Arc::new(StaticTokenProvider::new(response_token))),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let router = Router::new()
        .route("/api/ids/data", post(inbound))
        .with_state(controller);
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .unwrap();
    });

    Peer {
        cancel,
        url: Url::parse(&format!("http://{addr}/api/ids/data")).unwrap(),
    }
}

fn sender(mode: DeploymentMode) -> MessageSender {
    MessageSender::new(
        SenderConfig {
            mode,
            ..Default::default()
        },
        Arc::new(StaticTokenProvider::new(token("consumer"))),
        Arc::new(DatValidator::new()),
        keys(),
    )
    .unwrap()
}

fn artifact_request() -> MessageAndPayload {
    let mut header = consumer().header();
    header.recipient_connector = vec![provider().connector_id];
    MessageAndPayload::new(
        ArtifactRequestMessage {
            header,
            requested_artifact: Url::parse("https://provider.example/artifacts/7").unwrap(),
        }
        .into(),
        Payload::Empty,
    )
    .unwrap()
}

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn should_send_and_validate_response() {
    let peer = peer(&token("provider"), true).await;

    let received = sender(DeploymentMode::Productive)
        .send(&peer.url, artifact_request())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(received.status, http::StatusCode::OK);
    assert_eq!(received.message.message_type(), MessageType::ArtifactResponse);
    assert_eq!(received.payload.bytes().map(|b| b.as_ref()), Some(ARTIFACT));
    assert_eq!(received.claims.unwrap().sub, "provider");
}

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn invalid_response_token_is_an_error() {
    let peer = peer("INVALID_TOKEN", true).await;

    let result = sender(DeploymentMode::Productive)
        .send(&peer.url, artifact_request())
        .await;
    assert!(matches!(result, Err(SendError::InvalidResponseToken(_))));

    // Test deployments accept the response without validation.
    let received = sender(DeploymentMode::Test)
        .send(&peer.url, artifact_request())
        .await
        .unwrap()
        .unwrap();
    assert!(received.claims.is_none());
}

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn uncorrelated_response_is_an_error() {
    let peer = peer(&token("provider"), false).await;

    let result = sender(DeploymentMode::Productive)
        .send(&peer.url, artifact_request())
        .await;

    assert!(matches!(result, Err(SendError::CorrelationMismatch { .. })));
}

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn uncorrelated_rejection_is_returned() {
    // The peer cannot decode a body this large, so its rejection has no correlation.
    let peer = peer_with_codec(&token("provider"), true, MultipartCodec::new(64)).await;

    let received = sender(DeploymentMode::Productive)
        .send(&peer.url, artifact_request())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(received.status, http::StatusCode::PAYLOAD_TOO_LARGE);
    let Message::Rejection(rejection) = &received.message else {
        panic!("expected a rejection, got {}", received.message.type_name());
    };
    assert_eq!(rejection.rejection_reason, RejectionReason::MalformedMessage);
    assert_eq!(rejection.header.correlation_message, None);
    assert_eq!(received.claims.unwrap().sub, "provider");
}

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn unreachable_peer_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
    drop(listener);

    let result = sender(DeploymentMode::Productive)
        .send(&url, artifact_request())
        .await;

    assert!(matches!(result, Err(SendError::Transport { .. })));
}
