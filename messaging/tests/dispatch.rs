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
//! Inbound pipeline: dispatcher and controller.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use ids_daps_client::token_provider::StaticTokenProvider;
use ids_messaging::{
    DeploymentMode,
    controller::MessageController,
    dispatcher::{DAT_NOT_VALIDATED, DispatchError, DispatcherConfig, MessageDispatcher},
    filter::{FilterChain, FilterError, FilterOutcome},
    handler::{ClaimsAwareHandler, HandlerRegistry, MessageHandler, MessageResponse},
    identity::ConnectorIdentity,
    message::{DescriptionRequestMessage, DescriptionResponseMessage, Message, MessageType, QueryMessage},
    multipart::{MultipartCodec, MultipartMap},
    payload::{InboundPayload, MessageAndPayload, Payload},
    rejection::RejectionReason,
    response::ResponseAssembler,
    version::SupportedVersions,
};
use ids_sdk_token_validator::{
    claims::DatClaims,
    keys::{StaticKeyProvider, VerificationKey, ed25519_encoding_key, insecure_ed25519_signing_key},
    profile::SecurityProfile,
    validator::DatValidator,
};
use jsonwebtoken::Algorithm;
use test_log::test;
use url::Url;

const DAPS_SEED: u8 = 11;
const DAPS_KID: &str = "daps";
const PEER: &str = "https://peer.example/";

fn peer() -> ConnectorIdentity {
    ConnectorIdentity::new(Url::parse(PEER).unwrap())
}

fn local() -> ConnectorIdentity {
    ConnectorIdentity::new(Url::parse("https://local.example/").unwrap())
}

fn claims(issued: SystemTime, lifetime: Duration) -> DatClaims {
    let mut claims = DatClaims::new("https://daps.example", "peer", issued, lifetime);
    claims.security_profile = Some(SecurityProfile::Trust.iri());
    claims.referring_connector = Some(PEER.to_string());
    claims
}

fn sign(claims: &DatClaims) -> String {
    let key = ed25519_encoding_key(&insecure_ed25519_signing_key(DAPS_SEED)).unwrap();
    claims.sign(Algorithm::EdDSA, Some(DAPS_KID), &key).unwrap()
}

fn valid_token() -> String {
    sign(&claims(SystemTime::now(), Duration::from_secs(3600)))
}

fn description_request(token: Option<String>) -> Message {
    let mut header = peer().header();
    if let Some(token) = token {
        header.set_token(token);
    }
    DescriptionRequestMessage {
        header,
        requested_element: None,
    }
    .into()
}

struct Describe;

#[async_trait]
impl MessageHandler for Describe {
    async fn handle(
        &self,
        message: &Message,
        _payload: InboundPayload,
    ) -> anyhow::Result<MessageResponse> {
        let response = DescriptionResponseMessage::new(local().reply_header(message));
        Ok(MessageAndPayload::new(
            response.into(),
            Payload::Entity(serde_json::json!({"@type": "ids:BaseConnector"})),
        )?
        .into())
    }
}

struct Failing;

#[async_trait]
impl MessageHandler for Failing {
    async fn handle(&self, _: &Message, _: InboundPayload) -> anyhow::Result<MessageResponse> {
        anyhow::bail!("database password is hunter2")
    }
}

struct Panicking;

#[async_trait]
impl MessageHandler for Panicking {
    async fn handle(&self, _: &Message, _: InboundPayload) -> anyhow::Result<MessageResponse> {
        let artifacts: Vec<Bytes> = Vec::new();
        Ok(MessageAndPayload::new(
            DescriptionResponseMessage::new(local().header()).into(),
            Payload::Binary(artifacts[0].clone()),
        )?
        .into())
    }
}

struct Slow;

#[async_trait]
impl MessageHandler for Slow {
    async fn handle(&self, _: &Message, _: InboundPayload) -> anyhow::Result<MessageResponse> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(MessageResponse::NoContent)
    }
}

/// Records the claims it was called with.
#[derive(Default)]
struct RecordClaims {
    calls: AtomicUsize,
    with_claims: AtomicUsize,
}

#[async_trait]
impl ClaimsAwareHandler for RecordClaims {
    async fn handle(
        &self,
        _: &Message,
        _: InboundPayload,
        claims: Option<&DatClaims>,
    ) -> anyhow::Result<MessageResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if claims.is_some() {
            self.with_claims.fetch_add(1, Ordering::SeqCst);
        }
        Ok(MessageResponse::NoContent)
    }
}

fn registry() -> HandlerRegistry {
    HandlerRegistry::new().with_handler(MessageType::DescriptionRequest, Arc::new(Describe))
}

fn dispatcher(config: DispatcherConfig, filters: FilterChain, handlers: HandlerRegistry) -> MessageDispatcher {
    let key =
        VerificationKey::ed25519(DAPS_KID, &insecure_ed25519_signing_key(DAPS_SEED).verifying_key())
            .unwrap();
    MessageDispatcher::new(
        config,
        Arc::new(DatValidator::new()),
        Arc::new(StaticKeyProvider::new(vec![key])),
        filters,
        handlers,
    )
}

fn productive() -> DispatcherConfig {
    DispatcherConfig::default()
}

fn rejection_reason(response: &MessageResponse) -> Option<RejectionReason> {
    match response {
        MessageResponse::Rejection(rejection) => Some(rejection.reason),
        _ => None,
    }
}

#[test(tokio::test)]
async fn should_dispatch_valid_message() {
    let dispatcher = dispatcher(productive(), FilterChain::new(), registry());
    let request = description_request(Some(valid_token()));

    let response = dispatcher
        .dispatch(&request, InboundPayload::default())
        .await
        .unwrap();

    let map = match response {
        MessageResponse::Map(map) => map,
        other => panic!("expected a response message, got {other:?}"),
    };
    assert_eq!(map.message().message_type(), MessageType::DescriptionResponse);
    assert_eq!(
        map.message().header().correlation_message.as_ref(),
        Some(&request.header().id)
    );
}

#[test(tokio::test)]
async fn dispatch_is_repeatable() {
    let dispatcher = dispatcher(productive(), FilterChain::new(), registry());
    let request = description_request(Some(valid_token()));

    for _ in 0..3 {
        let response = dispatcher
            .dispatch(&request, InboundPayload::default())
            .await
            .unwrap();
        assert!(matches!(response, MessageResponse::Map(_)));
    }
}

#[test(tokio::test)]
async fn expired_token_is_not_authorized() {
    let dispatcher = dispatcher(productive(), FilterChain::new(), registry());
    let issued = SystemTime::now() - Duration::from_secs(7200);
    let expired = sign(&claims(issued, Duration::from_secs(3600)));

    let response = dispatcher
        .dispatch(&description_request(Some(expired)), InboundPayload::default())
        .await
        .unwrap();

    let rejection = match response {
        MessageResponse::Rejection(rejection) => rejection,
        other => panic!("expected a rejection, got {other:?}"),
    };
    assert_eq!(rejection.reason, RejectionReason::NotAuthorized);
    // The cause is not revealed to the sender.
    assert_eq!(rejection.message, DAT_NOT_VALIDATED);
}

#[test(tokio::test)]
async fn missing_or_foreign_token_is_not_authorized() {
    let dispatcher = dispatcher(productive(), FilterChain::new(), registry());

    let missing = dispatcher
        .dispatch(&description_request(None), InboundPayload::default())
        .await
        .unwrap();
    assert_eq!(rejection_reason(&missing), Some(RejectionReason::NotAuthorized));

    let key = ed25519_encoding_key(&insecure_ed25519_signing_key(DAPS_SEED + 1)).unwrap();
    let foreign = claims(SystemTime::now(), Duration::from_secs(3600))
        .sign(Algorithm::EdDSA, Some(DAPS_KID), &key)
        .unwrap();
    let response = dispatcher
        .dispatch(&description_request(Some(foreign)), InboundPayload::default())
        .await
        .unwrap();
    assert_eq!(rejection_reason(&response), Some(RejectionReason::NotAuthorized));
}

#[test(tokio::test)]
async fn insufficient_security_profile_is_not_authorized() {
    let dispatcher = dispatcher(
        DispatcherConfig {
            required_security_profile: Some(SecurityProfile::TrustPlus),
            ..productive()
        },
        FilterChain::new(),
        registry(),
    );

    let response = dispatcher
        .dispatch(&description_request(Some(valid_token())), InboundPayload::default())
        .await
        .unwrap();

    assert_eq!(rejection_reason(&response), Some(RejectionReason::NotAuthorized));
}

#[test(tokio::test)]
async fn unknown_type_is_not_supported() {
    let dispatcher = dispatcher(productive(), FilterChain::new(), registry());
    let mut header = peer().header();
    header.set_token(valid_token());
    let query = Message::from(QueryMessage {
        header,
        query_language: "idsc:SPARQL".to_string(),
        query_scope: "idsc:ALL".to_string(),
        recipient_scope: "idsc:ANY".to_string(),
    });

    let response = dispatcher
        .dispatch(&query, InboundPayload::default())
        .await
        .unwrap();

    assert_eq!(
        rejection_reason(&response),
        Some(RejectionReason::MessageTypeNotSupported)
    );
}

#[test(tokio::test)]
async fn test_deployment_skips_validation() {
    let handler = Arc::new(RecordClaims::default());
    let mut handlers = HandlerRegistry::new();
    handlers.register_with_claims(MessageType::DescriptionRequest, handler.clone());
    let dispatcher = dispatcher(
        DispatcherConfig {
            mode: DeploymentMode::Test,
            ..productive()
        },
        FilterChain::new(),
        handlers,
    );

    let response = dispatcher
        .dispatch(
            &description_request(Some("INVALID_TOKEN".to_string())),
            InboundPayload::default(),
        )
        .await
        .unwrap();

    assert_eq!(response, MessageResponse::NoContent);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler.with_claims.load(Ordering::SeqCst), 0);
}

#[test(tokio::test)]
async fn claims_reach_claims_aware_handlers() {
    let handler = Arc::new(RecordClaims::default());
    let mut handlers = HandlerRegistry::new();
    handlers.register_with_claims(MessageType::DescriptionRequest, handler.clone());
    let dispatcher = dispatcher(productive(), FilterChain::new(), handlers);

    dispatcher
        .dispatch(&description_request(Some(valid_token())), InboundPayload::default())
        .await
        .unwrap();

    assert_eq!(handler.with_claims.load(Ordering::SeqCst), 1);
}

#[test(tokio::test)]
async fn referring_connector_must_match_issuer() {
    let dispatcher = dispatcher(
        DispatcherConfig {
            referring_connector_check: true,
            ..productive()
        },
        FilterChain::new(),
        registry(),
    );

    let matching = dispatcher
        .dispatch(&description_request(Some(valid_token())), InboundPayload::default())
        .await
        .unwrap();
    assert!(matches!(matching, MessageResponse::Map(_)));

    let mut other = claims(SystemTime::now(), Duration::from_secs(3600));
    other.referring_connector = Some("https://someone-else.example/".to_string());
    let response = dispatcher
        .dispatch(&description_request(Some(sign(&other))), InboundPayload::default())
        .await
        .unwrap();
    assert_eq!(rejection_reason(&response), Some(RejectionReason::BadParameters));

    other.referring_connector = None;
    let response = dispatcher
        .dispatch(&description_request(Some(sign(&other))), InboundPayload::default())
        .await
        .unwrap();
    assert_eq!(rejection_reason(&response), Some(RejectionReason::BadParameters));
}

#[test(tokio::test)]
async fn filters_run_before_handlers() {
    let failing = FilterChain::new().with_filter(
        |_: &Message| -> Result<FilterOutcome, FilterError> {
            Ok(FilterOutcome::Failure("missing transfer contract".to_string()))
        },
    );
    let dispatcher = dispatcher(productive(), failing, registry());

    let response = dispatcher
        .dispatch(&description_request(Some(valid_token())), InboundPayload::default())
        .await
        .unwrap();

    let rejection = match response {
        MessageResponse::Rejection(rejection) => rejection,
        other => panic!("expected a rejection, got {other:?}"),
    };
    assert_eq!(rejection.reason, RejectionReason::MalformedMessage);
    assert_eq!(rejection.message, "missing transfer contract");

    let broken = FilterChain::new().with_filter(|_: &Message| -> Result<FilterOutcome, FilterError> {
        Err("filter backend unavailable".into())
    });
    let dispatcher = self::dispatcher(productive(), broken, registry());
    let result = dispatcher
        .dispatch(&description_request(Some(valid_token())), InboundPayload::default())
        .await;
    assert!(matches!(result, Err(DispatchError::Filter(_))));
}

#[test(tokio::test)]
async fn handler_failures_are_internal_errors() {
    let handlers = HandlerRegistry::new()
        .with_handler(MessageType::DescriptionRequest, Arc::new(Failing));
    let dispatcher = dispatcher(productive(), FilterChain::new(), handlers);

    let response = dispatcher
        .dispatch(&description_request(Some(valid_token())), InboundPayload::default())
        .await
        .unwrap();

    let rejection = match response {
        MessageResponse::Rejection(rejection) => rejection,
        other => panic!("expected a rejection, got {other:?}"),
    };
    assert_eq!(rejection.reason, RejectionReason::InternalRecipientError);
    assert!(!rejection.message.contains("hunter2"));
}

#[test(tokio::test)]
async fn handler_panics_are_internal_errors() {
    let handlers =
        HandlerRegistry::new().with_handler(MessageType::DescriptionRequest, Arc::new(Panicking));
    let dispatcher = dispatcher(productive(), FilterChain::new(), handlers);

    let response = dispatcher
        .dispatch(&description_request(Some(valid_token())), InboundPayload::default())
        .await
        .unwrap();
    assert_eq!(
        rejection_reason(&response),
        Some(RejectionReason::InternalRecipientError)
    );

    // With a timeout configured the panic is caught as well.
    let handlers =
        HandlerRegistry::new().with_handler(MessageType::DescriptionRequest, Arc::new(Panicking));
    let dispatcher = self::dispatcher(
        DispatcherConfig {
            handler_timeout: Some(Duration::from_secs(5)),
            ..productive()
        },
        FilterChain::new(),
        handlers,
    );
    let response = dispatcher
        .dispatch(&description_request(Some(valid_token())), InboundPayload::default())
        .await
        .unwrap();
    assert_eq!(
        rejection_reason(&response),
        Some(RejectionReason::InternalRecipientError)
    );
}

#[test(tokio::test)]
async fn controller_answers_panicking_handler() {
    let handlers =
        HandlerRegistry::new().with_handler(MessageType::DescriptionRequest, Arc::new(Panicking));
    let controller = MessageController::new(
        MultipartCodec::default(),
        SupportedVersions::default(),
        Arc::new(dispatcher(
            DispatcherConfig {
                mode: DeploymentMode::Test,
                ..productive()
            },
            FilterChain::new(),
            handlers,
        )),
        ResponseAssembler::new(local(), Arc::new(StaticTokenProvider::new("local.dat"))),
    );
    let (content_type, body) = encode(&description_request(None));

    let response = tokio::spawn(async move { controller.handle(Some(&content_type), body).await })
        .await
        .expect("controller must not panic");

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        rejection_of(response.body).await,
        RejectionReason::InternalRecipientError
    );
}

#[test(tokio::test)]
#[ntest::timeout(10_000)]
async fn slow_handlers_time_out() {
    let handlers =
        HandlerRegistry::new().with_handler(MessageType::DescriptionRequest, Arc::new(Slow));
    let dispatcher = dispatcher(
        DispatcherConfig {
            handler_timeout: Some(Duration::from_millis(50)),
            ..productive()
        },
        FilterChain::new(),
        handlers,
    );

    let response = dispatcher
        .dispatch(&description_request(Some(valid_token())), InboundPayload::default())
        .await
        .unwrap();

    assert_eq!(
        rejection_reason(&response),
        Some(RejectionReason::InternalRecipientError)
    );
}

fn controller(config: DispatcherConfig, filters: FilterChain) -> MessageController {
    MessageController::new(
        MultipartCodec::default(),
        SupportedVersions::default(),
        Arc::new(dispatcher(config, filters, registry())),
        ResponseAssembler::new(local(), Arc::new(StaticTokenProvider::new("local.dat"))),
    )
}

fn encode(message: &Message) -> (String, Bytes) {
    MultipartCodec::default().build(&MultipartMap {
        header: message.to_json_string().unwrap(),
        payload: None,
    })
}

async fn rejection_of(body: Option<(String, Bytes)>) -> RejectionReason {
    let (content_type, body) = body.expect("response has a body");
    let map = MultipartCodec::default()
        .parse(&content_type, body)
        .await
        .unwrap();
    match Message::from_json_str(&map.header).unwrap() {
        Message::Rejection(rejection) => rejection.rejection_reason,
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[test(tokio::test)]
async fn controller_answers_valid_message() {
    let controller = controller(productive(), FilterChain::new());
    let (content_type, body) = encode(&description_request(Some(valid_token())));

    let response = controller.handle(Some(&content_type), body).await;

    assert_eq!(response.status, StatusCode::OK);
    let (content_type, body) = response.body.unwrap();
    let map = MultipartCodec::default()
        .parse(&content_type, body)
        .await
        .unwrap();
    let message = Message::from_json_str(&map.header).unwrap();
    assert_eq!(message.message_type(), MessageType::DescriptionResponse);
    assert_eq!(message.header().token_value(), Some("local.dat"));
    let payload: serde_json::Value = serde_json::from_slice(&map.payload.unwrap()).unwrap();
    assert_eq!(payload["@type"], "ids:BaseConnector");
}

#[test(tokio::test)]
async fn controller_status_mapping() {
    let controller = controller(productive(), FilterChain::new());

    // Framing error.
    let response = controller
        .handle(Some("text/plain"), Bytes::from_static(b"hello"))
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(rejection_of(response.body).await, RejectionReason::MalformedMessage);

    // No header part.
    let (content_type, body) = MultipartCodec::default().build(&MultipartMap {
        header: String::new(),
        payload: None,
    });
    let body = String::from_utf8_lossy(&body).replace("name=\"header\"", "name=\"other\"");
    let response = controller
        .handle(Some(&content_type), Bytes::from(body))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(rejection_of(response.body).await, RejectionReason::MalformedMessage);

    // Undecodable header.
    let (content_type, body) = MultipartCodec::default().build(&MultipartMap {
        header: r#"{"@type": "ids:DescriptionRequestMessage"}"#.to_string(),
        payload: None,
    });
    let response = controller.handle(Some(&content_type), body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(rejection_of(response.body).await, RejectionReason::MalformedMessage);

    // Unsupported version.
    let mut request = description_request(Some(valid_token()));
    request.header_mut().model_version = "3.0.0".to_string();
    let (content_type, body) = encode(&request);
    let response = controller.handle(Some(&content_type), body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        rejection_of(response.body).await,
        RejectionReason::VersionNotSupported
    );

    // Dispatcher rejections are delivered with 200.
    let (content_type, body) = encode(&description_request(None));
    let response = controller.handle(Some(&content_type), body).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(rejection_of(response.body).await, RejectionReason::NotAuthorized);
}

#[test(tokio::test)]
async fn controller_rejects_oversized_stream() {
    let controller = MessageController::new(
        MultipartCodec::new(256),
        SupportedVersions::default(),
        Arc::new(dispatcher(productive(), FilterChain::new(), registry())),
        ResponseAssembler::new(local(), Arc::new(StaticTokenProvider::new("local.dat"))),
    );
    let (content_type, body) = encode(&description_request(Some(valid_token())));
    let chunks: Vec<Result<Bytes, std::io::Error>> = body
        .chunks(32)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();

    let response = controller
        .handle_stream(Some(&content_type), futures::stream::iter(chunks))
        .await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(rejection_of(response.body).await, RejectionReason::MalformedMessage);
}

#[test(tokio::test)]
async fn controller_filter_fault_is_internal_error() {
    let broken = FilterChain::new().with_filter(|_: &Message| -> Result<FilterOutcome, FilterError> {
        Err("unavailable".into())
    });
    let controller = controller(productive(), broken);
    let (content_type, body) = encode(&description_request(Some(valid_token())));

    let response = controller.handle(Some(&content_type), body).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        rejection_of(response.body).await,
        RejectionReason::InternalRecipientError
    );
}

#[test(tokio::test)]
async fn every_rejection_is_well_formed() {
    let controller = controller(productive(), FilterChain::new());
    let expired = description_request(Some(sign(&claims(
        SystemTime::now() - Duration::from_secs(7200),
        Duration::from_secs(60),
    ))));
    let mut unsupported = expired.clone();
    unsupported.header_mut().model_version = "1.0".to_string();

    for request in [expired, unsupported] {
        let (content_type, body) = encode(&request);
        let (content_type, body) = controller
            .handle(Some(&content_type), body)
            .await
            .body
            .unwrap();
        let map = MultipartCodec::default()
            .parse(&content_type, body)
            .await
            .unwrap();
        let Message::Rejection(rejection) = Message::from_json_str(&map.header).unwrap() else {
            panic!("expected a rejection");
        };
        assert_eq!(rejection.header.correlation_message, Some(request.header().id.clone()));
        assert_eq!(
            rejection.header.recipient_connector,
            vec![request.header().issuer_connector.clone()]
        );
        assert_eq!(rejection.header.issuer_connector, local().connector_id);
        assert_eq!(rejection.header.token_value(), Some("local.dat"));
        assert!(!map.payload.unwrap().is_empty());
    }
}
