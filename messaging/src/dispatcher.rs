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
//! Inbound message pipeline.
//!
//! Every inbound message passes, in order: DAT validation (skipped in test deployments), the
//! pre-dispatch filters, handler resolution and the handler itself. Each step either rejects the
//! message with a [RejectionReason] or hands it on.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::FutureExt;
use ids_daps_client::DeploymentMode;
use ids_sdk_token_validator::{
    claims::DatClaims, keys::KeyProvider, profile::SecurityProfile, validator::TokenValidator,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    filter::{FilterChain, FilterError, FilterOutcome},
    handler::{ErrorResponse, HandlerRegistry, MessageResponse},
    message::Message,
    payload::InboundPayload,
    rejection::RejectionReason,
};

/// Explanation sent for every DAT validation failure.
pub const DAT_NOT_VALIDATED: &str = "DAT could not be validated";

/// Dispatcher settings.
#[derive(Debug, Clone, Default)]
pub struct DispatcherConfig {
    /// In [DeploymentMode::Test] inbound DATs are not validated.
    pub mode: DeploymentMode,
    /// Minimum security profile of inbound DATs.
    pub required_security_profile: Option<SecurityProfile>,
    /// Require the `referringConnector` claim to equal the `ids:issuerConnector` of the header.
    pub referring_connector_check: bool,
    /// Upper bound for a handler call.
    pub handler_timeout: Option<Duration>,
}

/// Faults that are not answered with a rejection.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A pre-dispatch filter could not run.
    #[error("pre-dispatch filter failed: {0}")]
    Filter(#[source] FilterError),
}

/// Validates, filters and routes inbound messages.
pub struct MessageDispatcher {
    config: DispatcherConfig,
    validator: Arc<dyn TokenValidator>,
    keys: Arc<dyn KeyProvider>,
    filters: FilterChain,
    handlers: HandlerRegistry,
}

impl MessageDispatcher {
    /// Creates a dispatcher. `keys` provides the DAPS keys that inbound DATs are validated with.
    pub fn new(
        config: DispatcherConfig,
        validator: Arc<dyn TokenValidator>,
        keys: Arc<dyn KeyProvider>,
        filters: FilterChain,
        handlers: HandlerRegistry,
    ) -> Self {
        if config.mode.is_test() {
            warn!("Dispatcher runs in test deployment, inbound DATs are not validated");
        }
        Self {
            config,
            validator,
            keys,
            filters,
            handlers,
        }
    }

    /// The settings.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Runs `message` through the pipeline.
    ///
    /// Protocol violations are answered with `Ok(MessageResponse::Rejection(..))`. Only a failing
    /// filter is an `Err`.
    pub async fn dispatch(
        &self,
        message: &Message,
        payload: InboundPayload,
    ) -> Result<MessageResponse, DispatchError> {
        let message_id = &message.header().id;
        let message_type = message.message_type();

        let claims = match self.config.mode {
            DeploymentMode::Test => {
                warn!(%message_id, "Test deployment, DAT of inbound message is not validated");
                None
            }
            DeploymentMode::Productive => match self.authorize(message).await {
                Ok(claims) => Some(claims),
                Err(rejection) => return Ok(reject(message_id, rejection)),
            },
        };

        match self.filters.run(message).map_err(DispatchError::Filter)? {
            FilterOutcome::Success => {}
            FilterOutcome::Failure(msg) => {
                return Ok(reject(
                    message_id,
                    ErrorResponse::new(RejectionReason::MalformedMessage, msg),
                ));
            }
        }

        let Some(handler) = self.handlers.resolve(message_type) else {
            return Ok(reject(
                message_id,
                ErrorResponse::new(
                    RejectionReason::MessageTypeNotSupported,
                    format!("no handler for message type {}", message.type_name()),
                ),
            ));
        };

        let call = AssertUnwindSafe(handler.invoke(message, payload, claims.as_ref()))
            .catch_unwind()
            .map(|outcome| outcome.unwrap_or_else(|panic| Err(handler_panicked(panic))));
        let result = match self.config.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("handler timed out after {limit:?}")),
            },
            None => call.await,
        };

        match result {
            Ok(response) => {
                debug!(%message_id, ?message_type, "Message handled");
                Ok(response)
            }
            Err(e) => {
                error!(%message_id, ?message_type, error = %e, "Message handler failed");
                Ok(MessageResponse::rejection(
                    RejectionReason::InternalRecipientError,
                    "message could not be processed",
                ))
            }
        }
    }

    async fn authorize(&self, message: &Message) -> Result<DatClaims, ErrorResponse> {
        let header = message.header();
        let not_authorized = || ErrorResponse::new(RejectionReason::NotAuthorized, DAT_NOT_VALIDATED);

        let Some(token) = header.token_value() else {
            info!(message_id = %header.id, "Inbound message has no security token");
            return Err(not_authorized());
        };

        let keys = self.keys.keys().await;
        let claims = self
            .validator
            .validate(
                SystemTime::now(),
                token,
                &keys,
                self.config.required_security_profile,
            )
            .map_err(|e| {
                info!(message_id = %header.id, error = %e, "DAT validation failed");
                not_authorized()
            })?;

        if self.config.referring_connector_check {
            let referring = claims
                .referring_connector
                .as_deref()
                .and_then(|rc| Url::parse(rc).ok());
            if referring.as_ref() != Some(&header.issuer_connector) {
                debug!(
                    message_id = %header.id,
                    issuer_connector = %header.issuer_connector,
                    referring_connector = ?claims.referring_connector,
                    "Referring connector does not match issuer connector"
                );
                return Err(ErrorResponse::new(
                    RejectionReason::BadParameters,
                    "referringConnector of the DAT does not match the issuerConnector",
                ));
            }
        }

        Ok(claims)
    }
}

fn handler_panicked(panic: Box<dyn Any + Send>) -> anyhow::Error {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("handler panicked: {detail}")
}

fn reject(message_id: &Url, rejection: ErrorResponse) -> MessageResponse {
    info!(%message_id, reason = %rejection.reason, cause = %rejection.message, "Rejecting message");
    MessageResponse::Rejection(rejection)
}
