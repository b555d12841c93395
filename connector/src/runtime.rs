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
//! Wiring of a running connector.
//!
//! [ConnectorRuntime::start] assembles the DAPS client, the inbound pipeline and the sender from
//! a [ConnectorConfig] and serves the inbound endpoint until the cancellation token fires.

use std::{net::SocketAddr, sync::Arc};

use ids_daps_client::{
    issuer::{ConnectorCredentials, DapsError, DapsIssuerConfig, DapsTokenIssuer},
    token_provider::TokenProvider,
};
use ids_messaging::{
    controller::MessageController,
    dispatcher::{DispatcherConfig, MessageDispatcher},
    filter::FilterChain,
    handler::HandlerRegistry,
    identity::ConnectorIdentity,
    message::MessageType,
    multipart::MultipartCodec,
    response::ResponseAssembler,
    sender::{MessageSender, SenderConfig},
    version::SupportedVersions,
};
use ids_sdk_token_validator::{
    jwks::JwksKeyProvider,
    keys::KeyProvider,
    validator::{DatValidator, TokenValidator},
};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    addr_to_http_url,
    config::ConnectorConfig,
    io::read_bytes,
    self_description::{SelfDescription, SelfDescriptionHandler},
    server,
};

/// Errors while starting a connector.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Certificate or private key cannot be read.
    #[error("could not read credentials: {0}")]
    Credentials(#[source] std::io::Error),
    /// The DAPS client cannot be set up.
    #[error(transparent)]
    Daps(#[from] DapsError),
    /// An HTTP client cannot be created.
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// The access URL of the inbound endpoint cannot be derived.
    #[error("invalid inbound URL: {0}")]
    InboundUrl(#[source] url::ParseError),
    /// The listen address cannot be bound.
    #[error("could not bind {addr}: {source}")]
    Bind {
        /// Listen address.
        addr: SocketAddr,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
}

/// A started connector.
pub struct ConnectorRuntime {
    local_addr: SocketAddr,
    inbound_url: Url,
    identity: ConnectorIdentity,
    sender: Arc<MessageSender>,
    cancellation_token: CancellationToken,
    server: JoinHandle<std::io::Result<()>>,
}

impl ConnectorRuntime {
    /// Starts a connector, loading its credentials from the configured files.
    ///
    /// A self-description handler is registered unless `handlers` already serves
    /// `ids:DescriptionRequestMessage`. Inbound and response DATs are checked by `validator`,
    /// including its custom rules.
    pub async fn start(
        config: &ConnectorConfig,
        handlers: HandlerRegistry,
        filters: FilterChain,
        validator: DatValidator,
        cancellation_token: CancellationToken,
    ) -> Result<Self, RuntimeError> {
        let certificate = read_bytes(&config.certificate_path)
            .await
            .map_err(RuntimeError::Credentials)?;
        let private_key = read_bytes(&config.private_key_path)
            .await
            .map_err(RuntimeError::Credentials)?;
        let credentials = ConnectorCredentials::from_pem(&certificate, &private_key)?;

        Self::start_with_credentials(
            config,
            credentials,
            handlers,
            filters,
            validator,
            cancellation_token,
        )
        .await
    }

    /// Starts a connector with already loaded `credentials`.
    pub async fn start_with_credentials(
        config: &ConnectorConfig,
        credentials: ConnectorCredentials,
        mut handlers: HandlerRegistry,
        filters: FilterChain,
        validator: DatValidator,
        cancellation_token: CancellationToken,
    ) -> Result<Self, RuntimeError> {
        info!(
            connector = %config.connector_id,
            client_id = credentials.fingerprint(),
            mode = %config.deployment_mode,
            "Starting connector"
        );

        let keys: Arc<dyn KeyProvider> = Arc::new(
            JwksKeyProvider::new(config.daps.jwks.clone(), config.http_timeout())
                .map_err(RuntimeError::HttpClient)?,
        );
        let issuer_config = DapsIssuerConfig {
            timeout: config.http_timeout(),
            ..DapsIssuerConfig::new(config.daps.token_url.clone(), config.deployment_mode)
        };
        let tokens: Arc<dyn TokenProvider> = Arc::new(DapsTokenIssuer::new(
            issuer_config,
            credentials,
            keys.clone(),
        )?);
        let validator: Arc<dyn TokenValidator> = Arc::new(validator);

        let identity = ConnectorIdentity {
            connector_id: config.connector_id.clone(),
            sender_agent: config.sender_agent(),
            model_version: config.outbound_model_version.clone(),
        };

        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| RuntimeError::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| RuntimeError::Bind {
            addr: config.listen_addr,
            source,
        })?;
        let inbound_url = addr_to_http_url(local_addr)
            .join(&config.inbound_path)
            .map_err(RuntimeError::InboundUrl)?;

        if handlers.resolve(MessageType::DescriptionRequest).is_none() {
            let description = SelfDescription {
                connector_id: config.connector_id.clone(),
                title: config.title.clone(),
                description: config.description.clone(),
                outbound_model_version: config.outbound_model_version.clone(),
                inbound_model_versions: config.inbound_model_versions.clone(),
                access_url: config
                    .access_url
                    .clone()
                    .unwrap_or_else(|| inbound_url.clone()),
            };
            handlers.register(
                MessageType::DescriptionRequest,
                Arc::new(SelfDescriptionHandler::new(identity.clone(), &description)),
            );
        }
        debug!(types = ?handlers.message_types().collect::<Vec<_>>(), "Registered handlers");

        if config.shacl_validation {
            warn!("SHACL validation is not supported, inbound headers are passed through");
        }

        let dispatcher = MessageDispatcher::new(
            DispatcherConfig {
                mode: config.deployment_mode,
                required_security_profile: config.required_security_profile,
                referring_connector_check: config.referring_connector_check,
                handler_timeout: config.handler_timeout(),
            },
            validator.clone(),
            keys.clone(),
            filters,
            handlers,
        );
        let controller = Arc::new(MessageController::new(
            MultipartCodec::new(config.max_body_bytes),
            SupportedVersions::new(config.inbound_model_versions.clone()),
            Arc::new(dispatcher),
            ResponseAssembler::new(identity.clone(), tokens.clone()),
        ));
        let sender = MessageSender::new(
            SenderConfig {
                mode: config.deployment_mode,
                required_security_profile: config.required_security_profile,
                timeout: config.http_timeout(),
            },
            tokens,
            validator,
            keys,
        )
        .map_err(RuntimeError::HttpClient)?;

        let router = server::router(controller, &config.inbound_path);
        let server = tokio::spawn(server::start(
            cancellation_token.clone(),
            listener,
            router,
        ));

        Ok(Self {
            local_addr,
            inbound_url,
            identity,
            sender: Arc::new(sender),
            cancellation_token,
            server,
        })
    }

    /// The bound address of the inbound endpoint.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// URL of the inbound endpoint on the bound address.
    pub fn inbound_url(&self) -> &Url {
        &self.inbound_url
    }

    /// The identity stamped on outbound messages.
    pub fn identity(&self) -> &ConnectorIdentity {
        &self.identity
    }

    /// Sender for messages to other connectors.
    pub fn sender(&self) -> Arc<MessageSender> {
        self.sender.clone()
    }

    /// Waits until the inbound endpoint stopped.
    pub async fn join(self) -> std::io::Result<()> {
        self.server.await.map_err(std::io::Error::other)?
    }

    /// Stops the inbound endpoint and waits for it.
    pub async fn shutdown(self) -> std::io::Result<()> {
        self.cancellation_token.cancel();
        self.join().await
    }
}

/// Cancels `cancellation_token` on `SIGINT` or `SIGTERM` (`CTRL-C` or `CTRL-BREAK` on windows).
pub fn spawn_signal_handler(
    cancellation_token: CancellationToken,
) -> JoinHandle<std::io::Result<()>> {
    tokio::spawn(async move {
        #[cfg(target_family = "unix")]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;
            tokio::select! {
                _ = sigint.recv() => {
                    debug!("Received SIGINT, cancelling token");
                    cancellation_token.cancel();
                },
                _ = sigterm.recv() => {
                    debug!("Received SIGTERM, cancelling token");
                    cancellation_token.cancel();
                },
                _ = cancellation_token.cancelled() => {
                    debug!("Cancellation token cancelled, exiting shutdown handler");
                },
            }
        }

        #[cfg(target_family = "windows")]
        {
            use tokio::signal::windows;

            let mut ctrl_c = windows::ctrl_c()?;
            let mut ctrl_break = windows::ctrl_break()?;
            tokio::select! {
                _ = ctrl_c.recv() => {
                    debug!("Received CTRL-C, cancelling token");
                    cancellation_token.cancel();
                },
                _ = ctrl_break.recv() => {
                    debug!("Received CTRL-BREAK, cancelling token");
                    cancellation_token.cancel();
                },
                _ = cancellation_token.cancelled() => {
                    debug!("Cancellation token cancelled, exiting shutdown handler");
                },
            }
        }

        Ok(())
    })
}
