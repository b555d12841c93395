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
//! HTTP API of the fake DAPS.
//!
//! - `POST /token`: form encoded DAT request, answers with a [TokenResponse].
//! - `GET /jwks.json`: the JWK set of the signing key.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::SystemTime,
};

use axum::{
    Form, Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use http::StatusCode;
use ids_sdk_observability::info_trace_layer;
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::{debug, error, info};

use crate::{FakeDaps, IssueError, TokenRequest, TokenResponse};

/// Path of the token endpoint.
pub const TOKEN_PATH: &str = "/token";
/// Path of the JWKS endpoint.
pub const JWKS_PATH: &str = "/jwks.json";

/// Builds the router of the fake DAPS.
pub fn router(daps: Arc<FakeDaps>) -> Router {
    Router::new()
        .route(TOKEN_PATH, post(post_token))
        .route(JWKS_PATH, get(get_jwks))
        .with_state(daps)
        .layer(ServiceBuilder::new().layer(info_trace_layer()))
}

/// Serves the fake DAPS on `listener` until `cancellation_token` is cancelled.
pub async fn start(
    cancellation_token: CancellationToken,
    listener: TcpListener,
    daps: Arc<FakeDaps>,
) -> std::io::Result<()> {
    info!(addr=?listener.local_addr(), "Starting fake DAPS");
    if let Err(e) = axum::serve(listener, router(daps).into_make_service())
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
        })
        .await
    {
        error!(error=%e, "Fake DAPS unexpectedly stopped");
    }

    info!("Shutting down fake DAPS");
    Ok(())
}

/// Binds to a random local port and serves the fake DAPS in a background task.
pub async fn spawn_local(
    cancellation_token: CancellationToken,
    daps: Arc<FakeDaps>,
) -> std::io::Result<(SocketAddr, JoinHandle<std::io::Result<()>>)> {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(start(cancellation_token, listener, daps));
    Ok((addr, handle))
}

/// OAuth error response (<https://www.rfc-editor.org/rfc/rfc6749#section-5.2>).
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: ErrorResponseType,
    /// Human readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// OAuth error codes used by the fake DAPS.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorResponseType {
    /// Malformed request.
    InvalidRequest,
    /// Client authentication failed.
    InvalidClient,
    /// Grant type not supported.
    UnsupportedGrantType,
    /// The DAPS failed.
    ServerError,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error {
            ErrorResponseType::InvalidClient => StatusCode::UNAUTHORIZED,
            ErrorResponseType::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponseType::InvalidRequest | ErrorResponseType::UnsupportedGrantType => {
                StatusCode::BAD_REQUEST
            }
        };
        (status, Json(self)).into_response()
    }
}

async fn post_token(
    State(daps): State<Arc<FakeDaps>>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, ErrorResponse> {
    daps.issue(&request, SystemTime::now())
        .map(Json)
        .map_err(error_response)
}

async fn get_jwks(State(daps): State<Arc<FakeDaps>>) -> Json<JwkSet> {
    Json(daps.jwks())
}

fn error_response(error: IssueError) -> ErrorResponse {
    debug!(err = %error, "DAT request refused");

    let error_type = match &error {
        IssueError::UnsupportedGrantType(_) => ErrorResponseType::UnsupportedGrantType,
        IssueError::UnsupportedAssertionType(_) => ErrorResponseType::InvalidRequest,
        IssueError::InvalidAssertion(_) | IssueError::UnknownClient(_) => {
            ErrorResponseType::InvalidClient
        }
        IssueError::Signing(_) => ErrorResponseType::ServerError,
    };

    ErrorResponse {
        error: error_type,
        error_description: Some(error.to_string()),
    }
}
