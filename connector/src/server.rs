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
//! Inbound HTTP endpoint.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::post,
};
use ids_messaging::controller::MessageController;
use ids_sdk_observability::info_trace_layer;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::{error, info};

/// Builds the router serving `controller` at `inbound_path`.
///
/// Request bodies are streamed into the controller, whose codec enforces the body size limit
/// and answers oversized bodies with a rejection.
pub fn router(controller: Arc<MessageController>, inbound_path: &str) -> Router {
    Router::new()
        .route(inbound_path, post(post_message))
        .with_state(controller)
        .layer(ServiceBuilder::new().layer(info_trace_layer()))
}

/// Serves `router` on `listener` until `cancellation_token` is cancelled.
pub async fn start(
    cancellation_token: CancellationToken,
    listener: TcpListener,
    router: Router,
) -> std::io::Result<()> {
    info!(addr=?listener.local_addr(), "Starting inbound endpoint");
    if let Err(e) = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            cancellation_token.cancelled().await;
        })
        .await
    {
        error!(error=%e, "Inbound endpoint unexpectedly stopped");
    }

    info!("Shutting down inbound endpoint");
    Ok(())
}

async fn post_message(
    State(controller): State<Arc<MessageController>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let response = controller
        .handle_stream(content_type, body.into_data_stream())
        .await;
    match response.body {
        Some((content_type, body)) => {
            (response.status, [(CONTENT_TYPE, content_type)], body).into_response()
        }
        None => response.status.into_response(),
    }
}
