// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tunnel bridge.
//!
//! Local HTTP endpoint the tunnel agent posts activations to. Requests must
//! carry the session secret in the `authorization` header; anything else is
//! rejected before the body is looked at. Errors never leak details over the
//! tunnel: a bad body or a failed run answers 400 with an empty body.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wskdebug_client::{Params, protocol};

use crate::error::{RelayError, Result};
use crate::relay::{Dispatched, Dispatcher};

#[derive(Clone)]
struct BridgeState {
    dispatcher: Arc<Dispatcher>,
    secret: Arc<str>,
}

/// Router accepting activations authenticated by `secret`.
pub fn router(dispatcher: Arc<Dispatcher>, secret: impl Into<String>) -> Router {
    let state = BridgeState {
        dispatcher,
        secret: Arc::from(secret.into()),
    };
    Router::new()
        .route("/", post(forward))
        .route("/{*path}", post(forward))
        .with_state(state)
}

async fn forward(State(state): State<BridgeState>, headers: HeaderMap, body: Bytes) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == &*state.secret);
    if !authorized {
        warn!("Rejected tunnel request with invalid authorization");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut params: Params = match serde_json::from_slice(&body) {
        Ok(params) => params,
        Err(e) => {
            debug!(error = %e, "Tunnel request body is not a JSON object");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    let activation_id = protocol::take_activation_id(&mut params)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    match state.dispatcher.dispatch(&activation_id, params).await {
        Ok(Dispatched::Completed(result)) => (StatusCode::OK, axum::Json(result)).into_response(),
        Ok(Dispatched::Duplicate) => StatusCode::CONFLICT.into_response(),
        Err(e) => {
            warn!(activation_id = %activation_id, error = %e, "Local runtime failed");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Running bridge listener.
pub struct TunnelBridge {
    addr: SocketAddr,
    secret: String,
    running: Mutex<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl TunnelBridge {
    /// Listen on an ephemeral localhost port with a fresh secret.
    pub async fn start(dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let secret = uuid::Uuid::new_v4().simple().to_string();
        Self::start_with_secret(dispatcher, secret).await
    }

    pub async fn start_with_secret(
        dispatcher: Arc<Dispatcher>,
        secret: impl Into<String>,
    ) -> Result<Self> {
        let secret = secret.into();
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| RelayError::Bridge(e.to_string()))?;
        let addr = listener.local_addr()?;
        let app = router(dispatcher, secret.clone());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "Tunnel bridge stopped with error");
            }
        });

        info!(addr = %addr, "Tunnel bridge listening");
        Ok(Self {
            addr,
            secret,
            running: Mutex::new(Some((stop_tx, task))),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared secret the agent must send as `authorization` header.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Stop accepting requests and wait for in-flight ones. Idempotent.
    pub async fn close(&self) -> Result<()> {
        let Some((stop, task)) = self.running.lock().await.take() else {
            return Ok(());
        };
        let _ = stop.send(());
        task.await
            .map_err(|e| RelayError::Bridge(e.to_string()))?;
        debug!(addr = %self.addr, "Tunnel bridge closed");
        Ok(())
    }
}
