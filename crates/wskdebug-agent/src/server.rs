// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action runtime protocol.
//!
//! The platform initializes a container once with `POST /init` and then sends
//! any number of `POST /run` requests, concurrently if the action allows it.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use wskdebug_client::{
    ActionClient, ActionProgram, ClientConfig, ClientError, InvocationContext, OpenWhiskClient,
    Params,
};

use crate::config::AgentConfig;

/// Builds the platform client for one activation.
pub type ClientFactory =
    Arc<dyn Fn(&RunRequest) -> Result<Arc<dyn ActionClient>, ClientError> + Send + Sync>;

/// Shared state of the runtime server.
#[derive(Clone)]
pub struct AppState {
    program: Arc<RwLock<Option<Arc<dyn ActionProgram>>>>,
    clients: ClientFactory,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// State using REST clients bound to each activation's credentials.
    pub fn new() -> Self {
        Self::with_client_factory(Arc::new(
            |request: &RunRequest| -> Result<Arc<dyn ActionClient>, ClientError> {
                let config = ClientConfig::new(request.api_host.clone(), request.api_key.clone())
                    .with_namespace(request.namespace.clone());
                Ok(Arc::new(OpenWhiskClient::new(config)?))
            },
        ))
    }

    /// State using a fixed client for every activation.
    pub fn with_client(client: Arc<dyn ActionClient>) -> Self {
        Self::with_client_factory(Arc::new(
            move |_: &RunRequest| -> Result<Arc<dyn ActionClient>, ClientError> {
                Ok(client.clone())
            },
        ))
    }

    pub fn with_client_factory(clients: ClientFactory) -> Self {
        Self {
            program: Arc::new(RwLock::new(None)),
            clients,
        }
    }
}

/// Build the runtime router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/init", post(init))
        .route("/run", post(run))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct InitRequest {
    value: InitValue,
}

#[derive(Debug, Deserialize)]
struct InitValue {
    #[serde(default)]
    code: String,
    #[serde(default)]
    binary: bool,
}

/// Body of `POST /run`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub value: Params,
    #[serde(default)]
    pub activation_id: String,
    #[serde(default)]
    pub action_name: String,
    #[serde(default)]
    pub namespace: String,
    /// Epoch milliseconds, sent as a string by most invokers.
    #[serde(default)]
    pub deadline: Option<Value>,
    #[serde(default)]
    pub api_host: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl RunRequest {
    fn deadline(&self) -> DateTime<Utc> {
        let millis = match &self.deadline {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.parse::<i64>().ok(),
            _ => None,
        };
        millis
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(|| {
                Utc::now()
                    + chrono::Duration::from_std(wskdebug_client::DEFAULT_TIMEOUT)
                        .unwrap_or(chrono::Duration::zero())
            })
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn init(State(state): State<AppState>, Json(request): Json<InitRequest>) -> Response {
    let mut program = state.program.write().await;
    if program.is_some() {
        return error_response(
            StatusCode::FORBIDDEN,
            "Cannot initialize the action more than once.",
        );
    }

    if request.value.binary {
        return error_response(StatusCode::BAD_GATEWAY, "agent code must not be binary");
    }

    match AgentConfig::from_code(&request.value.code) {
        Ok(config) => {
            info!(variant = %config.variant, "Agent initialized");
            *program = Some(crate::program_for(&config));
            (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
        }
        Err(e) => {
            error!(error = %e, "Invalid agent configuration");
            error_response(
                StatusCode::BAD_GATEWAY,
                format!("invalid agent configuration: {}", e),
            )
        }
    }
}

async fn run(State(state): State<AppState>, Json(request): Json<RunRequest>) -> Response {
    let Some(program) = state.program.read().await.clone() else {
        return error_response(StatusCode::BAD_GATEWAY, "agent is not initialized");
    };

    let client = match (state.clients)(&request) {
        Ok(client) => client,
        Err(e) => return error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    };

    debug!(activation_id = %request.activation_id, action = %request.action_name, "Running activation");
    let ctx = InvocationContext {
        activation_id: request.activation_id.clone(),
        action_name: request.action_name.clone(),
        namespace: request.namespace.clone(),
        deadline: request.deadline(),
        client,
    };

    // faults are results with an error field, the invoker marks them as application errors
    let result = match program.invoke(request.value, ctx).await {
        Ok(result) => result,
        Err(fault) => fault.to_result(),
    };
    (StatusCode::OK, Json(result)).into_response()
}
