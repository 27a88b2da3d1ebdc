// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action management client.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::types::{Action, Activation, ListActivationsOptions, Params, SystemInfo};

/// Operations the debugger and the agents need from the platform.
///
/// All methods may fail with network or auth errors; those propagate as
/// distinct [`ClientError`] kinds and are never swallowed here.
#[async_trait]
pub trait ActionClient: Send + Sync {
    /// Fetch an action, [`ClientError::NotFound`] if it does not exist.
    async fn get_action(&self, name: &str) -> Result<Action>;

    /// Create or overwrite an action.
    async fn update_action(&self, name: &str, action: &Action) -> Result<Action>;

    /// Delete an action. Deleting a missing action succeeds.
    async fn delete_action(&self, name: &str) -> Result<()>;

    /// Invoke an action.
    ///
    /// Application errors come back as [`ClientError::Activation`]. A blocking
    /// invoke that exceeds the platform's blocking window returns an
    /// [`Activation`] without response.
    async fn invoke(&self, name: &str, params: Params, blocking: bool) -> Result<Activation>;

    /// List activation records, newest first.
    async fn list_activations(&self, options: &ListActivationsOptions) -> Result<Vec<Activation>>;

    /// Platform self description.
    async fn system_info(&self) -> Result<SystemInfo>;

    /// Swagger document describing the API, used for capability probing.
    async fn api_docs(&self) -> Result<Value>;
}

/// REST implementation of [`ActionClient`].
pub struct OpenWhiskClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl OpenWhiskClient {
    /// Create a client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.ignore_certs)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build http client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Create a client from wskprops and `OW_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::load()?)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn action_url(&self, name: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{}/actions/{}",
            self.config.base_url(),
            self.config.namespace,
            name.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(ACCEPT, "application/json");

        match self.config.credentials() {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response, subject: &str) -> Result<T> {
        let response = check_status(response, subject).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            ClientError::UnexpectedResponse(format!("{}: {}", subject, e))
        })
    }
}

#[async_trait]
impl ActionClient for OpenWhiskClient {
    #[instrument(skip(self))]
    async fn get_action(&self, name: &str) -> Result<Action> {
        debug!("Getting action");
        let response = self.request(Method::GET, &self.action_url(name)).send().await?;
        Self::read_json(response, name).await
    }

    #[instrument(skip(self, action))]
    async fn update_action(&self, name: &str, action: &Action) -> Result<Action> {
        debug!(kind = %action.exec.kind, "Updating action");

        // namespace, name and version are owned by the platform
        let body = json!({
            "exec": action.exec,
            "parameters": action.parameters,
            "annotations": action.annotations,
            "limits": action.limits,
        });

        let response = self
            .request(Method::PUT, &self.action_url(name))
            .query(&[("overwrite", "true")])
            .json(&body)
            .send()
            .await?;
        Self::read_json(response, name).await
    }

    #[instrument(skip(self))]
    async fn delete_action(&self, name: &str) -> Result<()> {
        debug!("Deleting action");
        let response = self
            .request(Method::DELETE, &self.action_url(name))
            .send()
            .await?;

        match check_status(response, name).await {
            Ok(_) | Err(ClientError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, params))]
    async fn invoke(&self, name: &str, params: Params, blocking: bool) -> Result<Activation> {
        let response = self
            .request(Method::POST, &self.action_url(name))
            .query(&[("blocking", if blocking { "true" } else { "false" })])
            .json(&params)
            .send()
            .await?;

        match response.status() {
            // completed (200) or accepted without result (202)
            StatusCode::OK | StatusCode::ACCEPTED => Self::read_json(response, name).await,
            // application error: the body is still an activation record
            StatusCode::BAD_GATEWAY => {
                let body = response.bytes().await?;
                let activation: Activation = serde_json::from_slice(&body).map_err(|_| {
                    ClientError::Server {
                        status: StatusCode::BAD_GATEWAY.as_u16(),
                        message: error_message(&body),
                    }
                })?;
                let error = activation
                    .result()
                    .and_then(|result| result.get("error"))
                    .cloned()
                    .unwrap_or(Value::Null);
                Err(ClientError::Activation {
                    activation_id: activation.activation_id,
                    error,
                })
            }
            _ => {
                check_status(response, name).await?;
                Err(ClientError::UnexpectedResponse(format!(
                    "invoke of {} returned no activation",
                    name
                )))
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_activations(&self, options: &ListActivationsOptions) -> Result<Vec<Activation>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(name) = &options.name {
            query.push(("name", name.clone()));
        }
        if let Some(since) = options.since {
            query.push(("since", since.to_string()));
        }
        if let Some(limit) = options.limit {
            query.push(("limit", limit.to_string()));
        }
        if options.docs {
            query.push(("docs", "true".to_string()));
        }

        let url = format!(
            "{}/api/v1/namespaces/{}/activations",
            self.config.base_url(),
            self.config.namespace
        );
        let response = self.request(Method::GET, &url).query(&query).send().await?;
        Self::read_json(response, "activations").await
    }

    #[instrument(skip(self))]
    async fn system_info(&self) -> Result<SystemInfo> {
        let url = format!("{}/api/v1", self.config.base_url());
        let response = self.request(Method::GET, &url).send().await?;
        Self::read_json(response, "system info").await
    }

    #[instrument(skip(self))]
    async fn api_docs(&self) -> Result<Value> {
        let url = format!("{}/api/v1/api-docs", self.config.base_url());
        let response = self.request(Method::GET, &url).send().await?;
        Self::read_json(response, "api docs").await
    }
}

/// Map non-success statuses to error kinds.
async fn check_status(response: Response, subject: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.bytes().await.unwrap_or_default();
    let message = error_message(&body);
    match status {
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(subject.to_string())),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Unauthorized(message)),
        _ => Err(ClientError::Server {
            status: status.as_u16(),
            message,
        }),
    }
}

/// Platform errors look like `{"error": "...", "code": "..."}`.
fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}
