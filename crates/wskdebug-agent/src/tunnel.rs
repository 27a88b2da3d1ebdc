// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tunnel agent.
//!
//! Posts each activation to the public tunnel URL of the debugger's bridge and
//! returns the response body as the result.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::debug;

use wskdebug_client::protocol::{self, ACTIVATION_ID, NGROK_AUTH, NGROK_URL};
use wskdebug_client::{ActionProgram, AgentFault, InvocationContext, Params};

use crate::dispatch;

/// Agent forwarding over HTTP.
pub struct TunnelAgent {
    http: reqwest::Client,
}

impl Default for TunnelAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelAgent {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Tunnel URLs are host names unless they carry a scheme.
    fn endpoint(url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{}/", url.trim_end_matches('/'))
        }
    }

    async fn forward(
        &self,
        url: &str,
        mut params: Params,
        ctx: &InvocationContext,
    ) -> Result<Value, AgentFault> {
        let auth = params
            .get(NGROK_AUTH)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        protocol::strip_reserved(&mut params);
        params.insert(
            ACTIVATION_ID.to_string(),
            Value::String(ctx.activation_id.clone()),
        );

        let remaining = ctx.remaining(std::time::Duration::ZERO);
        if remaining.is_zero() {
            return Err(AgentFault::new(format!(
                "activation {} reached its deadline before it could be forwarded",
                ctx.activation_id
            )));
        }

        let endpoint = Self::endpoint(url);
        debug!(endpoint = %endpoint, activation_id = %ctx.activation_id, "Posting activation to tunnel");

        let response = self
            .http
            .post(&endpoint)
            .header(AUTHORIZATION, auth)
            .timeout(remaining)
            .json(&params)
            .send()
            .await
            .map_err(|e| AgentFault::new(format!("tunnel request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentFault::new(format!(
                "debugger rejected activation with status {}",
                status.as_u16()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AgentFault::new(format!("invalid response from debugger: {}", e)))
    }
}

#[async_trait]
impl ActionProgram for TunnelAgent {
    async fn invoke(&self, params: Params, ctx: InvocationContext) -> Result<Value, AgentFault> {
        let url = params
            .get(NGROK_URL)
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        match url {
            Some(url) if dispatch::hit(&params) => self.forward(&url, params, &ctx).await,
            _ => dispatch::invoke_original(params, &ctx).await,
        }
    }
}
