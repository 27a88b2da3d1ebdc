// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Public tunnel endpoints for the tunnel bridge.

use std::net::SocketAddr;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::TunnelSetting;
use crate::error::{RelayError, Result};

/// Exposes the local bridge under a URL the platform can reach.
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Provider identifier (e.g., "ngrok", "static").
    fn provider_type(&self) -> &'static str;

    /// Open a tunnel to `local` and return its public URL.
    async fn open(&self, local: SocketAddr) -> Result<String>;

    /// Close the tunnel. Closing a tunnel that was never opened is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Provider for a tunnel setting.
pub fn provider_for(setting: &TunnelSetting) -> Box<dyn TunnelProvider> {
    match setting {
        TunnelSetting::Ngrok { api } => Box::new(NgrokTunnel::new(api.clone())),
        TunnelSetting::Url(url) => Box::new(StaticTunnel::new(url.clone())),
    }
}

/// No tunnel: the bridge address itself is the public URL.
///
/// Useful when the platform runs on the same host, and in tests.
#[derive(Debug, Default)]
pub struct DirectTunnel;

#[async_trait]
impl TunnelProvider for DirectTunnel {
    fn provider_type(&self) -> &'static str {
        "direct"
    }

    async fn open(&self, local: SocketAddr) -> Result<String> {
        Ok(format!("http://{}", local))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A tunnel managed outside the debugger.
#[derive(Debug)]
pub struct StaticTunnel {
    url: String,
}

impl StaticTunnel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl TunnelProvider for StaticTunnel {
    fn provider_type(&self) -> &'static str {
        "static"
    }

    async fn open(&self, local: SocketAddr) -> Result<String> {
        info!(url = %self.url, "Using static tunnel, make sure it forwards to {}", local);
        Ok(self.url.clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct NgrokTunnelInfo {
    public_url: String,
}

/// Tunnel opened through the API of a locally running ngrok agent.
pub struct NgrokTunnel {
    http: reqwest::Client,
    api: String,
    open: Mutex<Option<String>>,
}

impl NgrokTunnel {
    /// Provider for the agent API at `api` (e.g., `http://127.0.0.1:4040`).
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api: api.into().trim_end_matches('/').to_string(),
            open: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TunnelProvider for NgrokTunnel {
    fn provider_type(&self) -> &'static str {
        "ngrok"
    }

    async fn open(&self, local: SocketAddr) -> Result<String> {
        let name = format!("wskdebug-{}", uuid::Uuid::new_v4().simple());
        let response = self
            .http
            .post(format!("{}/api/tunnels", self.api))
            .json(&json!({
                "addr": local.port().to_string(),
                "proto": "http",
                "name": name,
            }))
            .send()
            .await
            .map_err(|e| RelayError::Tunnel(format!("ngrok agent not reachable: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RelayError::Tunnel(format!(
                "ngrok rejected tunnel [{}]: {}",
                status, text
            )));
        }

        let tunnel: NgrokTunnelInfo = response
            .json()
            .await
            .map_err(|e| RelayError::Tunnel(e.to_string()))?;

        info!(url = %tunnel.public_url, "ngrok tunnel opened");
        *self.open.lock().await = Some(name);
        Ok(tunnel.public_url)
    }

    async fn close(&self) -> Result<()> {
        let Some(name) = self.open.lock().await.take() else {
            return Ok(());
        };
        debug!(tunnel = %name, "Closing ngrok tunnel");
        let response = self
            .http
            .delete(format!("{}/api/tunnels/{}", self.api, name))
            .send()
            .await
            .map_err(|e| RelayError::Tunnel(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RelayError::Tunnel(format!(
                "failed to close ngrok tunnel {}: {}",
                name,
                response.status()
            )));
        }
        Ok(())
    }
}
