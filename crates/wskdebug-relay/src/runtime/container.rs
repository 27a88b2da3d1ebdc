// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Docker-based local runtime.
//!
//! Starts the standard action runtime image of the action's kind with the
//! language debugger enabled, pushes the action code through the runtime's
//! `/init` endpoint and replays activations through `/run`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use wskdebug_client::{Action, ClientConfig, Params};

use super::kinds;
use super::traits::*;

/// Port of the action runtime inside the container.
pub const RUNTIME_PORT: u16 = 8080;

const INIT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// User overrides for starting the container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchOverrides {
    pub kind: Option<String>,
    pub image: Option<String>,
    pub debug_port: Option<u16>,
    pub debug_command: Option<String>,
    /// Debug port inside the container, if it differs from the published one.
    pub internal_port: Option<u16>,
}

/// Everything needed to start the debug container.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub kind: String,
    pub image: String,
    /// Debug port published on the host.
    pub debug_port: u16,
    /// Debug port inside the container.
    pub internal_port: u16,
    pub command: String,
    pub memory_bytes: u64,
}

/// Resolve image and debugger settings for an action.
///
/// Image precedence: override, then `exec.image`, then the kind table.
pub fn resolve_launch(action: &Action, overrides: &LaunchOverrides) -> Result<LaunchPlan> {
    let kind = overrides
        .kind
        .clone()
        .unwrap_or_else(|| action.exec.kind.clone());

    if kind == kinds::BLACKBOX {
        return Err(RuntimeError::UnsupportedKind(
            "Action is of kind 'blackbox', must specify kind using `--kind` argument.".to_string(),
        ));
    }

    let image = overrides
        .image
        .clone()
        .or_else(|| action.exec.image.clone())
        .or_else(|| kinds::image_for_kind(&kind).map(str::to_string))
        .ok_or_else(|| {
            RuntimeError::UnsupportedKind(format!(
                "Unknown kind: {}. You might want to specify --image.",
                kind
            ))
        })?;

    let profile = kinds::debug_profile(&kind);
    let debug_port = overrides
        .debug_port
        .or(profile.map(|p| p.port))
        .ok_or_else(|| RuntimeError::MissingDebugPort(kind.clone()))?;
    let internal_port = overrides.internal_port.unwrap_or(debug_port);
    let command = overrides
        .debug_command
        .clone()
        .or_else(|| profile.map(|p| p.command(internal_port)))
        .ok_or_else(|| RuntimeError::MissingDebugCommand(kind.clone()))?;

    Ok(LaunchPlan {
        kind,
        image,
        debug_port,
        internal_port,
        command,
        memory_bytes: action.memory_mb() * 1024 * 1024,
    })
}

/// Docker container names only allow `[a-zA-Z0-9_.-]`.
fn container_name(action: &str) -> String {
    let name: String = action
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    format!("wskdebug-{}-{}", name, Utc::now().timestamp_millis())
}

/// `docker port` prints `0.0.0.0:32768`, possibly followed by an IPv6 line.
fn container_url(port_output: &str) -> Option<String> {
    let host = port_output.lines().next()?.trim();
    if host.is_empty() {
        return None;
    }
    Some(format!("http://{}", host.replace("0.0.0.0", "127.0.0.1")))
}

async fn docker(args: &[&str]) -> std::result::Result<String, String> {
    debug!(args = ?args, "docker");
    let output = Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| e.to_string())?;

    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[derive(Debug, Clone)]
struct Container {
    name: String,
    url: String,
    timeout: Duration,
}

/// Local runtime backed by a docker container.
pub struct ContainerRuntime {
    http: reqwest::Client,
    action_name: String,
    api_host: String,
    api_key: Option<String>,
    namespace: String,
    overrides: LaunchOverrides,
    container: Mutex<Option<Container>>,
    /// Set before `docker run`, so an interrupted start can still be killed.
    launched: Mutex<Option<String>>,
}

impl ContainerRuntime {
    /// Runtime for `action_name`, passing the platform credentials to every activation.
    pub fn new(
        action_name: impl Into<String>,
        credentials: &ClientConfig,
        overrides: LaunchOverrides,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            action_name: action_name.into(),
            api_host: credentials.api_host.clone(),
            api_key: credentials.auth.clone(),
            namespace: credentials.namespace.clone(),
            overrides,
            container: Mutex::new(None),
            launched: Mutex::new(None),
        }
    }

    /// Fail unless a docker engine answers.
    pub async fn check_available() -> Result<()> {
        let status = Command::new("docker")
            .arg("info")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(RuntimeError::DockerUnavailable),
        }
    }

    async fn current(&self) -> Result<Container> {
        self.container
            .lock()
            .await
            .clone()
            .ok_or(RuntimeError::NotStarted)
    }
}

#[async_trait]
impl LocalRuntime for ContainerRuntime {
    fn runtime_type(&self) -> &'static str {
        "docker"
    }

    async fn start(&self, action: &Action) -> Result<()> {
        Self::check_available().await?;
        let plan = resolve_launch(action, &self.overrides)?;

        info!(kind = %plan.kind, image = %plan.image, "Debug type: {}", kinds::base_kind(&plan.kind));
        info!("Debug port: localhost:{}", plan.debug_port);

        let name = container_name(&action.name);
        let memory = plan.memory_bytes.to_string();
        let runtime_port = RUNTIME_PORT.to_string();
        let debug_mapping = format!("{}:{}", plan.debug_port, plan.internal_port);

        let mut args: Vec<&str> = vec![
            "run",
            "-d",
            "--name",
            name.as_str(),
            "--rm",
            "-m",
            memory.as_str(),
            "-p",
            runtime_port.as_str(),
            "-p",
            debug_mapping.as_str(),
            plan.image.as_str(),
        ];
        args.extend(plan.command.split_whitespace());

        info!(container = %name, "Starting local debug container");
        *self.launched.lock().await = Some(name.clone());
        if let Err(e) = docker(&args).await {
            self.launched.lock().await.take();
            return Err(RuntimeError::StartFailed(e));
        }

        let port_output = match docker(&["port", name.as_str(), runtime_port.as_str()]).await {
            Ok(output) => output,
            Err(e) => {
                self.launched.lock().await.take();
                let _ = docker(&["kill", name.as_str()]).await;
                return Err(RuntimeError::StartFailed(e));
            }
        };
        let Some(url) = container_url(&port_output) else {
            self.launched.lock().await.take();
            let _ = docker(&["kill", name.as_str()]).await;
            return Err(RuntimeError::StartFailed(format!(
                "no port mapping for {}",
                RUNTIME_PORT
            )));
        };

        debug!(container = %name, url = %url, "Container started");
        self.launched.lock().await.take();
        *self.container.lock().await = Some(Container {
            name,
            url,
            timeout: action.timeout(),
        });
        Ok(())
    }

    async fn init(&self, action: &Action) -> Result<()> {
        let container = self.current().await?;
        let body = json!({
            "value": {
                "binary": action.exec.binary,
                "main": action.exec.main.as_deref().unwrap_or("main"),
                "code": action.exec.code,
            }
        });

        // the runtime needs a moment before it accepts connections
        let retries = (container.timeout.as_millis() / INIT_RETRY_DELAY.as_millis()).max(1) as u64;
        let mut attempt: u64 = 0;
        let response = loop {
            match self
                .http
                .post(format!("{}/init", container.url))
                .json(&body)
                .send()
                .await
            {
                Ok(response) => break response,
                Err(e) if attempt < retries => {
                    attempt += 1;
                    debug!(attempt, error = %e, "Runtime not ready");
                    tokio::time::sleep(INIT_RETRY_DELAY).await;
                }
                Err(e) => return Err(RuntimeError::InitFailed(e.to_string())),
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RuntimeError::InitFailed(format!("[{}] {}", status, text)));
        }
        Ok(())
    }

    async fn run(&self, params: Params, activation_id: &str) -> Result<Value> {
        let container = self.current().await?;
        let deadline = Utc::now().timestamp_millis() + container.timeout.as_millis() as i64;
        let body = json!({
            "value": params,
            "api_host": self.api_host,
            "api_key": self.api_key,
            "namespace": self.namespace,
            "action_name": format!("/{}/{}", self.namespace, self.action_name),
            "activation_id": activation_id,
            "deadline": deadline.to_string(),
            "allow_concurrent": "true",
        });

        // no timeout: the developer may hold the activation at a breakpoint
        let response = self
            .http
            .post(format!("{}/run", container.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| RuntimeError::RunFailed(e.to_string()))?;

        // action errors come back as 502 with an {"error"} body, still a result
        response
            .json::<Value>()
            .await
            .map_err(|e| RuntimeError::RunFailed(e.to_string()))
    }

    async fn stop(&self) -> Result<()> {
        let started = self.container.lock().await.take().map(|c| c.name);
        let Some(name) = started.or(self.launched.lock().await.take()) else {
            return Ok(());
        };
        info!(container = %name, "Stopping local debug container");
        if let Err(e) = docker(&["kill", name.as_str()]).await {
            warn!(container = %name, error = %e, "docker kill failed");
            return Err(RuntimeError::StopFailed(e));
        }
        Ok(())
    }
}
