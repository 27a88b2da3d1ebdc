// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Debug session lifecycle.
//!
//! ```text
//! Idle → ActionResolved → AgentInstalled → Running → ShuttingDown → Idle
//! ```
//!
//! A failed start still runs the shutdown steps, so a half installed agent is
//! never left behind. Shutdown steps run concurrently and independently: a
//! failing step is logged and never keeps the others from running.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use wskdebug_agent::{AgentVariant, Condition};
use wskdebug_client::{ActionClient, Params, protocol};

use crate::agent_manager::AgentManager;
use crate::bridge::TunnelBridge;
use crate::config::DebugConfig;
use crate::error::{RelayError, Result};
use crate::relay::{ActivationRelay, Dispatcher};
use crate::runtime::LocalRuntime;
use crate::tunnel::{self, TunnelProvider};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ActionResolved,
    AgentInstalled,
    Running,
    ShuttingDown,
}

/// One debug run of one action.
pub struct Session {
    config: DebugConfig,
    client: Arc<dyn ActionClient>,
    runtime: Arc<dyn LocalRuntime>,
    manager: AgentManager,
    dispatcher: Arc<Dispatcher>,
    tunnel: Box<dyn TunnelProvider>,
    bridge: Mutex<Option<TunnelBridge>>,
    variant: Mutex<Option<AgentVariant>>,
    phase: watch::Sender<Phase>,
    cancel: CancellationToken,
    stopping: AtomicBool,
    started_at: i64,
}

impl Session {
    pub fn new(
        config: DebugConfig,
        client: Arc<dyn ActionClient>,
        runtime: Arc<dyn LocalRuntime>,
    ) -> Self {
        let manager = AgentManager::new(
            client.clone(),
            config.action.clone(),
            config.agent_image.clone(),
            config.agent_timeout,
        );
        let tunnel = tunnel::provider_for(&config.tunnel);
        let (phase, _) = watch::channel(Phase::Idle);

        Self {
            dispatcher: Arc::new(Dispatcher::new(runtime.clone())),
            manager,
            tunnel,
            bridge: Mutex::new(None),
            variant: Mutex::new(None),
            phase,
            cancel: CancellationToken::new(),
            stopping: AtomicBool::new(false),
            started_at: chrono::Utc::now().timestamp_millis(),
            config,
            client,
            runtime,
        }
    }

    /// Replace the tunnel provider derived from the configuration.
    pub fn with_tunnel_provider(mut self, provider: Box<dyn TunnelProvider>) -> Self {
        self.tunnel = provider;
        self
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Cancelling the token ends [`run`](Self::run).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Installed agent variant, once started.
    pub async fn variant(&self) -> Option<AgentVariant> {
        *self.variant.lock().await
    }

    /// Resolve the action, start the local runtime and install the agent.
    ///
    /// Cancelling the token while starting ends with [`RelayError::Interrupted`]
    /// after everything set up so far was put back.
    pub async fn start(&self) -> Result<()> {
        match self.setup().await {
            Ok(()) => Ok(()),
            Err(RelayError::Interrupted) => {
                info!("Interrupted while starting");
                self.stop().await;
                Err(RelayError::Interrupted)
            }
            Err(e) => {
                error!(error = %e, "Failed to start debug session");
                self.stop().await;
                Err(e)
            }
        }
    }

    /// Run a setup step unless or until the session is cancelled.
    async fn step<T>(&self, step: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Interrupted),
            result = step => result,
        }
    }

    async fn setup(&self) -> Result<()> {
        if let Some(condition) = &self.config.condition {
            Condition::parse(condition)
                .map_err(|e| RelayError::InvalidCondition(e.to_string()))?;
        }

        let action = self.step(self.manager.resolve_action()).await?;
        self.phase.send_replace(Phase::ActionResolved);

        match self.client.system_info().await {
            Ok(info) => info!(
                build = %info.build,
                buildno = %info.buildno,
                "OpenWhisk {} {}",
                info.build,
                info.buildno
            ),
            Err(e) => debug!(error = %e, "System info not available"),
        }

        info!(runtime = self.runtime.runtime_type(), "Starting local runtime");
        // image pulls and the init retry loop can take long
        self.step(async { self.runtime.start(&action).await.map_err(RelayError::from) })
            .await?;
        self.step(async { self.runtime.init(&action).await.map_err(RelayError::from) })
            .await?;

        let variant = self.manager.select_variant(self.config.transport).await;
        let mut agent_params = Params::new();
        if let Some(condition) = &self.config.condition {
            agent_params.insert(
                protocol::CONDITION.to_string(),
                Value::String(condition.clone()),
            );
        }

        if variant == AgentVariant::Tunnel {
            let bridge = TunnelBridge::start(self.dispatcher.clone()).await?;
            let local = bridge.local_addr();
            agent_params.insert(
                protocol::NGROK_AUTH.to_string(),
                Value::String(bridge.secret().to_string()),
            );
            *self.bridge.lock().await = Some(bridge);

            let url = self.tunnel.open(local).await?;
            info!(provider = self.tunnel.provider_type(), url = %url, "Tunnel open");
            agent_params.insert(protocol::NGROK_URL.to_string(), Value::String(url));
        }

        // not interruptible: a half written install is put back by restore
        if self.cancel.is_cancelled() {
            return Err(RelayError::Interrupted);
        }
        self.manager.install(&action, variant, agent_params).await?;
        *self.variant.lock().await = Some(variant);
        self.phase.send_replace(Phase::AgentInstalled);

        info!("Ready, waiting for activations of {}", self.config.action);
        Ok(())
    }

    /// Relay activations until cancelled or a fatal error.
    pub async fn run(&self) -> Result<()> {
        let Some(variant) = self.variant().await else {
            warn!("Session is not started");
            return Ok(());
        };
        self.phase.send_replace(Phase::Running);

        let relay = ActivationRelay::new(
            self.client.clone(),
            self.dispatcher.clone(),
            self.config.action.clone(),
        )
        .with_retry_backoff(self.config.retry_backoff)
        .with_poll_interval(self.config.poll_interval)
        .with_since(self.started_at);

        let result = relay.run(variant, self.cancel.clone()).await;
        if let Err(e) = &result {
            error!(error = ?e, "Activation relay failed");
        }
        result
    }

    /// Put everything back. Only the first call has an effect.
    pub async fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.phase.send_replace(Phase::ShuttingDown);
        self.cancel.cancel();
        info!("Shutting down...");

        let restore = async {
            if let Err(e) = self.manager.restore().await {
                error!(error = %e, "Error while restoring original action");
            }
        };
        let runtime = async {
            if let Err(e) = self.runtime.stop().await {
                error!(error = %e, "Error while stopping local runtime");
            }
        };
        let tunnel = async {
            if let Some(bridge) = self.bridge.lock().await.as_ref()
                && let Err(e) = bridge.close().await
            {
                error!(error = %e, "Error while closing tunnel bridge");
            }
            if let Err(e) = self.tunnel.close().await {
                error!(error = %e, "Error while closing tunnel");
            }
        };
        tokio::join!(restore, runtime, tunnel);

        self.phase.send_replace(Phase::Idle);
        info!("Done");
    }
}
