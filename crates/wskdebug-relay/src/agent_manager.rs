// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Agent installation and restore.
//!
//! The remote action is the only state a session mutates. While an agent is
//! installed the original definition lives in `<name>_wskdebug_original`; the
//! presence of that backup is the durable signal that an agent is installed.
//! A session that crashed leaves both behind, and the next session recovers
//! the original from the backup instead of backing up the agent.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use wskdebug_agent::{AgentConfig, AgentVariant};
use wskdebug_client::protocol::{self, AGENT_ANNOTATION, AGENT_VARIANT_ANNOTATION};
use wskdebug_client::{Action, ActionClient, ClientError, Exec, Limits, Params};

use crate::config::Transport;
use crate::error::{RelayError, Result};

/// Agent state of a live action, derived from its annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    NotInstalled,
    Installed(AgentVariant),
    /// Marked only by the description prefix older debugger versions wrote.
    Legacy,
}

impl AgentState {
    pub fn of(action: &Action) -> Self {
        if action.annotation(AGENT_ANNOTATION) == Some(&Value::Bool(true)) {
            let variant = action
                .annotation(AGENT_VARIANT_ANNOTATION)
                .and_then(Value::as_str)
                .and_then(|v| v.parse().ok())
                .or_else(|| wskdebug_agent::agent_config(action).map(|c| c.variant));
            return match variant {
                Some(variant) => AgentState::Installed(variant),
                None => AgentState::Legacy,
            };
        }

        let legacy = action
            .annotation(protocol::DESCRIPTION_ANNOTATION)
            .and_then(Value::as_str)
            .is_some_and(|d| d.starts_with(protocol::LEGACY_DESCRIPTION_PREFIX));
        if legacy {
            AgentState::Legacy
        } else {
            AgentState::NotInstalled
        }
    }

    pub fn is_agent(&self) -> bool {
        !matches!(self, AgentState::NotInstalled)
    }
}

/// Installs the agent over one action and puts the original back.
pub struct AgentManager {
    client: Arc<dyn ActionClient>,
    action_name: String,
    agent_image: String,
    agent_timeout: Duration,
    concurrency: OnceCell<bool>,
    installed: Mutex<Option<AgentVariant>>,
}

impl AgentManager {
    pub fn new(
        client: Arc<dyn ActionClient>,
        action_name: impl Into<String>,
        agent_image: impl Into<String>,
        agent_timeout: Duration,
    ) -> Self {
        Self {
            client,
            action_name: action_name.into(),
            agent_image: agent_image.into(),
            agent_timeout,
            concurrency: OnceCell::new(),
            installed: Mutex::new(None),
        }
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn backup_name(&self) -> String {
        protocol::backup_name(&self.action_name)
    }

    /// Variant installed by this manager, if any.
    pub async fn installed(&self) -> Option<AgentVariant> {
        *self.installed.lock().await
    }

    /// Fetch the original action definition.
    ///
    /// If the live action is already an agent, the backup is used instead,
    /// unless it is missing or is itself an agent.
    pub async fn resolve_action(&self) -> Result<Action> {
        let action = match self.client.get_action(&self.action_name).await {
            Ok(action) => action,
            Err(ClientError::NotFound(_)) => {
                return Err(RelayError::ActionNotFound(self.action_name.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if !AgentState::of(&action).is_agent() {
            return Ok(action);
        }

        let backup_name = self.backup_name();
        warn!(
            action = %self.action_name,
            backup = %backup_name,
            "Action is already an agent, recovering original from backup"
        );

        let backup = match self.client.get_action(&backup_name).await {
            Ok(backup) => backup,
            Err(ClientError::NotFound(_)) => {
                return Err(RelayError::BrokenBackup {
                    action: self.action_name.clone(),
                    reason: format!("its backup {} is missing", backup_name),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if AgentState::of(&backup).is_agent() {
            return Err(RelayError::BrokenBackup {
                action: self.action_name.clone(),
                reason: format!("its backup {} is also an agent", backup_name),
            });
        }
        Ok(backup)
    }

    /// Whether the platform runs concurrent activations in one container.
    ///
    /// Probed once through the api docs; failures count as unsupported.
    pub async fn supports_concurrency(&self) -> bool {
        *self
            .concurrency
            .get_or_init(|| async {
                match self.client.api_docs().await {
                    Ok(docs) => docs
                        .pointer("/definitions/ActionLimits/properties/concurrency")
                        .is_some_and(|marker| !marker.is_null() && marker != &Value::Bool(false)),
                    Err(e) => {
                        debug!(error = %e, "Capability probe failed");
                        false
                    }
                }
            })
            .await
    }

    /// Agent variant for a transport.
    pub async fn select_variant(&self, transport: Transport) -> AgentVariant {
        match transport {
            Transport::Tunnel => AgentVariant::Tunnel,
            Transport::Polling => AgentVariant::Polling,
            Transport::Auto => {
                if self.supports_concurrency().await {
                    AgentVariant::Concurrent
                } else {
                    info!(
                        "This OpenWhisk system does not seem to support action concurrency. Debugging will be a bit slower."
                    );
                    AgentVariant::Polling
                }
            }
        }
    }

    /// Back up `original` and install the agent over it.
    ///
    /// `agent_params` are added to the original's default parameters.
    pub async fn install(
        &self,
        original: &Action,
        variant: AgentVariant,
        agent_params: Params,
    ) -> Result<Action> {
        let backup_name = self.backup_name();
        self.client.update_action(&backup_name, original).await?;
        *self.installed.lock().await = Some(variant);
        info!(backup = %backup_name, "Original action backed up");

        if variant == AgentVariant::Polling {
            for helper in self.helper_names() {
                debug!(helper = %helper, "Creating helper action");
                self.client
                    .update_action(&helper, &self.helper_action(&helper))
                    .await?;
            }
        }

        let agent = self.agent_action(original, variant, agent_params);
        let installed = self.client.update_action(&self.action_name, &agent).await?;
        info!(action = %self.action_name, variant = %variant, "Agent installed");
        Ok(installed)
    }

    /// Put the original back and remove backup and helpers.
    ///
    /// Does nothing unless this manager installed an agent, so a second call
    /// changes nothing remotely.
    pub async fn restore(&self) -> Result<()> {
        let Some(variant) = self.installed.lock().await.take() else {
            return Ok(());
        };

        if variant == AgentVariant::Concurrent {
            self.shutdown_agent().await;
        }

        let backup_name = self.backup_name();
        let restored = match self.client.get_action(&backup_name).await {
            Ok(original) => {
                self.client
                    .update_action(&self.action_name, &original)
                    .await
                    .map(|_| ())
                    .map_err(RelayError::from)
            }
            Err(ClientError::NotFound(_)) => {
                warn!(backup = %backup_name, "No backup found, action left as is");
                Ok(())
            }
            Err(e) => Err(e.into()),
        };

        // keep the backup if the original could not be put back
        let mut backup = Ok(());
        if restored.is_ok() {
            match self.client.delete_action(&backup_name).await {
                Ok(()) => info!(action = %self.action_name, "Original action restored"),
                Err(e) => {
                    warn!(backup = %backup_name, error = %e, "Failed to delete backup action");
                    backup = Err(RelayError::from(e));
                }
            }
        }

        let mut helpers = Ok(());
        if variant == AgentVariant::Polling {
            for helper in self.helper_names() {
                if let Err(e) = self.client.delete_action(&helper).await {
                    warn!(helper = %helper, error = %e, "Failed to delete helper action");
                    helpers = Err(RelayError::from(e));
                }
            }
        }

        restored.and(backup).and(helpers)
    }

    /// Release a relay blocked in `$waitForActivation`. Best effort.
    async fn shutdown_agent(&self) {
        let mut params = Params::new();
        params.insert(protocol::SHUTDOWN.to_string(), Value::Bool(true));
        if let Err(e) = self.client.invoke(&self.action_name, params, false).await {
            debug!(error = %e, "Agent shutdown request failed");
        }
    }

    fn helper_names(&self) -> [String; 2] {
        [
            protocol::invoked_helper_name(&self.action_name),
            protocol::completed_helper_name(&self.action_name),
        ]
    }

    fn agent_exec(&self, variant: AgentVariant) -> Exec {
        Exec {
            kind: "blackbox".to_string(),
            image: Some(self.agent_image.clone()),
            code: Some(AgentConfig::new(variant).to_code()),
            main: None,
            binary: false,
        }
    }

    fn helper_action(&self, name: &str) -> Action {
        let mut helper = Action::new(name, self.agent_exec(AgentVariant::Echo));
        helper.set_annotation(AGENT_ANNOTATION, true);
        helper.set_annotation(AGENT_VARIANT_ANNOTATION, AgentVariant::Echo.as_str());
        helper
    }

    fn agent_action(&self, original: &Action, variant: AgentVariant, agent_params: Params) -> Action {
        let mut agent = Action::new(self.action_name.clone(), self.agent_exec(variant));

        agent.annotations = original.annotations.clone();
        agent.set_annotation(AGENT_ANNOTATION, true);
        agent.set_annotation(AGENT_VARIANT_ANNOTATION, variant.as_str());
        agent.set_annotation(
            protocol::DESCRIPTION_ANNOTATION,
            format!(
                "{} temporarily installed over original action. original action backup at {}.",
                protocol::LEGACY_DESCRIPTION_PREFIX,
                self.backup_name()
            ),
        );

        agent.parameters = original.parameters.clone();
        for (key, value) in agent_params {
            agent.set_parameter(&key, value);
        }

        agent.limits = Limits {
            timeout: Some(self.agent_timeout.as_millis() as u64),
            memory: original.limits.memory,
            logs: original.limits.logs,
            concurrency: Some(variant.concurrency()),
        };
        agent
    }
}
