// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activation relay.
//!
//! Fetches activations from the installed agent, replays each against the
//! local runtime and hands the result back:
//!
//! - concurrent agent: blocking `$waitForActivation` invokes, results are
//!   delivered by invoking the agent with `$activationId` attached.
//! - polling agent: the `_wskdebug_invoked` helper's activation log is read,
//!   results are dropped into the `_wskdebug_completed` helper.
//!
//! The tunnel agent needs no loop; the bridge completes activations directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use wskdebug_agent::AgentVariant;
use wskdebug_client::protocol::{self, CODE_RETRY, CODE_SHUTDOWN};
use wskdebug_client::{ActionClient, ListActivationsOptions, Params};

use crate::error::{RelayError, Result};
use crate::fence::ActivationFence;
use crate::runtime::{LocalRuntime, RuntimeError};

/// Outcome of handing an activation to the local runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Completed(Value),
    /// Already dispatched once, not run again.
    Duplicate,
}

/// Single entry point to the local runtime.
///
/// Runs one activation at a time and never runs an activation id twice.
pub struct Dispatcher {
    runtime: Arc<dyn LocalRuntime>,
    fence: Mutex<ActivationFence>,
    slot: Mutex<()>,
}

impl Dispatcher {
    pub fn new(runtime: Arc<dyn LocalRuntime>) -> Self {
        Self {
            runtime,
            fence: Mutex::new(ActivationFence::default()),
            slot: Mutex::new(()),
        }
    }

    /// Whether an activation id was already dispatched.
    pub async fn seen(&self, activation_id: &str) -> bool {
        self.fence.lock().await.contains(activation_id)
    }

    /// Run an activation on the local runtime. Reserved keys are removed first.
    pub async fn dispatch(
        &self,
        activation_id: &str,
        mut params: Params,
    ) -> std::result::Result<Dispatched, RuntimeError> {
        let _slot = self.slot.lock().await;
        if !self.fence.lock().await.insert(activation_id) {
            warn!(activation_id = %activation_id, "Activation already dispatched, skipping");
            return Ok(Dispatched::Duplicate);
        }

        protocol::strip_reserved(&mut params);
        info!(activation_id = %activation_id, "Activation received");

        let started = Instant::now();
        let result = self.runtime.run(params, activation_id).await?;
        info!(
            activation_id = %activation_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Activation completed in {} ms",
            started.elapsed().as_millis()
        );
        Ok(Dispatched::Completed(result))
    }
}

/// What a single poll of the agent produced.
enum Poll {
    Activation(String, Params),
    Retry,
    Shutdown,
}

/// Main loop of a concurrent or polling session.
pub struct ActivationRelay {
    client: Arc<dyn ActionClient>,
    dispatcher: Arc<Dispatcher>,
    action_name: String,
    retry_backoff: Duration,
    poll_interval: Duration,
    /// Polling helper records older than this are ignored (epoch ms).
    since: i64,
}

impl ActivationRelay {
    pub fn new(
        client: Arc<dyn ActionClient>,
        dispatcher: Arc<Dispatcher>,
        action_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            dispatcher,
            action_name: action_name.into(),
            retry_backoff: crate::config::DEFAULT_RETRY_BACKOFF,
            poll_interval: crate::config::DEFAULT_POLL_INTERVAL,
            since: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_since(mut self, since: i64) -> Self {
        self.since = since;
        self
    }

    /// Relay activations until cancelled, told to shut down, or a fatal error.
    pub async fn run(&self, variant: AgentVariant, cancel: CancellationToken) -> Result<()> {
        match variant {
            AgentVariant::Concurrent => self.run_concurrent(cancel).await,
            AgentVariant::Polling => self.run_polling(cancel).await,
            AgentVariant::Tunnel | AgentVariant::Echo => {
                cancel.cancelled().await;
                Ok(())
            }
        }
    }

    async fn run_concurrent(&self, cancel: CancellationToken) -> Result<()> {
        loop {
            let poll = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                poll = self.wait_for_activation() => poll?,
            };

            match poll {
                Poll::Activation(id, params) => {
                    if let Some(result) = self.run_activation(&id, params).await {
                        self.complete(&self.action_name, &id, result).await;
                    }
                }
                Poll::Retry => {
                    if !sleep_or_cancel(self.retry_backoff, &cancel).await {
                        return Ok(());
                    }
                }
                Poll::Shutdown => {
                    info!("Agent is shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn run_polling(&self, cancel: CancellationToken) -> Result<()> {
        let completed_helper = protocol::completed_helper_name(&self.action_name);
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = self.next_invoked() => next?,
            };

            match next {
                Some((id, params)) => {
                    if let Some(result) = self.run_activation(&id, params).await {
                        self.complete(&completed_helper, &id, result).await;
                    }
                }
                None => {
                    if !sleep_or_cancel(self.poll_interval, &cancel).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One blocking `$waitForActivation` invoke of the concurrent agent.
    async fn wait_for_activation(&self) -> Result<Poll> {
        let mut params = Params::new();
        params.insert(protocol::WAIT_FOR_ACTIVATION.to_string(), Value::Bool(true));

        match self.client.invoke(&self.action_name, params, true).await {
            Ok(activation) => {
                let Some(mut params) = activation.result_params() else {
                    info!(
                        activation_id = %activation.activation_id,
                        "Incomplete activation (no response), retrying"
                    );
                    return Ok(Poll::Retry);
                };
                let id = protocol::take_activation_id(&mut params).ok_or_else(|| {
                    RelayError::UnexpectedActivation(format!(
                        "agent activation {} carries no {}",
                        activation.activation_id,
                        protocol::ACTIVATION_ID
                    ))
                })?;
                Ok(Poll::Activation(id, params))
            }
            Err(e) => match e.fault_code() {
                Some(CODE_RETRY) => {
                    trace!("No activation yet");
                    Ok(Poll::Retry)
                }
                Some(CODE_SHUTDOWN) => Ok(Poll::Shutdown),
                _ => {
                    error!(error = ?e, "Unexpected error while polling agent for activation");
                    Err(RelayError::UnexpectedActivation(e.to_string()))
                }
            },
        }
    }

    /// Newest record of the `_wskdebug_invoked` helper not dispatched yet.
    async fn next_invoked(&self) -> Result<Option<(String, Params)>> {
        let options =
            ListActivationsOptions::for_action(protocol::invoked_helper_name(&self.action_name))
                .since(self.since)
                .with_docs();

        let records = self.client.list_activations(&options).await?;
        for record in records {
            let Some(mut params) = record.result_params() else {
                continue;
            };
            let Some(id) = protocol::take_activation_id(&mut params) else {
                continue;
            };
            if !self.dispatcher.seen(&id).await {
                return Ok(Some((id, params)));
            }
        }
        trace!("No new activation in helper log");
        Ok(None)
    }

    /// Dispatch, turning runtime failures into an action error result.
    async fn run_activation(&self, id: &str, params: Params) -> Option<Value> {
        match self.dispatcher.dispatch(id, params).await {
            Ok(Dispatched::Completed(result)) => Some(result),
            Ok(Dispatched::Duplicate) => None,
            Err(e) => {
                error!(activation_id = %id, error = %e, "Local runtime failed");
                Some(serde_json::json!({ "error": e.to_string() }))
            }
        }
    }

    /// Send a result back with its activation id attached.
    async fn complete(&self, target: &str, id: &str, result: Value) {
        let mut completion = match result {
            Value::Object(map) => map,
            other => {
                let mut map = Params::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        completion.insert(
            protocol::ACTIVATION_ID.to_string(),
            Value::String(id.to_string()),
        );

        match self.client.invoke(target, completion, true).await {
            Ok(_) => debug!(activation_id = %id, "Result delivered"),
            Err(e) => error!(activation_id = %id, error = %e, "Failed to deliver result"),
        }
    }
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
