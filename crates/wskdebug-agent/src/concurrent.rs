// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Concurrent agent.
//!
//! All activations of the agent action run in the same container, so callers
//! and the relay meet in process memory: callers queue themselves and wait for
//! a completion, the relay pops from the queue with `$waitForActivation` and
//! pushes results back with `$activationId`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use wskdebug_client::protocol::{self, ACTIVATION_ID, SHUTDOWN, WAIT_FOR_ACTIVATION};
use wskdebug_client::{ActionProgram, AgentFault, InvocationContext, Params};

use crate::dispatch;

/// Upper bound for one `$waitForActivation` call (platform blocking window).
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(60);
/// Queue and completion check interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Stop waiting this long before the activation deadline.
pub const DEADLINE_MARGIN: Duration = Duration::from_secs(10);

#[derive(Default)]
struct Queues {
    pending: VecDeque<(String, Params)>,
    /// Handed to the debugger, caller still waiting.
    in_flight: HashSet<String>,
    completed: HashMap<String, Params>,
}

/// Agent sharing a queue and a completion map across activations.
pub struct ConcurrentAgent {
    queues: Mutex<Queues>,
    changed: Notify,
    shutdown: AtomicBool,
    wait_timeout: Duration,
    poll_interval: Duration,
    deadline_margin: Duration,
}

impl Default for ConcurrentAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrentAgent {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            changed: Notify::new(),
            shutdown: AtomicBool::new(false),
            wait_timeout: WAIT_TIMEOUT,
            poll_interval: POLL_INTERVAL,
            deadline_margin: DEADLINE_MARGIN,
        }
    }

    /// Override the `$waitForActivation` window.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Override the safety margin before the activation deadline.
    pub fn with_deadline_margin(mut self, margin: Duration) -> Self {
        self.deadline_margin = margin;
        self
    }

    /// Number of queued activations not yet picked up.
    pub async fn pending(&self) -> usize {
        self.queues.lock().await.pending.len()
    }

    /// Number of completions not yet taken by their caller.
    pub async fn completed(&self) -> usize {
        self.queues.lock().await.completed.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleep until the queues change or the poll interval passes.
    async fn pause(&self) {
        let _ = tokio::time::timeout(self.poll_interval, self.changed.notified()).await;
    }

    async fn wait_for_activation(&self, ctx: &InvocationContext) -> Result<Value, AgentFault> {
        let until = Instant::now() + self.wait_timeout.min(ctx.remaining(Duration::ZERO));
        debug!("Debugger connected, waiting for activation");

        loop {
            if self.is_shutting_down() {
                return Err(AgentFault::shutdown("Agent is shutting down."));
            }

            let next = {
                let mut queues = self.queues.lock().await;
                let next = queues.pending.pop_front();
                if let Some((id, _)) = &next {
                    queues.in_flight.insert(id.clone());
                }
                next
            };
            if let Some((id, mut params)) = next {
                info!(activation_id = %id, "Handing activation to debugger");
                params.insert(ACTIVATION_ID.to_string(), Value::String(id));
                return Ok(Value::Object(params));
            }

            if Instant::now() >= until {
                return Err(AgentFault::retry("No activation within timeout. Please retry."));
            }
            self.pause().await;
        }
    }

    async fn complete(&self, id: String, mut result: Params) -> Value {
        protocol::strip_reserved(&mut result);
        {
            let mut queues = self.queues.lock().await;
            // the caller gave up at its deadline, nobody would take this result
            if !queues.in_flight.remove(&id) {
                warn!(activation_id = %id, "Completion for an activation that is not waiting, dropped");
                return json!({ "message": format!("activation {} is no longer waiting", id) });
            }
            queues.completed.insert(id.clone(), result);
        }
        info!(activation_id = %id, "Completing activation");
        self.changed.notify_waiters();
        json!({ "message": format!("completed activation {}", id) })
    }

    async fn forward(&self, mut params: Params, ctx: &InvocationContext) -> Result<Value, AgentFault> {
        protocol::strip_reserved(&mut params);
        let id = ctx.activation_id.clone();
        self.queues
            .lock()
            .await
            .pending
            .push_back((id.clone(), params));
        self.changed.notify_waiters();
        debug!(activation_id = %id, "Activation queued for debugger");

        loop {
            if let Some(result) = self.queues.lock().await.completed.remove(&id) {
                return Ok(Value::Object(result));
            }

            if ctx.out_of_time(self.deadline_margin) {
                // withdraw so the debugger never sees it, or drops its late completion
                let mut queues = self.queues.lock().await;
                queues.pending.retain(|(queued, _)| queued != &id);
                queues.in_flight.remove(&id);
                queues.completed.remove(&id);
                return Err(AgentFault::retry(
                    "Debugger did not complete activation within timeout.",
                ));
            }
            self.pause().await;
        }
    }
}

#[async_trait]
impl ActionProgram for ConcurrentAgent {
    async fn invoke(&self, mut params: Params, ctx: InvocationContext) -> Result<Value, AgentFault> {
        if protocol::flag(&params, SHUTDOWN) {
            info!("Shutdown requested, releasing waiting debuggers");
            self.shutdown.store(true, Ordering::SeqCst);
            self.changed.notify_waiters();
            return Ok(json!({ "message": "shutting down" }));
        }

        if protocol::flag(&params, WAIT_FOR_ACTIVATION) {
            return self.wait_for_activation(&ctx).await;
        }

        if let Some(id) = protocol::take_activation_id(&mut params) {
            return Ok(self.complete(id, params).await);
        }

        if dispatch::hit(&params) {
            self.forward(params, &ctx).await
        } else {
            dispatch::invoke_original(params, &ctx).await
        }
    }
}
