// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Polling agent.
//!
//! Used when the platform runs one activation per container. Activations are
//! dropped into the activation log by invoking the `_wskdebug_invoked` echo
//! helper; the agent then polls the `_wskdebug_completed` helper's log for a
//! record carrying its own activation id.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use wskdebug_client::protocol::{self, ACTIVATION_ID};
use wskdebug_client::{
    ActionProgram, AgentFault, InvocationContext, ListActivationsOptions, Params,
};

use crate::dispatch;

/// Activation log poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Stop waiting this long before the activation deadline.
pub const DEADLINE_MARGIN: Duration = Duration::from_secs(10);

/// Agent using helper actions as durable drops.
pub struct PollingAgent {
    poll_interval: Duration,
    deadline_margin: Duration,
}

impl Default for PollingAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingAgent {
    pub fn new() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            deadline_margin: DEADLINE_MARGIN,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_deadline_margin(mut self, margin: Duration) -> Self {
        self.deadline_margin = margin;
        self
    }

    async fn forward(&self, mut params: Params, ctx: &InvocationContext) -> Result<Value, AgentFault> {
        let action = ctx.base_action_name().to_string();
        let id = ctx.activation_id.clone();

        protocol::strip_reserved(&mut params);
        params.insert(ACTIVATION_ID.to_string(), Value::String(id.clone()));

        let since = Utc::now().timestamp_millis();
        ctx.client
            .invoke(&protocol::invoked_helper_name(&action), params, false)
            .await?;
        debug!(activation_id = %id, "Activation dropped for debugger");

        let options = ListActivationsOptions::for_action(protocol::completed_helper_name(&action))
            .since(since)
            .with_docs();

        loop {
            let records = ctx.client.list_activations(&options).await?;
            let completed = records.iter().find_map(|record| {
                let mut result = record.result_params()?;
                (protocol::activation_id(&result).as_deref() == Some(id.as_str())).then(|| {
                    result.remove(ACTIVATION_ID);
                    result
                })
            });
            if let Some(result) = completed {
                debug!(activation_id = %id, "Activation completed by debugger");
                return Ok(Value::Object(result));
            }

            if ctx.out_of_time(self.deadline_margin) {
                return Err(AgentFault::retry(
                    "Debugger did not complete activation within timeout.",
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ActionProgram for PollingAgent {
    async fn invoke(&self, params: Params, ctx: InvocationContext) -> Result<Value, AgentFault> {
        if dispatch::hit(&params) {
            self.forward(params, &ctx).await
        } else {
            dispatch::invoke_original(params, &ctx).await
        }
    }
}
