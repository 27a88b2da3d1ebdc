// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decisions shared by all agent variants.

use serde_json::Value;
use tracing::{debug, warn};

use wskdebug_client::protocol::{self, CONDITION};
use wskdebug_client::{ActionClient, AgentFault, InvocationContext, Params};

use crate::condition::Condition;

/// Whether an activation is forwarded to the debugger.
///
/// Without a condition every activation is a hit. A condition that fails to
/// parse or evaluate is a miss.
pub fn hit(params: &Params) -> bool {
    let source = match params.get(CONDITION) {
        None | Some(Value::Null) => return true,
        Some(Value::String(source)) if source.trim().is_empty() => return true,
        Some(Value::String(source)) => source,
        Some(other) => {
            warn!(condition = %other, "Hit condition is not a string, not forwarding");
            return false;
        }
    };

    let mut user_params = params.clone();
    protocol::strip_reserved(&mut user_params);

    match Condition::parse(source).and_then(|c| c.evaluate(&user_params)) {
        Ok(hit) => {
            debug!(condition = %source, hit, "Evaluated hit condition");
            hit
        }
        Err(e) => {
            warn!(condition = %source, error = %e, "Failed to evaluate hit condition, not forwarding");
            false
        }
    }
}

/// Invoke the original action from its backup and return its result.
pub async fn invoke_original(
    mut params: Params,
    ctx: &InvocationContext,
) -> Result<Value, AgentFault> {
    protocol::strip_reserved(&mut params);
    let backup = protocol::backup_name(ctx.base_action_name());
    debug!(backup = %backup, "Passing activation through to original action");

    invoke_result(ctx.client.as_ref(), &backup, params).await
}

/// Blocking invoke of another action, result only.
pub async fn invoke_result(
    client: &dyn ActionClient,
    name: &str,
    params: Params,
) -> Result<Value, AgentFault> {
    let activation = client.invoke(name, params, true).await?;
    activation.result().cloned().ok_or_else(|| {
        AgentFault::new(format!(
            "{} did not complete in time (activation {})",
            name, activation.activation_id
        ))
    })
}
