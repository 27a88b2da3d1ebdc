// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Echo helper: the result is the parameters, reserved keys included.

use async_trait::async_trait;
use serde_json::Value;

use wskdebug_client::{ActionProgram, AgentFault, InvocationContext, Params};

pub struct EchoAgent;

#[async_trait]
impl ActionProgram for EchoAgent {
    async fn invoke(&self, params: Params, _ctx: InvocationContext) -> Result<Value, AgentFault> {
        Ok(Value::Object(params))
    }
}
