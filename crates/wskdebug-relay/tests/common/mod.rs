// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared fixtures: an in-memory platform running the real agent programs and
//! a mock local runtime.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wskdebug_agent::{AgentVariant, ConcurrentAgent, EchoAgent, PollingAgent, TunnelAgent};
use wskdebug_client::mock::{FnProgram, MockPlatform};
use wskdebug_client::{Action, ActionProgram, Exec, Params};
use wskdebug_relay::DebugConfig;
use wskdebug_relay::runtime::mock::MockRuntime;

pub const ACTION: &str = "myaction";

pub fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap()
}

/// Platform executing agents with short timeouts and originals with a fixed program.
pub fn platform() -> MockPlatform {
    MockPlatform::new(|action| {
        let Some(config) = wskdebug_agent::agent_config(action) else {
            return Some(FnProgram::shared(|p| {
                Ok(json!({"msg": "ORIGINAL", "input": p.get("input").cloned()}))
            }));
        };
        let program: Arc<dyn ActionProgram> = match config.variant {
            AgentVariant::Concurrent => Arc::new(
                ConcurrentAgent::new()
                    .with_wait_timeout(Duration::from_millis(500))
                    .with_deadline_margin(Duration::ZERO),
            ),
            AgentVariant::Polling => Arc::new(
                PollingAgent::new()
                    .with_poll_interval(Duration::from_millis(50))
                    .with_deadline_margin(Duration::ZERO),
            ),
            AgentVariant::Tunnel => Arc::new(TunnelAgent::new()),
            AgentVariant::Echo => Arc::new(EchoAgent),
        };
        Some(program)
    })
}

pub fn original_action() -> Action {
    let mut action = Action::new(
        ACTION,
        Exec {
            kind: "nodejs:10".to_string(),
            code: Some(
                "function main(p) { return {msg: 'CORRECT', input: p.input}; }".to_string(),
            ),
            ..Exec::default()
        },
    );
    action.set_annotation("exec", "nodejs:10");
    action.limits.timeout = Some(30_000);
    action
}

/// Local runtime answering like the action's code would.
pub fn runtime() -> MockRuntime {
    MockRuntime::new(|p| Ok(json!({"msg": "CORRECT", "input": p.get("input").cloned()})))
}

pub fn config() -> DebugConfig {
    DebugConfig::new(ACTION)
        .with_agent_timeout(Duration::from_secs(10))
        .with_retry_backoff(Duration::from_millis(10))
        .with_poll_interval(Duration::from_millis(50))
}

/// The live action has the original definition again.
pub async fn assert_restored(platform: &MockPlatform, original: &Action) {
    let live = platform.action(ACTION).await.expect("action exists");
    assert_eq!(live.exec, original.exec);
    assert_eq!(live.parameters, original.parameters);
    assert_eq!(live.annotations, original.annotations);
    assert_eq!(live.limits, original.limits);
    assert!(
        platform
            .action(&wskdebug_client::protocol::backup_name(ACTION))
            .await
            .is_none(),
        "backup must be deleted"
    );
}
