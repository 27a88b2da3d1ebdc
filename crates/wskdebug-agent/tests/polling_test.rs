// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Polling agent tests on the in-memory platform.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use wskdebug_agent::{AgentConfig, AgentVariant, EchoAgent, PollingAgent};
use wskdebug_client::mock::MockPlatform;
use wskdebug_client::protocol::{self, CODE_RETRY};
use wskdebug_client::{Action, ActionClient, ActionProgram, Exec, ListActivationsOptions, Params};

fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap()
}

fn blackbox(name: &str, variant: AgentVariant) -> Action {
    Action::new(
        name,
        Exec {
            kind: "blackbox".to_string(),
            image: Some("wskdebug/agent:latest".to_string()),
            code: Some(AgentConfig::new(variant).to_code()),
            ..Exec::default()
        },
    )
}

async fn setup(timeout_ms: u64) -> MockPlatform {
    let platform = MockPlatform::new(|action| {
        match wskdebug_agent::agent_config(action)?.variant {
            AgentVariant::Polling => Some(Arc::new(
                PollingAgent::new()
                    .with_poll_interval(Duration::from_millis(50))
                    .with_deadline_margin(Duration::ZERO),
            ) as Arc<dyn ActionProgram>),
            AgentVariant::Echo => Some(Arc::new(EchoAgent) as Arc<dyn ActionProgram>),
            _ => None,
        }
    })
    .without_concurrency();

    let mut agent = blackbox("myaction", AgentVariant::Polling);
    agent.limits.timeout = Some(timeout_ms);
    platform.insert_action(agent).await;
    for helper in [
        protocol::invoked_helper_name("myaction"),
        protocol::completed_helper_name("myaction"),
    ] {
        platform
            .insert_action(blackbox(&helper, AgentVariant::Echo))
            .await;
    }
    platform
}

/// Debugger side: take the first dropped activation and complete it.
async fn complete_next(platform: &MockPlatform, result: Value) -> Params {
    let options = ListActivationsOptions::for_action(protocol::invoked_helper_name("myaction"))
        .since(0)
        .with_docs();

    for _ in 0..100 {
        let records = platform.list_activations(&options).await.unwrap();
        if let Some(mut forwarded) = records.first().and_then(|r| r.result_params()) {
            let id = protocol::take_activation_id(&mut forwarded).unwrap();
            let mut completion = result.as_object().cloned().unwrap();
            completion.insert("$activationId".to_string(), Value::String(id));
            platform
                .invoke(&protocol::completed_helper_name("myaction"), completion, true)
                .await
                .unwrap();
            return forwarded;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no activation was dropped");
}

#[tokio::test]
async fn test_round_trip_through_helpers() {
    let platform = setup(60_000).await;

    let caller = {
        let platform = platform.clone();
        tokio::spawn(async move {
            platform
                .invoke("myaction", params(json!({"input": "test-input"})), true)
                .await
        })
    };

    let forwarded = complete_next(&platform, json!({"msg": "CORRECT", "input": "test-input"})).await;
    assert_eq!(Value::Object(forwarded), json!({"input": "test-input"}));

    let result = caller.await.unwrap().unwrap();
    assert_eq!(
        result.result().cloned().unwrap(),
        json!({"msg": "CORRECT", "input": "test-input"})
    );
}

#[tokio::test]
async fn test_ignores_completions_of_other_activations() {
    let platform = setup(60_000).await;

    platform
        .invoke(
            &protocol::completed_helper_name("myaction"),
            params(json!({"$activationId": "someone-else", "msg": "WRONG"})),
            true,
        )
        .await
        .unwrap();

    let caller = {
        let platform = platform.clone();
        tokio::spawn(async move {
            platform
                .invoke("myaction", params(json!({"input": 1})), true)
                .await
        })
    };
    complete_next(&platform, json!({"msg": "RIGHT"})).await;

    let result = caller.await.unwrap().unwrap();
    assert_eq!(result.result().cloned().unwrap(), json!({"msg": "RIGHT"}));
}

#[tokio::test]
async fn test_no_completion_before_deadline_asks_to_retry() {
    let platform = setup(300).await;

    let err = platform
        .invoke("myaction", params(json!({"input": "lost"})), true)
        .await
        .unwrap_err();

    assert_eq!(err.fault_code(), Some(CODE_RETRY));
}
