// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tunnel agent tests against a mocked debugger endpoint.

use std::sync::Arc;

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wskdebug_agent::{AgentConfig, AgentVariant, TunnelAgent};
use wskdebug_client::mock::{FnProgram, MockPlatform};
use wskdebug_client::{Action, ActionClient, ActionProgram, Exec, Params};

fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap()
}

async fn setup(url: Option<String>) -> MockPlatform {
    let platform = MockPlatform::new(|action| {
        if wskdebug_agent::agent_config(action).is_some() {
            Some(Arc::new(TunnelAgent::new()) as Arc<dyn ActionProgram>)
        } else {
            Some(FnProgram::shared(|_| Ok(json!({"original": true}))))
        }
    });

    let mut agent = Action::new(
        "myaction",
        Exec {
            kind: "blackbox".to_string(),
            code: Some(AgentConfig::new(AgentVariant::Tunnel).to_code()),
            ..Exec::default()
        },
    );
    if let Some(url) = url {
        agent.set_parameter("$ngrokUrl", url);
    }
    agent.set_parameter("$ngrokAuth", "s3cret");
    platform.insert_action(agent).await;
    platform
        .insert_action(Action::new(
            "myaction_wskdebug_original",
            Exec {
                kind: "nodejs:10".to_string(),
                ..Exec::default()
            },
        ))
        .await;
    platform
}

#[tokio::test]
async fn test_posts_activation_with_shared_secret() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "s3cret"))
        .and(body_partial_json(json!({"input": "test-input"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"msg": "CORRECT"})))
        .expect(1)
        .mount(&server)
        .await;

    let platform = setup(Some(server.uri())).await;
    let result = platform
        .invoke("myaction", params(json!({"input": "test-input"})), true)
        .await
        .unwrap();

    assert_eq!(result.result().cloned().unwrap(), json!({"msg": "CORRECT"}));

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("$ngrokUrl").is_none());
    assert!(body.get("$ngrokAuth").is_none());
    assert!(body.get("$activationId").is_some());
}

#[tokio::test]
async fn test_rejected_post_is_action_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let platform = setup(Some(server.uri())).await;
    let err = platform
        .invoke("myaction", params(json!({"input": 1})), true)
        .await
        .unwrap_err();

    let fault = err.fault().unwrap();
    assert!(fault.error.contains("401"));
    assert_eq!(fault.code, None);
}

#[tokio::test]
async fn test_missing_url_passes_through() {
    let platform = setup(None).await;
    let result = platform
        .invoke("myaction", params(json!({"input": 1})), true)
        .await
        .unwrap();

    assert_eq!(result.result().cloned().unwrap(), json!({"original": true}));
}
