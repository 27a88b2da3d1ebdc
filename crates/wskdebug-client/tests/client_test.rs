// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! REST client tests against a mocked platform API.

use base64::Engine;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use wskdebug_client::{
    Action, ActionClient, ClientConfig, ClientError, Exec, ListActivationsOptions, OpenWhiskClient,
    Params,
};

const ACTIONS: &str = "/api/v1/namespaces/_/actions";

fn client(server: &MockServer) -> OpenWhiskClient {
    let config = ClientConfig::new(server.uri(), Some("user:secret".to_string()));
    OpenWhiskClient::new(config).unwrap()
}

fn basic_auth() -> String {
    format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode("user:secret")
    )
}

fn params(value: serde_json::Value) -> Params {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_get_action_sends_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/myaction", ACTIONS)))
        .and(header("authorization", basic_auth().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "namespace": "guest",
            "name": "myaction",
            "version": "0.0.1",
            "exec": {"kind": "nodejs:10", "code": "function main() {}", "binary": false},
            "annotations": [{"key": "exec", "value": "nodejs:10"}],
            "parameters": [{"key": "greeting", "value": "hi"}],
            "limits": {"timeout": 30000, "memory": 128, "logs": 10, "concurrency": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let action = client(&server).get_action("myaction").await.unwrap();

    assert_eq!(action.name, "myaction");
    assert_eq!(action.exec.kind, "nodejs:10");
    assert_eq!(action.parameter("greeting"), Some(&json!("hi")));
    assert_eq!(action.timeout(), std::time::Duration::from_secs(30));
    assert_eq!(action.memory_mb(), 128);
}

#[tokio::test]
async fn test_get_missing_action_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/missing", ACTIONS)))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": "The requested resource does not exist.", "code": "x"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).get_action("missing").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_rejected_credentials_are_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{}/myaction", ACTIONS)))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "The supplied authentication is invalid"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).get_action("myaction").await.unwrap_err();
    match err {
        ClientError::Unauthorized(message) => {
            assert_eq!(message, "The supplied authentication is invalid")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_update_action_overwrites() {
    let server = MockServer::start().await;
    let mut action = Action::new(
        "myaction",
        Exec {
            kind: "blackbox".to_string(),
            image: Some("wskdebug/agent:latest".to_string()),
            code: Some(r#"{"variant":"concurrent"}"#.to_string()),
            ..Exec::default()
        },
    );
    action.set_annotation("wskdebug", true);

    Mock::given(method("PUT"))
        .and(path(format!("{}/myaction", ACTIONS)))
        .and(query_param("overwrite", "true"))
        .and(body_json(json!({
            "exec": {
                "kind": "blackbox",
                "image": "wskdebug/agent:latest",
                "code": "{\"variant\":\"concurrent\"}",
                "binary": false
            },
            "parameters": [],
            "annotations": [{"key": "wskdebug", "value": true}],
            "limits": {}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "myaction",
            "namespace": "guest",
            "version": "0.0.2",
            "exec": {"kind": "blackbox", "image": "wskdebug/agent:latest", "binary": false},
            "annotations": [{"key": "wskdebug", "value": true}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let updated = client(&server).update_action("myaction", &action).await.unwrap();
    assert_eq!(updated.version.as_deref(), Some("0.0.2"));
    assert_eq!(updated.annotation("wskdebug"), Some(&json!(true)));
}

#[tokio::test]
async fn test_delete_missing_action_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/gone", ACTIONS)))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).delete_action("gone").await.unwrap();
}

#[tokio::test]
async fn test_delete_server_error_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/busy", ACTIONS)))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = client(&server).delete_action("busy").await.unwrap_err();
    assert!(matches!(err, ClientError::Server { status: 503, .. }));
}

#[tokio::test]
async fn test_blocking_invoke_returns_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/myaction", ACTIONS)))
        .and(query_param("blocking", "true"))
        .and(body_json(json!({"input": "test-input"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activationId": "abc123",
            "name": "myaction",
            "namespace": "guest",
            "start": 1000,
            "end": 1010,
            "response": {
                "status": "success",
                "success": true,
                "result": {"msg": "CORRECT", "input": "test-input"}
            }
        })))
        .mount(&server)
        .await;

    let activation = client(&server)
        .invoke("myaction", params(json!({"input": "test-input"})), true)
        .await
        .unwrap();

    assert_eq!(activation.activation_id, "abc123");
    assert_eq!(
        activation.result().cloned().unwrap(),
        json!({"msg": "CORRECT", "input": "test-input"})
    );
}

#[tokio::test]
async fn test_application_error_carries_fault_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/myaction", ACTIONS)))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({
            "activationId": "def456",
            "response": {
                "status": "application error",
                "success": false,
                "result": {"error": {"error": "No activation within timeout. Please retry.", "code": 42}}
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .invoke("myaction", params(json!({"$waitForActivation": true})), true)
        .await
        .unwrap_err();

    assert_eq!(err.fault_code(), Some(42));
    match err {
        ClientError::Activation { activation_id, .. } => assert_eq!(activation_id, "def456"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_accepted_invoke_has_no_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/slow", ACTIONS)))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"activationId": "slow1"})))
        .mount(&server)
        .await;

    let activation = client(&server).invoke("slow", Params::new(), false).await.unwrap();
    assert_eq!(activation.activation_id, "slow1");
    assert!(activation.response.is_none());
}

#[tokio::test]
async fn test_list_activations_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/_/activations"))
        .and(query_param("name", "myaction_wskdebug_invoked"))
        .and(query_param("since", "5000"))
        .and(query_param("limit", "1"))
        .and(query_param("docs", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "activationId": "inv1",
                "name": "myaction_wskdebug_invoked",
                "start": 5001,
                "response": {"success": true, "status": "success", "result": {"$activationId": "orig1"}}
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let options = ListActivationsOptions::for_action("myaction_wskdebug_invoked")
        .since(5000)
        .limit(1)
        .with_docs();
    let records = client(&server).list_activations(&options).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].result_params().unwrap().get("$activationId"),
        Some(&json!("orig1"))
    );
}

#[tokio::test]
async fn test_system_info_and_api_docs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "api_version": "1.0.0",
            "build": "2019-11-12T18:53:03.262Z",
            "buildno": "a2bd4e8",
            "description": "OpenWhisk"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/api-docs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "definitions": {"ActionLimits": {"properties": {"concurrency": {"type": "integer"}}}}
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let info = client.system_info().await.unwrap();
    assert_eq!(info.buildno, "a2bd4e8");

    let docs = client.api_docs().await.unwrap();
    assert!(docs.pointer("/definitions/ActionLimits/properties/concurrency").is_some());
}

#[test]
fn test_load_config_from_props_file() {
    let dir = tempfile::tempdir().unwrap();
    let props = dir.path().join(".wskprops");
    std::fs::write(&props, "APIHOST=localhost:3233\nAUTH=user:secret\nNAMESPACE=guest\n").unwrap();

    let props_path = props.display().to_string();
    let env = move |name: &str| match name {
        "WSK_CONFIG_FILE" => Some(props_path.clone()),
        "OW_AUTH" => Some("other:key".to_string()),
        _ => None,
    };
    let config = ClientConfig::load_with(env).unwrap();

    assert_eq!(config.base_url(), "https://localhost:3233");
    assert_eq!(config.namespace, "guest");
    assert_eq!(config.credentials(), Some(("other", "key")));
}
