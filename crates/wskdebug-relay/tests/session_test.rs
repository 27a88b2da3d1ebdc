// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end debug sessions on the in-memory platform.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use wskdebug_agent::AgentVariant;
use wskdebug_client::mock::{FnProgram, MockPlatform};
use wskdebug_client::{ActionClient, AgentFault, Exec, protocol};
use wskdebug_relay::runtime::mock::MockRuntime;
use wskdebug_relay::tunnel::DirectTunnel;
use wskdebug_relay::{DebugConfig, Phase, RelayError, Session, Transport};

use common::*;

fn session(platform: &MockPlatform, runtime: &MockRuntime, config: DebugConfig) -> Arc<Session> {
    Arc::new(Session::new(
        config,
        Arc::new(platform.clone()),
        Arc::new(runtime.clone()),
    ))
}

fn spawn_run(session: &Arc<Session>) -> JoinHandle<wskdebug_relay::Result<()>> {
    let session = session.clone();
    tokio::spawn(async move { session.run().await })
}

#[tokio::test]
async fn test_round_trip_concurrent() {
    let platform = platform();
    let original = original_action();
    platform.insert_action(original.clone()).await;
    let runtime = runtime();

    let session = session(&platform, &runtime, config());
    session.start().await.unwrap();
    assert_eq!(session.variant().await, Some(AgentVariant::Concurrent));
    assert_eq!(session.phase(), Phase::AgentInstalled);
    let running = spawn_run(&session);

    let activation = platform
        .invoke(ACTION, params(json!({"input": "test-input"})), true)
        .await
        .unwrap();
    assert_eq!(
        activation.result().cloned().unwrap(),
        json!({"msg": "CORRECT", "input": "test-input"})
    );

    // the sandbox sees the caller's parameters, nothing reserved
    let calls = runtime.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(
        serde_json::Value::Object(calls[0].params.clone()),
        json!({"input": "test-input"})
    );

    session.stop().await;
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(session.phase(), Phase::Idle);
    assert_restored(&platform, &original).await;
    assert!(!runtime.is_started());
}

#[tokio::test]
async fn test_polling_fallback_without_concurrency() {
    let platform = platform().without_concurrency();
    let original = original_action();
    platform.insert_action(original.clone()).await;
    let runtime = runtime();

    let session = session(&platform, &runtime, config());
    session.start().await.unwrap();
    assert_eq!(session.variant().await, Some(AgentVariant::Polling));

    let invoked = protocol::invoked_helper_name(ACTION);
    let completed = protocol::completed_helper_name(ACTION);
    assert!(platform.action(&invoked).await.is_some());
    assert!(platform.action(&completed).await.is_some());

    let running = spawn_run(&session);
    let activation = platform
        .invoke(ACTION, params(json!({"input": "test-input"})), true)
        .await
        .unwrap();
    assert_eq!(
        activation.result().cloned().unwrap(),
        json!({"msg": "CORRECT", "input": "test-input"})
    );

    // the helper log keeps returning the same record, it must not run again
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(runtime.calls().await.len(), 1);

    session.stop().await;
    running.await.unwrap().unwrap();

    assert_restored(&platform, &original).await;
    assert!(platform.action(&invoked).await.is_none());
    assert!(platform.action(&completed).await.is_none());
}

#[tokio::test]
async fn test_each_activation_runs_once_in_order() {
    let platform = platform();
    platform.insert_action(original_action()).await;
    let runtime = runtime();

    let session = session(&platform, &runtime, config());
    session.start().await.unwrap();
    let running = spawn_run(&session);

    for i in 0..3 {
        let activation = platform
            .invoke(ACTION, params(json!({"input": i})), true)
            .await
            .unwrap();
        assert_eq!(activation.result().unwrap()["input"], json!(i));
    }

    let calls = runtime.calls().await;
    let inputs: Vec<_> = calls.iter().map(|c| c.params["input"].clone()).collect();
    assert_eq!(inputs, vec![json!(0), json!(1), json!(2)]);

    session.stop().await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_condition_miss_runs_original() {
    let platform = platform();
    platform.insert_action(original_action()).await;
    let runtime = runtime();

    let session = session(
        &platform,
        &runtime,
        config().with_condition("input == 'debug-me'"),
    );
    session.start().await.unwrap();
    let running = spawn_run(&session);

    let miss = platform
        .invoke(ACTION, params(json!({"input": "other"})), true)
        .await
        .unwrap();
    assert_eq!(miss.result().unwrap()["msg"], json!("ORIGINAL"));
    assert!(runtime.calls().await.is_empty());

    let hit = platform
        .invoke(ACTION, params(json!({"input": "debug-me"})), true)
        .await
        .unwrap();
    assert_eq!(hit.result().unwrap()["msg"], json!("CORRECT"));
    assert_eq!(runtime.calls().await.len(), 1);

    session.stop().await;
    running.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_crash_recovery_uses_backup() {
    let platform = platform();
    let original = original_action();
    platform.insert_action(original.clone()).await;

    // first session dies after installing the agent
    let crashed = session(&platform, &runtime(), config());
    crashed.start().await.unwrap();
    drop(crashed);
    let live = platform.action(ACTION).await.unwrap();
    assert_eq!(live.exec.kind, "blackbox");

    let runtime = runtime();
    let session = session(&platform, &runtime, config());
    session.start().await.unwrap();
    let running = spawn_run(&session);

    let activation = platform
        .invoke(ACTION, params(json!({"input": "again"})), true)
        .await
        .unwrap();
    assert_eq!(
        activation.result().cloned().unwrap(),
        json!({"msg": "CORRECT", "input": "again"})
    );

    session.stop().await;
    running.await.unwrap().unwrap();
    assert_restored(&platform, &original).await;
}

#[tokio::test]
async fn test_agent_without_backup_is_fatal() {
    let platform = platform();
    let crashed = session(&platform, &runtime(), config());
    platform.insert_action(original_action()).await;
    crashed.start().await.unwrap();
    drop(crashed);
    platform
        .delete_action(&protocol::backup_name(ACTION))
        .await
        .unwrap();
    let before = platform.mutations().await.len();

    let runtime = runtime();
    let session = session(&platform, &runtime, config());
    let err = session.start().await.unwrap_err();

    assert!(matches!(err, RelayError::BrokenBackup { .. }));
    assert!(err.is_setup_fatal());
    assert!(err.to_string().contains("redeploy the action first"));
    assert_eq!(platform.mutations().await.len(), before);
    assert!(!runtime.is_started());
}

#[tokio::test]
async fn test_backup_that_is_an_agent_is_fatal() {
    let platform = platform();
    let mut agent = original_action();
    agent.exec = Exec {
        kind: "blackbox".to_string(),
        ..Exec::default()
    };
    agent.set_annotation(protocol::AGENT_ANNOTATION, true);
    platform.insert_action(agent.clone()).await;
    agent.name = protocol::backup_name(ACTION);
    platform.insert_action(agent).await;

    let session = session(&platform, &runtime(), config());
    let err = session.start().await.unwrap_err();
    assert!(err.to_string().contains("also an agent"));
    assert!(platform.mutations().await.is_empty());
}

#[tokio::test]
async fn test_missing_action() {
    let platform = platform();
    let session = session(&platform, &runtime(), config());

    let err = session.start().await.unwrap_err();
    assert_eq!(err.to_string(), "Action not found: myaction");
    assert!(err.is_setup_fatal());
}

#[tokio::test]
async fn test_invalid_condition_is_rejected_before_install() {
    let platform = platform();
    platform.insert_action(original_action()).await;

    let session = session(&platform, &runtime(), config().with_condition("input =="));
    let err = session.start().await.unwrap_err();

    assert!(matches!(err, RelayError::InvalidCondition(_)));
    assert!(platform.mutations().await.is_empty());
}

#[tokio::test]
async fn test_failed_runtime_start_leaves_action_untouched() {
    let platform = platform();
    platform.insert_action(original_action()).await;
    let mut runtime = runtime();
    runtime.fail_start = true;

    let session = session(&platform, &runtime, config());
    let err = session.start().await.unwrap_err();

    assert!(matches!(err, RelayError::UnsupportedKind(_)));
    assert!(platform.mutations().await.is_empty());
    assert_eq!(session.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_cancel_while_starting_cleans_up() {
    let platform = platform();
    let original = original_action();
    platform.insert_action(original.clone()).await;
    let mut runtime = runtime();
    runtime.start_delay = Duration::from_secs(30);

    let session = session(&platform, &runtime, config());
    let starting = {
        let session = session.clone();
        tokio::spawn(async move { session.start().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(runtime.is_started());
    session.cancel_token().cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), starting)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, RelayError::Interrupted));
    assert!(!runtime.is_started());
    assert_eq!(runtime.stops().await, 1);
    assert!(platform.mutations().await.is_empty());
    assert_eq!(session.phase(), Phase::Idle);
}

/// Platform whose agent answers every activation poll with `reply`.
fn scripted_agent(
    reply: impl Fn(usize) -> AgentFault + Send + Sync + 'static,
) -> (MockPlatform, Arc<AtomicUsize>) {
    let polls = Arc::new(AtomicUsize::new(0));
    let reply = Arc::new(reply);
    let counter = polls.clone();
    let platform = MockPlatform::new(move |action| {
        if wskdebug_agent::agent_config(action).is_none() {
            return Some(FnProgram::shared(|_| Ok(json!({"msg": "ORIGINAL"}))));
        }
        let counter = counter.clone();
        let reply = reply.clone();
        Some(FnProgram::shared(move |p| {
            if p.contains_key(protocol::SHUTDOWN) {
                return Ok(json!({}));
            }
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Err(reply(n))
        }))
    });
    (platform, polls)
}

#[tokio::test]
async fn test_retry_replies_are_polled_again_until_shutdown() {
    let (platform, polls) = scripted_agent(|n| {
        if n < 3 {
            AgentFault::retry("no activation yet")
        } else {
            AgentFault::shutdown("bye")
        }
    });
    let original = original_action();
    platform.insert_action(original.clone()).await;
    let runtime = runtime();

    let session = session(&platform, &runtime, config());
    session.start().await.unwrap();
    assert_eq!(session.variant().await, Some(AgentVariant::Concurrent));

    tokio::time::timeout(Duration::from_secs(5), session.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(polls.load(Ordering::SeqCst), 4);
    assert!(runtime.calls().await.is_empty());

    session.stop().await;
    assert_restored(&platform, &original).await;
}

#[tokio::test]
async fn test_unexpected_agent_error_ends_run_and_still_restores() {
    let (platform, polls) = scripted_agent(|_| AgentFault::new("agent exploded"));
    let original = original_action();
    platform.insert_action(original.clone()).await;
    let runtime = runtime();

    let session = session(&platform, &runtime, config());
    session.start().await.unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), session.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, RelayError::UnexpectedActivation(_)));
    assert_eq!(polls.load(Ordering::SeqCst), 1);

    session.stop().await;
    assert_restored(&platform, &original).await;
    assert!(!runtime.is_started());
}

#[tokio::test]
async fn test_stop_twice_changes_nothing_more() {
    let platform = platform();
    platform.insert_action(original_action()).await;

    let session = session(&platform, &runtime(), config());
    session.start().await.unwrap();
    session.stop().await;
    let after_first = platform.mutations().await;

    session.stop().await;
    assert_eq!(platform.mutations().await, after_first);
}

#[tokio::test]
async fn test_failing_runtime_stop_does_not_block_restore() {
    let platform = platform();
    let original = original_action();
    platform.insert_action(original.clone()).await;
    let mut runtime = runtime();
    runtime.fail_stop = true;

    let session = session(&platform, &runtime, config());
    session.start().await.unwrap();
    session.stop().await;

    assert_restored(&platform, &original).await;
}

#[tokio::test]
async fn test_tunnel_round_trip() {
    let platform = platform();
    let original = original_action();
    platform.insert_action(original.clone()).await;
    let runtime = runtime();

    let session = Arc::new(
        Session::new(
            config().with_transport(Transport::Tunnel),
            Arc::new(platform.clone()),
            Arc::new(runtime.clone()),
        )
        .with_tunnel_provider(Box::new(DirectTunnel)),
    );
    session.start().await.unwrap();
    assert_eq!(session.variant().await, Some(AgentVariant::Tunnel));

    let agent = platform.action(ACTION).await.unwrap();
    let url = agent.parameter(protocol::NGROK_URL).unwrap().as_str().unwrap();
    assert!(url.starts_with("http://127.0.0.1:"));
    assert!(agent.parameter(protocol::NGROK_AUTH).is_some());

    let running = spawn_run(&session);
    let activation = platform
        .invoke(ACTION, params(json!({"input": "via-tunnel"})), true)
        .await
        .unwrap();
    assert_eq!(
        activation.result().cloned().unwrap(),
        json!({"msg": "CORRECT", "input": "via-tunnel"})
    );
    assert_eq!(runtime.calls().await.len(), 1);

    session.stop().await;
    running.await.unwrap().unwrap();
    assert_restored(&platform, &original).await;
}
