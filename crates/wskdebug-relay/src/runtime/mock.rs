// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock runtime for testing.
//!
//! Executes activations with a closure instead of a container and records
//! every call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use wskdebug_client::{Action, Params};

use super::traits::*;

type Handler = Arc<dyn Fn(&Params) -> std::result::Result<Value, String> + Send + Sync>;

/// A recorded `run` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RunCall {
    pub activation_id: String,
    pub params: Params,
}

/// Mock runtime for testing.
#[derive(Clone)]
pub struct MockRuntime {
    handler: Handler,
    calls: Arc<Mutex<Vec<RunCall>>>,
    started: Arc<AtomicBool>,
    stops: Arc<Mutex<usize>>,
    /// Simulated execution time per activation.
    pub execution_delay: Duration,
    /// Simulated container startup time, spent after the runtime counts as started.
    pub start_delay: Duration,
    /// If true, `start` fails with a setup-fatal error.
    pub fail_start: bool,
    /// If true, `stop` fails.
    pub fail_stop: bool,
}

impl MockRuntime {
    /// Runtime answering every activation with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Params) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            calls: Arc::new(Mutex::new(Vec::new())),
            started: Arc::new(AtomicBool::new(false)),
            stops: Arc::new(Mutex::new(0)),
            execution_delay: Duration::ZERO,
            start_delay: Duration::ZERO,
            fail_start: false,
            fail_stop: false,
        }
    }

    /// Runtime returning its parameters.
    pub fn echo() -> Self {
        Self::new(|params| Ok(Value::Object(params.clone())))
    }

    /// All `run` calls in order.
    pub async fn calls(&self) -> Vec<RunCall> {
        self.calls.lock().await.clone()
    }

    /// Number of successful `stop` calls on a started runtime.
    pub async fn stops(&self) -> usize {
        *self.stops.lock().await
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalRuntime for MockRuntime {
    fn runtime_type(&self) -> &'static str {
        "mock"
    }

    async fn start(&self, action: &Action) -> Result<()> {
        if self.fail_start {
            return Err(RuntimeError::UnsupportedKind(format!(
                "Unknown kind: {}. You might want to specify --image.",
                action.exec.kind
            )));
        }
        self.started.store(true, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        Ok(())
    }

    async fn init(&self, _action: &Action) -> Result<()> {
        if !self.is_started() {
            return Err(RuntimeError::NotStarted);
        }
        Ok(())
    }

    async fn run(&self, params: Params, activation_id: &str) -> Result<Value> {
        if !self.is_started() {
            return Err(RuntimeError::NotStarted);
        }
        self.calls.lock().await.push(RunCall {
            activation_id: activation_id.to_string(),
            params: params.clone(),
        });

        if !self.execution_delay.is_zero() {
            tokio::time::sleep(self.execution_delay).await;
        }

        (self.handler)(&params).map_err(RuntimeError::RunFailed)
    }

    async fn stop(&self) -> Result<()> {
        if self.fail_stop {
            return Err(RuntimeError::Io(std::io::Error::other("mock stop failure")));
        }
        if self.started.swap(false, Ordering::SeqCst) {
            *self.stops.lock().await += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wskdebug_client::Exec;

    fn action() -> Action {
        Action::new("myaction", Exec::default())
    }

    #[tokio::test]
    async fn test_run_requires_start() {
        let runtime = MockRuntime::echo();
        let err = runtime.run(Params::new(), "a1").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotStarted));
    }

    #[tokio::test]
    async fn test_records_calls() {
        let runtime = MockRuntime::echo();
        runtime.start(&action()).await.unwrap();

        let params = json!({"input": 1}).as_object().cloned().unwrap();
        let result = runtime.run(params.clone(), "a1").await.unwrap();

        assert_eq!(result, json!({"input": 1}));
        assert_eq!(
            runtime.calls().await,
            vec![RunCall {
                activation_id: "a1".to_string(),
                params
            }]
        );
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let runtime = MockRuntime::echo();
        runtime.stop().await.unwrap();
        runtime.start(&action()).await.unwrap();
        runtime.stop().await.unwrap();
        runtime.stop().await.unwrap();
        assert_eq!(runtime.stops().await, 1);
    }
}
