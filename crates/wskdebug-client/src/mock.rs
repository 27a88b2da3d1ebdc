// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory platform for testing.
//!
//! Keeps actions and activation records in memory and executes actions through
//! [`ActionProgram`]s supplied by a factory. Programs are cached per action
//! revision, so concurrent invocations of an unchanged action share one
//! program instance the way activations share one container on the platform.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::client::ActionClient;
use crate::error::{ClientError, Result};
use crate::program::{ActionProgram, InvocationContext};
use crate::protocol::AgentFault;
use crate::types::{
    Action, Activation, ActivationResponse, ListActivationsOptions, Params, SystemInfo,
};

/// Maps a stored action to the program that executes it.
pub type ProgramFactory = Arc<dyn Fn(&Action) -> Option<Arc<dyn ActionProgram>> + Send + Sync>;

/// Mutating call recorded by [`MockPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Update(String),
    Delete(String),
}

/// [`ActionProgram`] backed by a closure, for user actions in tests.
pub struct FnProgram<F>(F);

impl<F> FnProgram<F>
where
    F: Fn(Params) -> std::result::Result<Value, AgentFault> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }

    /// Wrap a closure as a shareable program.
    pub fn shared(f: F) -> Arc<dyn ActionProgram> {
        Arc::new(Self(f))
    }
}

#[async_trait]
impl<F> ActionProgram for FnProgram<F>
where
    F: Fn(Params) -> std::result::Result<Value, AgentFault> + Send + Sync,
{
    async fn invoke(
        &self,
        params: Params,
        _ctx: InvocationContext,
    ) -> std::result::Result<Value, AgentFault> {
        (self.0)(params)
    }
}

#[derive(Default)]
struct State {
    actions: HashMap<String, Action>,
    revisions: HashMap<String, u64>,
    programs: HashMap<String, (u64, Arc<dyn ActionProgram>)>,
    activations: Vec<Activation>,
    mutations: Vec<Mutation>,
}

struct Inner {
    namespace: String,
    factory: ProgramFactory,
    concurrency: AtomicBool,
    blocking_window: Duration,
    revision: AtomicU64,
    state: Mutex<State>,
}

/// In-memory [`ActionClient`].
#[derive(Clone)]
pub struct MockPlatform {
    inner: Arc<Inner>,
}

impl MockPlatform {
    /// Create a platform whose actions are executed by `factory`.
    ///
    /// Concurrency support is reported, the blocking window is 60 seconds.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&Action) -> Option<Arc<dyn ActionProgram>> + Send + Sync + 'static,
    {
        Self::build(Arc::new(factory), "guest", true, Duration::from_secs(60))
    }

    /// Platform without the concurrency capability marker in its api docs.
    pub fn without_concurrency(self) -> Self {
        self.inner.concurrency.store(false, Ordering::SeqCst);
        self
    }

    /// Change the blocking invoke window. Must be called before first use.
    pub fn with_blocking_window(self, window: Duration) -> Self {
        let concurrency = self.inner.concurrency.load(Ordering::SeqCst);
        Self::build(
            self.inner.factory.clone(),
            &self.inner.namespace,
            concurrency,
            window,
        )
    }

    fn build(
        factory: ProgramFactory,
        namespace: &str,
        concurrency: bool,
        blocking_window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                namespace: namespace.to_string(),
                factory,
                concurrency: AtomicBool::new(concurrency),
                blocking_window,
                revision: AtomicU64::new(0),
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Store an action without recording a mutation (test setup).
    pub async fn insert_action(&self, action: Action) {
        let name = action.name.clone();
        let stored = self.stamp(&name, action);
        let mut state = self.inner.state.lock().await;
        state.revisions.insert(name.clone(), self.next_revision());
        state.actions.insert(name, stored);
    }

    /// Current definition of an action.
    pub async fn action(&self, name: &str) -> Option<Action> {
        self.inner.state.lock().await.actions.get(name).cloned()
    }

    /// Names of all stored actions, sorted.
    pub async fn action_names(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut names: Vec<String> = state.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// All mutations in call order.
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.inner.state.lock().await.mutations.clone()
    }

    /// All completed activation records in completion order.
    pub async fn activations(&self) -> Vec<Activation> {
        self.inner.state.lock().await.activations.clone()
    }

    fn next_revision(&self) -> u64 {
        self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn stamp(&self, name: &str, mut action: Action) -> Action {
        action.name = name.to_string();
        action.namespace = Some(self.inner.namespace.clone());
        action
    }

    /// Program for the current revision of an action, created on first use.
    async fn program(&self, name: &str) -> Result<(Action, Arc<dyn ActionProgram>)> {
        let mut state = self.inner.state.lock().await;
        let action = state
            .actions
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(name.to_string()))?;
        let revision = state.revisions.get(name).copied().unwrap_or_default();

        if let Some((cached, program)) = state.programs.get(name)
            && *cached == revision
        {
            return Ok((action, program.clone()));
        }

        let program = (self.inner.factory)(&action).ok_or_else(|| ClientError::Server {
            status: 502,
            message: format!("action {} has no executable program", name),
        })?;
        state
            .programs
            .insert(name.to_string(), (revision, program.clone()));
        Ok((action, program))
    }

    async fn execute(
        &self,
        action: Action,
        program: Arc<dyn ActionProgram>,
        params: Params,
        activation_id: String,
        start: i64,
    ) -> Activation {
        let ctx = InvocationContext {
            activation_id: activation_id.clone(),
            action_name: format!("/{}/{}", self.inner.namespace, action.name),
            namespace: self.inner.namespace.clone(),
            deadline: Utc::now()
                + chrono::Duration::from_std(action.timeout()).unwrap_or(chrono::Duration::zero()),
            client: Arc::new(self.clone()),
        };

        let mut merged = action.default_params();
        merged.extend(params);

        let response = match program.invoke(merged, ctx).await {
            Ok(result) => ActivationResponse {
                status: "success".to_string(),
                success: true,
                result: Some(result),
            },
            Err(fault) => ActivationResponse {
                status: "application error".to_string(),
                success: false,
                result: Some(fault.to_result()),
            },
        };

        let activation = Activation {
            activation_id,
            name: action.name.clone(),
            namespace: self.inner.namespace.clone(),
            start,
            end: Utc::now().timestamp_millis(),
            response: Some(response),
        };
        self.inner
            .state
            .lock()
            .await
            .activations
            .push(activation.clone());
        activation
    }
}

#[async_trait]
impl ActionClient for MockPlatform {
    async fn get_action(&self, name: &str) -> Result<Action> {
        self.action(name)
            .await
            .ok_or_else(|| ClientError::NotFound(name.to_string()))
    }

    async fn update_action(&self, name: &str, action: &Action) -> Result<Action> {
        let revision = self.next_revision();
        let mut stored = self.stamp(name, action.clone());
        stored.version = Some(format!("0.0.{}", revision));

        let mut state = self.inner.state.lock().await;
        state.revisions.insert(name.to_string(), revision);
        state.actions.insert(name.to_string(), stored.clone());
        state.mutations.push(Mutation::Update(name.to_string()));
        Ok(stored)
    }

    async fn delete_action(&self, name: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if state.actions.remove(name).is_some() {
            state.revisions.remove(name);
            state.programs.remove(name);
            state.mutations.push(Mutation::Delete(name.to_string()));
        }
        Ok(())
    }

    async fn invoke(&self, name: &str, params: Params, blocking: bool) -> Result<Activation> {
        let (action, program) = self.program(name).await?;
        let activation_id = uuid::Uuid::new_v4().simple().to_string();
        let start = Utc::now().timestamp_millis();

        let accepted = Activation {
            activation_id: activation_id.clone(),
            name: action.name.clone(),
            namespace: self.inner.namespace.clone(),
            start,
            ..Activation::default()
        };

        let platform = self.clone();
        let task = tokio::spawn(async move {
            platform
                .execute(action, program, params, activation_id, start)
                .await
        });

        if !blocking {
            return Ok(accepted);
        }

        let activation = match tokio::time::timeout(self.inner.blocking_window, task).await {
            Ok(Ok(activation)) => activation,
            Ok(Err(join_error)) => {
                return Err(ClientError::Server {
                    status: 500,
                    message: join_error.to_string(),
                });
            }
            // still running, the caller only gets the id
            Err(_) => return Ok(accepted),
        };

        match &activation.response {
            Some(response) if !response.success => Err(ClientError::Activation {
                activation_id: activation.activation_id.clone(),
                error: activation
                    .result()
                    .and_then(|r| r.get("error"))
                    .cloned()
                    .unwrap_or(Value::Null),
            }),
            _ => Ok(activation),
        }
    }

    async fn list_activations(&self, options: &ListActivationsOptions) -> Result<Vec<Activation>> {
        let state = self.inner.state.lock().await;
        let mut records: Vec<Activation> = state
            .activations
            .iter()
            .filter(|a| options.name.as_ref().is_none_or(|n| &a.name == n))
            .filter(|a| options.since.is_none_or(|since| a.start >= since))
            .cloned()
            .collect();

        // newest first, completion order breaks ties
        records.reverse();
        records.sort_by(|a, b| b.start.cmp(&a.start));
        records.truncate(options.limit.unwrap_or(30) as usize);

        if !options.docs {
            for record in &mut records {
                record.response = None;
            }
        }
        Ok(records)
    }

    async fn system_info(&self) -> Result<SystemInfo> {
        Ok(SystemInfo {
            api_version: "1.0.0".to_string(),
            build: "mock".to_string(),
            buildno: "0".to_string(),
            description: "in-memory platform".to_string(),
        })
    }

    async fn api_docs(&self) -> Result<Value> {
        let mut properties = json!({
            "timeout": {"type": "integer"},
            "memory": {"type": "integer"},
            "logs": {"type": "integer"},
        });
        if self.inner.concurrency.load(Ordering::SeqCst) {
            properties["concurrency"] = json!({"type": "integer"});
        }
        Ok(json!({
            "swagger": "2.0",
            "definitions": {
                "ActionLimits": {"properties": properties}
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Exec;

    fn echo_platform() -> MockPlatform {
        MockPlatform::new(|_action| Some(FnProgram::shared(|params| Ok(Value::Object(params)))))
    }

    fn action(name: &str) -> Action {
        Action::new(
            name,
            Exec {
                kind: "nodejs:10".to_string(),
                code: Some("function main(p) { return p; }".to_string()),
                ..Exec::default()
            },
        )
    }

    #[tokio::test]
    async fn test_blocking_invoke_merges_default_params() {
        let platform = echo_platform();
        let mut a = action("echo");
        a.set_parameter("fixed", "default");
        a.set_parameter("input", "default");
        platform.insert_action(a).await;

        let params = json!({"input": "caller"}).as_object().cloned().unwrap();
        let activation = platform.invoke("echo", params, true).await.unwrap();

        assert_eq!(
            activation.result().cloned().unwrap(),
            json!({"fixed": "default", "input": "caller"})
        );
    }

    #[tokio::test]
    async fn test_fault_becomes_activation_error() {
        let platform = MockPlatform::new(|_action| {
            Some(FnProgram::shared(|_params| Err(AgentFault::retry("nothing yet"))))
        });
        platform.insert_action(action("failing")).await;

        let err = platform.invoke("failing", Params::new(), true).await.unwrap_err();
        assert_eq!(err.fault_code(), Some(crate::protocol::CODE_RETRY));
    }

    #[tokio::test]
    async fn test_insert_is_not_a_mutation() {
        let platform = echo_platform();
        platform.insert_action(action("a")).await;
        platform.delete_action("missing").await.unwrap();
        assert!(platform.mutations().await.is_empty());

        platform.delete_action("a").await.unwrap();
        assert_eq!(platform.mutations().await, vec![Mutation::Delete("a".into())]);
    }

    #[tokio::test]
    async fn test_api_docs_capability_marker() {
        let with = echo_platform();
        let without = echo_platform().without_concurrency();

        let docs = with.api_docs().await.unwrap();
        assert!(docs.pointer("/definitions/ActionLimits/properties/concurrency").is_some());
        let docs = without.api_docs().await.unwrap();
        assert!(docs.pointer("/definitions/ActionLimits/properties/concurrency").is_none());
    }
}
