// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local runtime trait definitions.
//!
//! A local runtime is the debug sandbox activations are replayed against.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use wskdebug_client::{Action, Params};

/// Errors from local runtime operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// The container engine is not available.
    #[error("Docker not running on local system. A local docker environment is required for the debugger.")]
    DockerUnavailable,

    /// The action kind has no known image.
    #[error("{0}")]
    UnsupportedKind(String),

    /// No debug port known for the kind.
    #[error("No debug port known for kind: {0}. Please specify --debug-port.")]
    MissingDebugPort(String),

    /// No debug command known for the kind.
    #[error("No debug command known for kind: {0}. Please specify --debug-command.")]
    MissingDebugCommand(String),

    /// Sandbox failed to start.
    #[error("Failed to start local runtime: {0}")]
    StartFailed(String),

    /// Code push was rejected or timed out.
    #[error("Failed to initialize local runtime: {0}")]
    InitFailed(String),

    /// An activation could not be executed.
    #[error("Local activation failed: {0}")]
    RunFailed(String),

    /// The sandbox could not be stopped.
    #[error("Failed to stop local runtime: {0}")]
    StopFailed(String),

    /// `run` or `init` before `start`.
    #[error("Local runtime is not started")]
    NotStarted,

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Errors that must stop a session before it starts running.
    pub fn is_setup_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::DockerUnavailable
                | RuntimeError::UnsupportedKind(_)
                | RuntimeError::MissingDebugPort(_)
                | RuntimeError::MissingDebugCommand(_)
        )
    }
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Debug sandbox executing one activation at a time.
///
/// Implementations are shared between the relay loop and the tunnel bridge,
/// so all methods take `&self`.
#[async_trait]
pub trait LocalRuntime: Send + Sync {
    /// Runtime type identifier (e.g., "docker", "mock").
    fn runtime_type(&self) -> &'static str;

    /// Start the sandbox for an action.
    async fn start(&self, action: &Action) -> Result<()>;

    /// Push the action code into the started sandbox.
    async fn init(&self, action: &Action) -> Result<()>;

    /// Execute one activation and return the action result.
    ///
    /// Application errors of the action are results (`{"error": ...}`), not
    /// runtime errors.
    async fn run(&self, params: Params, activation_id: &str) -> Result<Value>;

    /// Stop the sandbox. Stopping a sandbox that never started is a no-op.
    async fn stop(&self) -> Result<()>;
}
