// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for wskdebug-relay.

use thiserror::Error;

use wskdebug_client::ClientError;

use crate::config::ConfigError;
use crate::runtime::RuntimeError;

/// Result type using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors of a debug session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RelayError {
    /// Platform API call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Local runtime failed after setup.
    #[error(transparent)]
    Runtime(RuntimeError),

    /// Invalid relay configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The action to debug does not exist.
    #[error("Action not found: {0}")]
    ActionNotFound(String),

    /// An agent is installed but the original cannot be recovered.
    #[error("{action} is an agent, but {reason}. Please redeploy the action first.")]
    BrokenBackup { action: String, reason: String },

    /// No local image for the action kind.
    #[error("{0}")]
    UnsupportedKind(String),

    #[error("No debug port known for kind: {0}. Please specify --debug-port.")]
    MissingDebugPort(String),

    #[error("No debug command known for kind: {0}. Please specify --debug-command.")]
    MissingDebugCommand(String),

    #[error("Docker not running on local system. A local docker environment is required for the debugger.")]
    DockerUnavailable,

    /// The hit condition does not parse.
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// Tunnel bridge listener failed.
    #[error("Tunnel bridge error: {0}")]
    Bridge(String),

    /// Public tunnel could not be opened or closed.
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// The agent answered the activation poll with something unexpected.
    #[error("Unexpected error while polling agent for activation: {0}")]
    UnexpectedActivation(String),

    /// Shutdown was requested before the session was ready.
    #[error("Interrupted before the debug session was ready")]
    Interrupted,

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Errors raised before the session runs, never retried.
    pub fn is_setup_fatal(&self) -> bool {
        matches!(
            self,
            RelayError::ActionNotFound(_)
                | RelayError::BrokenBackup { .. }
                | RelayError::UnsupportedKind(_)
                | RelayError::MissingDebugPort(_)
                | RelayError::MissingDebugCommand(_)
                | RelayError::DockerUnavailable
                | RelayError::InvalidCondition(_)
        )
    }
}

impl From<RuntimeError> for RelayError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::DockerUnavailable => RelayError::DockerUnavailable,
            RuntimeError::UnsupportedKind(message) => RelayError::UnsupportedKind(message),
            RuntimeError::MissingDebugPort(kind) => RelayError::MissingDebugPort(kind),
            RuntimeError::MissingDebugCommand(kind) => RelayError::MissingDebugCommand(kind),
            other => RelayError::Runtime(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_setup_errors_keep_their_kind() {
        let err: RelayError = RuntimeError::MissingDebugPort("python:3".to_string()).into();
        assert!(matches!(err, RelayError::MissingDebugPort(_)));
        assert!(err.is_setup_fatal());

        let err: RelayError = RuntimeError::RunFailed("connection reset".to_string()).into();
        assert!(matches!(err, RelayError::Runtime(_)));
        assert!(!err.is_setup_fatal());
    }

    #[test]
    fn test_broken_backup_names_remedy() {
        let err = RelayError::BrokenBackup {
            action: "myaction".to_string(),
            reason: "its backup myaction_wskdebug_original is missing".to_string(),
        };
        assert!(err.to_string().contains("redeploy the action first"));
    }
}
