// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for wskdebug-client.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::AgentFault;

/// Result type using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors from the platform API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The request could not be sent or the connection failed.
    #[error("http error: {0}")]
    Http(String),

    /// The entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials were rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Platform returned an error status.
    #[error("server error [{status}]: {message}")]
    Server { status: u16, message: String },

    /// The invoked action completed with an application error.
    #[error("activation {activation_id} failed: {error}")]
    Activation { activation_id: String, error: Value },

    /// Response did not have the expected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// Agent fault carried by an application error, if any.
    pub fn fault(&self) -> Option<AgentFault> {
        match self {
            ClientError::Activation { error, .. } => {
                AgentFault::from_result(&serde_json::json!({ "error": error }))
            }
            _ => None,
        }
    }

    /// Numeric fault code carried by an application error.
    pub fn fault_code(&self) -> Option<i64> {
        self.fault().and_then(|fault| fault.code)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Serialization(err.to_string())
        } else {
            ClientError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<crate::config::ConfigError> for ClientError {
    fn from(err: crate::config::ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}

/// Agents surface every client failure as a fault.
///
/// Application errors of nested invocations keep their original code.
impl From<ClientError> for AgentFault {
    fn from(err: ClientError) -> Self {
        err.fault().unwrap_or_else(|| AgentFault::new(err.to_string()))
    }
}
