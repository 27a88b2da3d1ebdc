// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Agent protocol vocabulary.
//!
//! Reserved parameter keys, fault codes and derived action names shared by the
//! relay and the agent programs. Reserved keys never reach the local runtime
//! and never reach the original caller.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::Params;

/// Id of the activation being forwarded, attached by the agent and echoed back with the result.
pub const ACTIVATION_ID: &str = "$activationId";
/// Relay asks the concurrent agent for the next queued activation.
pub const WAIT_FOR_ACTIVATION: &str = "$waitForActivation";
/// Hit condition evaluated by the agent before forwarding.
pub const CONDITION: &str = "$condition";
/// Public tunnel URL the tunnel agent posts to.
pub const NGROK_URL: &str = "$ngrokUrl";
/// Shared secret the tunnel agent sends as `authorization` header.
pub const NGROK_AUTH: &str = "$ngrokAuth";
/// Relay tells the concurrent agent to release waiting pollers.
pub const SHUTDOWN: &str = "$shutdown";

/// All keys stripped before parameters reach the local runtime or a caller.
pub const RESERVED_KEYS: [&str; 6] = [
    ACTIVATION_ID,
    WAIT_FOR_ACTIVATION,
    CONDITION,
    NGROK_URL,
    NGROK_AUTH,
    SHUTDOWN,
];

/// No activation arrived within the blocking window; poll again.
pub const CODE_RETRY: i64 = 42;
/// The agent is shutting down; stop polling.
pub const CODE_SHUTDOWN: i64 = 43;

/// Annotation marking an action as an installed agent (`true`).
pub const AGENT_ANNOTATION: &str = "wskdebug";
/// Annotation naming the installed agent variant.
pub const AGENT_VARIANT_ANNOTATION: &str = "wskdebug-agent";
/// Free text annotation, also used by older debugger versions to mark agents.
pub const DESCRIPTION_ANNOTATION: &str = "description";
/// Description prefix written by every debugger version.
pub const LEGACY_DESCRIPTION_PREFIX: &str = "wskdebug agent.";

/// Name of the backup holding the original action while an agent is installed.
pub fn backup_name(action: &str) -> String {
    format!("{}_wskdebug_original", action)
}

/// Echo helper the polling agent drops new activations into.
pub fn invoked_helper_name(action: &str) -> String {
    format!("{}_wskdebug_invoked", action)
}

/// Echo helper the relay drops completed results into.
pub fn completed_helper_name(action: &str) -> String {
    format!("{}_wskdebug_completed", action)
}

/// Remove and return the activation id.
///
/// Numeric ids are accepted and rendered as strings.
pub fn take_activation_id(params: &mut Params) -> Option<String> {
    match params.remove(ACTIVATION_ID)? {
        Value::String(id) => Some(id),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Activation id without removing it.
pub fn activation_id(params: &Params) -> Option<String> {
    match params.get(ACTIVATION_ID)? {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Remove every reserved key.
pub fn strip_reserved(params: &mut Params) {
    for key in RESERVED_KEYS {
        params.remove(key);
    }
}

/// Whether a reserved flag is set to a truthy value.
pub fn flag(params: &Params, key: &str) -> bool {
    match params.get(key) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(_) => true,
    }
}

/// The only error shape that crosses the agent boundary.
///
/// The platform rejects non-serializable error values, so every failure inside
/// an agent is reduced to a message and an optional numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{error}")]
pub struct AgentFault {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl AgentFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: None,
        }
    }

    /// Fault carrying [`CODE_RETRY`].
    pub fn retry(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: Some(CODE_RETRY),
        }
    }

    /// Fault carrying [`CODE_SHUTDOWN`].
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: Some(CODE_SHUTDOWN),
        }
    }

    pub fn is_retry(&self) -> bool {
        self.code == Some(CODE_RETRY)
    }

    pub fn is_shutdown(&self) -> bool {
        self.code == Some(CODE_SHUTDOWN)
    }

    /// Action result the platform treats as an application error.
    pub fn to_result(&self) -> Value {
        json!({ "error": self })
    }

    /// Read a fault from an action result's `error` field.
    ///
    /// Accepts both `{"error": {"error": msg, "code": n}}` and `{"error": msg}`.
    pub fn from_result(result: &Value) -> Option<Self> {
        match result.get("error")? {
            Value::String(message) => Some(Self::new(message.clone())),
            error @ Value::Object(_) => {
                let message = match error.get("error") {
                    Some(Value::String(message)) => message.clone(),
                    Some(other) => other.to_string(),
                    None => error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                };
                Some(Self {
                    error: message,
                    code: error.get("code").and_then(Value::as_i64),
                })
            }
            other => Some(Self::new(other.to_string())),
        }
    }
}
