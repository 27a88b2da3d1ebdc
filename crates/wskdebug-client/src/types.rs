// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Action and activation records as exchanged with the platform.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Invocation parameters and action results: a JSON object.
pub type Params = Map<String, Value>;

/// Default action timeout when the record carries no limit.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default action memory in megabytes when the record carries no limit.
pub const DEFAULT_MEMORY_MB: u64 = 256;

/// Ordered key/value pair used for parameters and annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Executable payload of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exec {
    /// Runtime kind such as `nodejs:10` or `blackbox`.
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Container image for `blackbox` actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    /// Whether `code` is base64 encoded (zip or binary).
    #[serde(default)]
    pub binary: bool,
}

/// Resource limits of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    /// Timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Memory in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<u64>,
    /// Concurrent activations per container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<u32>,
}

/// A deployed action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<bool>,
    #[serde(default)]
    pub exec: Exec,
    #[serde(default)]
    pub annotations: Vec<KeyValue>,
    #[serde(default)]
    pub parameters: Vec<KeyValue>,
    #[serde(default)]
    pub limits: Limits,
}

impl Action {
    /// Create an action with the given name and exec, without annotations or parameters.
    pub fn new(name: impl Into<String>, exec: Exec) -> Self {
        Self {
            name: name.into(),
            exec,
            ..Self::default()
        }
    }

    /// Look up an annotation value.
    pub fn annotation(&self, key: &str) -> Option<&Value> {
        self.annotations.iter().find(|kv| kv.key == key).map(|kv| &kv.value)
    }

    /// Set an annotation, replacing an existing one with the same key.
    pub fn set_annotation(&mut self, key: &str, value: impl Into<Value>) {
        set_key(&mut self.annotations, key, value.into());
    }

    /// Look up a default parameter value.
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.iter().find(|kv| kv.key == key).map(|kv| &kv.value)
    }

    /// Set a default parameter, replacing an existing one with the same key.
    pub fn set_parameter(&mut self, key: &str, value: impl Into<Value>) {
        set_key(&mut self.parameters, key, value.into());
    }

    /// Default parameters as a JSON object, later entries winning.
    pub fn default_params(&self) -> Params {
        self.parameters
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect()
    }

    /// Effective timeout.
    pub fn timeout(&self) -> Duration {
        self.limits
            .timeout
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    /// Effective memory limit in megabytes.
    pub fn memory_mb(&self) -> u64 {
        self.limits.memory.unwrap_or(DEFAULT_MEMORY_MB)
    }
}

fn set_key(list: &mut Vec<KeyValue>, key: &str, value: Value) {
    match list.iter_mut().find(|kv| kv.key == key) {
        Some(existing) => existing.value = value,
        None => list.push(KeyValue::new(key, value)),
    }
}

/// Response section of an activation record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

/// An activation record.
///
/// A blocking invoke that outlives the platform's blocking window comes back
/// with only an id; `response` is `None` in that case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    #[serde(default)]
    pub activation_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Start time, epoch milliseconds.
    #[serde(default)]
    pub start: i64,
    /// End time, epoch milliseconds.
    #[serde(default)]
    pub end: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ActivationResponse>,
}

impl Activation {
    /// Result payload, if the record carries one.
    pub fn result(&self) -> Option<&Value> {
        self.response.as_ref().and_then(|r| r.result.as_ref())
    }

    /// Result payload as a JSON object.
    pub fn result_params(&self) -> Option<Params> {
        match self.result()? {
            Value::Object(map) => Some(map.clone()),
            _ => None,
        }
    }
}

/// Filter for listing activations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListActivationsOptions {
    /// Only activations of this action.
    pub name: Option<String>,
    /// Only activations started at or after this epoch millisecond.
    pub since: Option<i64>,
    pub limit: Option<u32>,
    /// Include full records (results) instead of ids only.
    pub docs: bool,
}

impl ListActivationsOptions {
    pub fn for_action(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_docs(mut self) -> Self {
        self.docs = true;
        self
    }
}

/// Platform self description served at `/api/v1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub buildno: String,
    #[serde(default)]
    pub description: String,
}
