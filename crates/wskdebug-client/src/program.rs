// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Contract for code that runs as an action on the platform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::client::ActionClient;
use crate::protocol::AgentFault;
use crate::types::Params;

/// Per-activation environment handed to an [`ActionProgram`].
#[derive(Clone)]
pub struct InvocationContext {
    /// Platform-assigned activation id.
    pub activation_id: String,
    /// Fully qualified action name (`/namespace/package/action`).
    pub action_name: String,
    pub namespace: String,
    /// Hard deadline after which the platform kills the activation.
    pub deadline: DateTime<Utc>,
    /// Client bound to the invoking subject's credentials.
    pub client: Arc<dyn ActionClient>,
}

impl InvocationContext {
    /// Action name relative to the namespace, usable with [`ActionClient`] calls.
    pub fn base_action_name(&self) -> &str {
        let prefix = format!("/{}/", self.namespace);
        self.action_name
            .strip_prefix(prefix.as_str())
            .unwrap_or_else(|| self.action_name.trim_start_matches('/'))
    }

    /// Time left until `deadline - margin`, zero if already past.
    pub fn remaining(&self, margin: Duration) -> Duration {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        (self.deadline - margin - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether `deadline - margin` has passed.
    pub fn out_of_time(&self, margin: Duration) -> bool {
        self.remaining(margin).is_zero()
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("activation_id", &self.activation_id)
            .field("action_name", &self.action_name)
            .field("namespace", &self.namespace)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Code executed for each activation of an action.
///
/// Implementations must not leak raw errors: everything is reduced to an
/// [`AgentFault`] before it reaches the platform.
#[async_trait]
pub trait ActionProgram: Send + Sync {
    async fn invoke(&self, params: Params, ctx: InvocationContext) -> Result<Value, AgentFault>;
}
