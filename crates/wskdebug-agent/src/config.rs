// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Agent configuration carried in the action's `exec.code`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default image of the agent runtime.
pub const DEFAULT_AGENT_IMAGE: &str = "wskdebug/agent:latest";

/// Transport variant of an installed agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentVariant {
    /// Shared in-process queue, requires concurrent activations per container.
    Concurrent,
    /// Helper actions as durable drops, one activation per container.
    Polling,
    /// Forwards each activation over HTTP to a public tunnel URL.
    Tunnel,
    /// Returns its parameters; installed as the polling helpers.
    Echo,
}

impl AgentVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentVariant::Concurrent => "concurrent",
            AgentVariant::Polling => "polling",
            AgentVariant::Tunnel => "tunnel",
            AgentVariant::Echo => "echo",
        }
    }

    /// Container concurrency limit the variant needs.
    pub fn concurrency(&self) -> u32 {
        match self {
            AgentVariant::Concurrent => 200,
            _ => 1,
        }
    }
}

impl fmt::Display for AgentVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "concurrent" => Ok(AgentVariant::Concurrent),
            "polling" => Ok(AgentVariant::Polling),
            "tunnel" | "ngrok" => Ok(AgentVariant::Tunnel),
            "echo" => Ok(AgentVariant::Echo),
            other => Err(format!("unknown agent variant: {}", other)),
        }
    }
}

/// Document stored as the agent action's code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub variant: AgentVariant,
}

impl AgentConfig {
    pub fn new(variant: AgentVariant) -> Self {
        Self { variant }
    }

    /// Serialize for `exec.code`.
    pub fn to_code(&self) -> String {
        serde_json::json!({ "variant": self.variant }).to_string()
    }

    /// Parse from `exec.code`.
    pub fn from_code(code: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(code)
    }
}
