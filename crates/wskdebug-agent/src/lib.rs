// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wskdebug agent
//!
//! The programs installed in place of a debugged action. Every variant
//! implements [`ActionProgram`] and satisfies the same contract toward the
//! caller: the activation is either forwarded to the debugger or passed through
//! to the original action saved as `<name>_wskdebug_original`.
//!
//! | Variant | Transport |
//! |---|---|
//! | [`ConcurrentAgent`] | in-process queue shared by concurrent activations |
//! | [`PollingAgent`] | `_wskdebug_invoked` / `_wskdebug_completed` echo helpers |
//! | [`TunnelAgent`] | HTTP POST to the debugger's public tunnel URL |
//! | [`EchoAgent`] | returns its parameters (helper actions) |
//!
//! Agents never return raw errors; every failure leaves as an
//! [`AgentFault`](wskdebug_client::AgentFault).
//!
//! The [`server`] module serves a program through the action runtime protocol
//! so the agent can be deployed as a blackbox image.

use std::sync::Arc;

use wskdebug_client::{Action, ActionProgram};

pub mod concurrent;
pub mod condition;
pub mod config;
pub mod dispatch;
pub mod echo;
pub mod polling;
pub mod server;
pub mod tunnel;

pub use concurrent::ConcurrentAgent;
pub use condition::{Condition, ConditionError};
pub use config::{AgentConfig, AgentVariant, DEFAULT_AGENT_IMAGE};
pub use echo::EchoAgent;
pub use polling::PollingAgent;
pub use tunnel::TunnelAgent;

/// Create the program for an agent configuration.
pub fn program_for(config: &AgentConfig) -> Arc<dyn ActionProgram> {
    match config.variant {
        AgentVariant::Concurrent => Arc::new(ConcurrentAgent::new()),
        AgentVariant::Polling => Arc::new(PollingAgent::new()),
        AgentVariant::Tunnel => Arc::new(TunnelAgent::new()),
        AgentVariant::Echo => Arc::new(EchoAgent),
    }
}

/// Agent configuration of a deployed action, if it runs the agent runtime.
pub fn agent_config(action: &Action) -> Option<AgentConfig> {
    if action.exec.kind != "blackbox" {
        return None;
    }
    AgentConfig::from_code(action.exec.code.as_deref()?).ok()
}
