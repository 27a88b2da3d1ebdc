// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wskdebug relay
//!
//! Debug an OpenWhisk action on the local machine. A [`Session`] swaps the
//! deployed action for a forwarding agent, replays every activation the agent
//! captures against a local container with a debugger attached, and puts the
//! original action back when it ends.
//!
//! ```text
//!   caller ──invoke──► agent (remote) ──┬─ $waitForActivation ──┐
//!                                       ├─ helper activation log ┼──► ActivationRelay ─┐
//!                                       └─ POST over tunnel ─────┴──► TunnelBridge ────┤
//!                                                                                       ▼
//!                                                              Dispatcher ─► LocalRuntime
//! ```
//!
//! - [`agent_manager`]: backup, agent install, crash recovery and restore.
//! - [`relay`]: transport loops and the single-flight [`Dispatcher`](relay::Dispatcher).
//! - [`bridge`] / [`tunnel`]: the tunnel transport.
//! - [`runtime`]: the local sandbox, docker-backed or mocked.

pub mod agent_manager;
pub mod bridge;
pub mod config;
pub mod error;
pub mod fence;
pub mod relay;
pub mod runtime;
pub mod session;
pub mod tunnel;

pub use agent_manager::{AgentManager, AgentState};
pub use config::{DebugConfig, Transport, TunnelSetting};
pub use error::{RelayError, Result};
pub use session::{Phase, Session};
