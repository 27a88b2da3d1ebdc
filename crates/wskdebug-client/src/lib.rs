// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wskdebug client
//!
//! Typed access to the OpenWhisk action and activation management API, plus the
//! small vocabulary shared by the debugger and the agent it installs remotely.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐          ┌──────────────────────────────────────┐
//! │   wskdebug-relay     │          │          OpenWhisk platform          │
//! │  (developer laptop)  │  REST    │  ┌────────────┐     ┌──────────────┐ │
//! │                      ├─────────►│  │  actions   │     │ activations  │ │
//! │   ActionClient ──────┤          │  └─────┬──────┘     └──────▲───────┘ │
//! └──────────────────────┘          │        │ invoke            │ log     │
//!                                   │  ┌─────▼───────────────────┴──────┐  │
//!                                   │  │ wskdebug-agent (ActionProgram) │  │
//!                                   │  └────────────────────────────────┘  │
//!                                   └──────────────────────────────────────┘
//! ```
//!
//! - [`ActionClient`] is the seam every remote call goes through. [`OpenWhiskClient`]
//!   talks REST, [`mock::MockPlatform`] keeps everything in memory.
//! - [`ActionProgram`] is the contract for code that runs *as* an action. The agent
//!   variants implement it and the mock platform executes it.
//! - [`protocol`] holds the reserved `$`-keys and fault codes that cross the agent boundary.
//!
//! # Example
//!
//! ```no_run
//! use wskdebug_client::{ActionClient, OpenWhiskClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OpenWhiskClient::from_env()?;
//! let action = client.get_action("myaction").await?;
//! println!("{} is a {} action", action.name, action.exec.kind);
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
pub mod mock;
mod program;
pub mod protocol;
mod types;

pub use client::{ActionClient, OpenWhiskClient};
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, Result};
pub use program::{ActionProgram, InvocationContext};
pub use protocol::AgentFault;
pub use types::{
    Action, Activation, ActivationResponse, DEFAULT_MEMORY_MB, DEFAULT_TIMEOUT, Exec, KeyValue,
    Limits, ListActivationsOptions, Params, SystemInfo,
};
