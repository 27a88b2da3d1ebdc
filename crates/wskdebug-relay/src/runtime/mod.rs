// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local runtime abstraction.
//!
//! Provides a unified interface for the debug sandbox activations are replayed
//! against. The docker implementation starts the action's runtime image with a
//! debugger attached; the mock is used in tests.

mod container;
pub mod kinds;
pub mod mock;
mod traits;

pub use container::{ContainerRuntime, LaunchOverrides, LaunchPlan, RUNTIME_PORT, resolve_launch};
pub use traits::*;
