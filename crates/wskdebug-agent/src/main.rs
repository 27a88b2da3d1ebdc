// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wskdebug agent runtime
//!
//! Serves the action runtime protocol on port 8080 inside the agent image.

use std::net::SocketAddr;

use tracing::info;

use wskdebug_agent::server::{AppState, router};

const RUNTIME_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wskdebug_agent=info".into()),
        )
        .init();

    let addr = SocketAddr::from(([0, 0, 0, 0], RUNTIME_PORT));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Agent runtime listening");

    axum::serve(listener, router(AppState::new()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    info!("Agent runtime shut down");
    Ok(())
}
