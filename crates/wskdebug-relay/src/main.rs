// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! wskdebug - debug OpenWhisk actions locally
//!
//! Installs a forwarding agent in place of the action, runs activations in a
//! local container with a debugger attached, and restores the action on exit.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use wskdebug_client::{ClientConfig, OpenWhiskClient};
use wskdebug_relay::runtime::{ContainerRuntime, LaunchOverrides};
use wskdebug_relay::{DebugConfig, RelayError, Session, Transport, TunnelSetting};

#[derive(Debug, Parser)]
#[command(name = "wskdebug", version, about = "Debug OpenWhisk actions locally")]
struct Cli {
    /// Name of the action to debug
    action: String,

    /// Action kind to use for the local container, e.g. nodejs:10
    #[arg(long)]
    kind: Option<String>,

    /// Docker image to use as local container
    #[arg(long)]
    image: Option<String>,

    /// Debug port exposed on the host
    #[arg(long)]
    debug_port: Option<u16>,

    /// Container command that starts the action runtime with debugging enabled
    #[arg(long)]
    debug_command: Option<String>,

    /// Debug port inside the container, if different from --debug-port
    #[arg(long)]
    internal_port: Option<u16>,

    /// Timeout of the installed agent in seconds
    #[arg(short = 't', long)]
    agent_timeout: Option<u64>,

    /// Only debug activations whose parameters match, e.g. "input == 'debug'"
    #[arg(long)]
    condition: Option<String>,

    /// Forward activations through an ngrok tunnel instead of polling
    #[arg(long)]
    ngrok: bool,

    /// Address of the local ngrok agent API
    #[arg(long, value_name = "URL")]
    ngrok_api: Option<String>,

    /// Public URL already forwarding to the local tunnel bridge
    #[arg(long, value_name = "URL")]
    tunnel_url: Option<String>,

    /// Use the polling agent even if the platform supports concurrency
    #[arg(long)]
    no_concurrency: bool,

    /// Skip TLS certificate verification for the OpenWhisk API
    #[arg(long, env = "WSKDEBUG_IGNORE_CERTS")]
    ignore_certs: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, mut config: DebugConfig) -> DebugConfig {
        let launch = LaunchOverrides {
            kind: self.kind.or(config.launch.kind),
            image: self.image.or(config.launch.image),
            debug_port: self.debug_port.or(config.launch.debug_port),
            debug_command: self.debug_command.or(config.launch.debug_command),
            internal_port: self.internal_port.or(config.launch.internal_port),
        };
        config.launch = launch;

        if let Some(secs) = self.agent_timeout {
            config.agent_timeout = Duration::from_secs(secs);
        }
        if let Some(condition) = self.condition {
            config.condition = Some(condition);
        }
        if self.no_concurrency {
            config.transport = Transport::Polling;
        }
        if self.ngrok || self.tunnel_url.is_some() {
            config.transport = Transport::Tunnel;
        }
        if let Some(api) = self.ngrok_api {
            config.tunnel = TunnelSetting::Ngrok { api };
        }
        if let Some(url) = self.tunnel_url {
            config.tunnel = TunnelSetting::Url(url);
        }
        config.verbose |= self.verbose;
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if verbose {
                    "wskdebug_relay=debug,wskdebug_client=debug".into()
                } else {
                    "wskdebug_relay=info".into()
                }
            }),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if verbose {
                eprintln!("Error: {:?}", e);
            } else {
                eprintln!("Error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ignore_certs = cli.ignore_certs;
    let defaults = DebugConfig::from_env(cli.action.clone())?;
    let config = cli.apply(defaults);

    let credentials = ClientConfig::load()?.with_ignore_certs(ignore_certs);
    info!(api_host = %credentials.api_host, namespace = %credentials.namespace, "Using OpenWhisk");

    let client = Arc::new(OpenWhiskClient::new(credentials.clone())?);
    let runtime = Arc::new(ContainerRuntime::new(
        config.action.clone(),
        &credentials,
        config.launch.clone(),
    ));

    let started = std::time::Instant::now();
    let session = Arc::new(Session::new(config, client, runtime));

    // first signal ends the session, a second one exits without cleanup
    let cancel = session.cancel_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        cancel.cancel();
        shutdown_signal().await;
        warn!("Forced exit, the action may still have the agent installed");
        std::process::exit(130);
    });

    match session.start().await {
        Ok(()) => {}
        Err(RelayError::Interrupted) => return Ok(()),
        Err(e) => return Err(e.into()),
    }
    info!("Use CTRL+C to exit");

    let result = session.run().await;
    session.stop().await;
    info!(elapsed_s = started.elapsed().as_secs(), "Session ended");
    Ok(result?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
