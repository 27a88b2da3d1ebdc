// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for a debug session.
//!
//! Settings come from `WSKDEBUG_*` environment variables and are overridden by
//! command line flags. Platform credentials live in
//! [`ClientConfig`](wskdebug_client::ClientConfig).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use wskdebug_agent::config::DEFAULT_AGENT_IMAGE;

use crate::runtime::LaunchOverrides;

/// Agent timeout when none is configured.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(300);
/// Interval between reads of the polling helper's activation log.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Pause before the next poll after a retry answer.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);
/// Local ngrok agent API.
pub const DEFAULT_NGROK_API: &str = "http://127.0.0.1:4040";

/// How activations travel from the agent to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Concurrent agent if the platform supports it, polling agent otherwise.
    #[default]
    Auto,
    /// Always the polling agent.
    Polling,
    /// Tunnel agent posting to the local bridge.
    Tunnel,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Auto => "auto",
            Transport::Polling => "polling",
            Transport::Tunnel => "tunnel",
        })
    }
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Transport::Auto),
            "polling" => Ok(Transport::Polling),
            "tunnel" | "ngrok" => Ok(Transport::Tunnel),
            _ => Err(ConfigError::InvalidValue {
                name: "WSKDEBUG_TRANSPORT",
                value: s.to_string(),
            }),
        }
    }
}

/// Where the public tunnel endpoint comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelSetting {
    /// Open a tunnel through a local ngrok agent API.
    Ngrok { api: String },
    /// A public URL already forwarding to the bridge port.
    Url(String),
}

impl Default for TunnelSetting {
    fn default() -> Self {
        TunnelSetting::Ngrok {
            api: DEFAULT_NGROK_API.to_string(),
        }
    }
}

/// Settings of one debug session.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Name of the action to debug, optionally `package/action`.
    pub action: String,
    /// Timeout of the installed agent action.
    pub agent_timeout: Duration,
    /// Runtime image of the agent action.
    pub agent_image: String,
    pub transport: Transport,
    pub tunnel: TunnelSetting,
    pub poll_interval: Duration,
    pub retry_backoff: Duration,
    /// Only forward activations whose parameters satisfy this expression.
    pub condition: Option<String>,
    /// Local container settings.
    pub launch: LaunchOverrides,
    pub verbose: bool,
}

impl DebugConfig {
    /// Defaults for an action.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
            agent_image: DEFAULT_AGENT_IMAGE.to_string(),
            transport: Transport::Auto,
            tunnel: TunnelSetting::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            condition: None,
            launch: LaunchOverrides::default(),
            verbose: false,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env(action: impl Into<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(action, |name| std::env::var(name).ok())
    }

    /// Load configuration using an explicit environment lookup.
    pub fn from_lookup(
        action: impl Into<String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::new(action);

        if let Some(secs) = var("WSKDEBUG_AGENT_TIMEOUT") {
            config.agent_timeout = Duration::from_secs(parse("WSKDEBUG_AGENT_TIMEOUT", &secs)?);
        }
        if let Some(image) = var("WSKDEBUG_AGENT_IMAGE") {
            config.agent_image = image;
        }
        if let Some(transport) = var("WSKDEBUG_TRANSPORT") {
            config.transport = transport.parse()?;
        }
        if let Some(millis) = var("WSKDEBUG_POLL_INTERVAL_MS") {
            config.poll_interval =
                Duration::from_millis(parse("WSKDEBUG_POLL_INTERVAL_MS", &millis)?);
        }
        if let Some(millis) = var("WSKDEBUG_RETRY_BACKOFF_MS") {
            config.retry_backoff =
                Duration::from_millis(parse("WSKDEBUG_RETRY_BACKOFF_MS", &millis)?);
        }
        config.condition = var("WSKDEBUG_CONDITION");

        config.launch = LaunchOverrides {
            kind: var("WSKDEBUG_KIND"),
            image: var("WSKDEBUG_IMAGE"),
            debug_port: var("WSKDEBUG_DEBUG_PORT")
                .map(|v| parse("WSKDEBUG_DEBUG_PORT", &v))
                .transpose()?,
            debug_command: var("WSKDEBUG_DEBUG_COMMAND"),
            internal_port: var("WSKDEBUG_INTERNAL_PORT")
                .map(|v| parse("WSKDEBUG_INTERNAL_PORT", &v))
                .transpose()?,
        };

        if let Some(url) = var("WSKDEBUG_TUNNEL_URL") {
            config.tunnel = TunnelSetting::Url(url);
        } else if let Some(api) = var("WSKDEBUG_NGROK_API") {
            config.tunnel = TunnelSetting::Ngrok { api };
        }

        config.verbose = var("WSKDEBUG_VERBOSE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(config)
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_tunnel(mut self, tunnel: TunnelSetting) -> Self {
        self.tunnel = tunnel;
        self
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_launch(mut self, launch: LaunchOverrides) -> Self {
        self.launch = launch;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable has a value that does not parse.
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
