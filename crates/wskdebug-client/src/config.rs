// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Platform credentials and connection settings.
//!
//! Credentials come from a wskprops file (`KEY=VALUE` lines) and are overridden
//! by `OW_*` environment variables, the same precedence the `wsk` CLI uses.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables that override wskprops entries.
pub const ENV_PARAMS: [&str; 4] = ["OW_APIHOST", "OW_AUTH", "OW_NAMESPACE", "OW_APIGW_ACCESS_TOKEN"];

/// Namespace placeholder resolved by the platform to the subject's default namespace.
pub const DEFAULT_NAMESPACE: &str = "_";

/// Connection settings for [`OpenWhiskClient`](crate::OpenWhiskClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API host, with or without scheme (`https://` is assumed).
    pub api_host: String,
    /// Basic auth credentials in `user:password` form.
    pub auth: Option<String>,
    /// Namespace used for action and activation paths.
    pub namespace: String,
    /// API gateway token, passed through to the local runtime.
    pub apigw_access_token: Option<String>,
    /// Accept invalid TLS certificates (local deployments).
    pub ignore_certs: bool,
    /// Upper bound for a single HTTP request, including blocking invokes.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for an API host and optional credentials.
    pub fn new(api_host: impl Into<String>, auth: Option<String>) -> Self {
        Self {
            api_host: api_host.into(),
            auth,
            namespace: DEFAULT_NAMESPACE.to_string(),
            apigw_access_token: None,
            ignore_certs: false,
            request_timeout: Duration::from_secs(330),
        }
    }

    /// Load from the wskprops file and `OW_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load using an explicit environment lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let props = match props_path(&env) {
            Some(path) if path.exists() => Some(
                std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::Read(path.display().to_string(), e.to_string()))?,
            ),
            _ => None,
        };
        Self::from_sources(props.as_deref(), env)
    }

    /// Build from wskprops text and an environment lookup.
    ///
    /// Environment values win over file values.
    pub fn from_sources(
        props: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut values = props.map(parse_wskprops).unwrap_or_default();

        for name in ENV_PARAMS {
            if let Some(value) = env(name).filter(|v| !v.is_empty()) {
                values.insert(name[3..].to_lowercase(), value);
            }
        }

        let api_host = values
            .remove("apihost")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiHost)?;

        let mut config = Self::new(api_host, values.remove("auth"));
        if let Some(namespace) = values.remove("namespace").filter(|v| !v.is_empty()) {
            config.namespace = namespace;
        }
        config.apigw_access_token = values.remove("apigw_access_token");
        Ok(config)
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Enable or disable TLS certificate verification skipping.
    pub fn with_ignore_certs(mut self, ignore: bool) -> Self {
        self.ignore_certs = ignore;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// API host as a base URL with scheme and without trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.api_host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        }
    }

    /// Split basic auth credentials into user and password.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let auth = self.auth.as_deref()?;
        Some(auth.split_once(':').unwrap_or((auth, "")))
    }
}

/// Location of the wskprops file: `$WSK_CONFIG_FILE` or `~/.wskprops`.
pub fn props_path(env: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    env("WSK_CONFIG_FILE")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".wskprops")))
}

/// Parse wskprops text into lower-cased keys.
pub fn parse_wskprops(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_lowercase(), value.trim().to_string()))
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No API host in wskprops or environment.
    #[error("Missing OpenWhisk API host: set APIHOST in .wskprops or OW_APIHOST")]
    MissingApiHost,
    /// The wskprops file exists but could not be read.
    #[error("Failed to read {0}: {1}")]
    Read(String, String),
}
