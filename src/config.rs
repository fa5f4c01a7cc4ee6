//! Configuration management for DeckBridge
//!
//! Loads the YAML configuration file. Every field has a default, so a missing
//! file or an empty `obs:` section still yields a usable configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::dispatcher::CommandPolicy;
use crate::protocol::{Credentials, EventSubscription};
use crate::supervisor::SupervisorConfig;
use crate::transport::Endpoint;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub obs: ObsConfig,
}

/// OBS WebSocket connection and retry settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObsConfig {
    #[serde(default = "default_obs_host")]
    pub host: String,
    #[serde(default = "default_obs_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Connection attempts at startup before giving up
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub probe_interval_ms: u64,
    /// Delay between reconnection attempts after a lost session
    #[serde(default = "default_interval_ms")]
    pub reconnect_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Re-sends of an unanswered idempotent command
    #[serde(default = "default_command_retries")]
    pub command_retries: u32,
    #[serde(default = "default_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            host: default_obs_host(),
            port: default_obs_port(),
            password: None,
            probe_attempts: default_probe_attempts(),
            probe_interval_ms: default_interval_ms(),
            reconnect_interval_ms: default_interval_ms(),
            request_timeout_ms: default_timeout_ms(),
            command_retries: default_command_retries(),
            handshake_timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        // An empty file parses as null
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))
    }

    /// Load, falling back to defaults when the file does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }
}

impl ObsConfig {
    /// Validate configuration for correctness
    pub fn validate(&self) -> Result<()> {
        self.supervisor()
            .validate()
            .map_err(|reason| anyhow::anyhow!("obs: {}", reason))?;
        if self.request_timeout_ms == 0 {
            anyhow::bail!("obs: request_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            endpoint: self.endpoint(),
            credentials: Credentials::new(self.password.clone()),
            subscriptions: EventSubscription::ROUTED,
            probe_attempts: self.probe_attempts,
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
        }
    }

    pub fn command_policy(&self) -> CommandPolicy {
        CommandPolicy {
            timeout: Duration::from_millis(self.request_timeout_ms),
            retries: self.command_retries,
        }
    }
}

fn default_obs_host() -> String {
    "localhost".to_string()
}
fn default_obs_port() -> u16 {
    4455
}
fn default_probe_attempts() -> u32 {
    20
}
fn default_interval_ms() -> u64 {
    1000
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_command_retries() -> u32 {
    1
}
