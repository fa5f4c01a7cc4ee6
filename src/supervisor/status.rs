//! Connection status types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::bus::Categorized;
use crate::error::TransportError;
use crate::transport::Endpoint;

/// Supervisor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        write!(f, "{}", s)
    }
}

/// Coarse status for indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Connected
    Normal,
    /// Remote present (or possibly present) but not connected
    Warning,
    /// Remote absent, credentials rejected, or configuration invalid
    Error,
}

impl Health {
    /// Health while not connected, given the failure that got us here
    pub fn after_failure(error: &TransportError) -> Self {
        match error {
            TransportError::Unreachable(_) | TransportError::HandshakeRejected(_) => Health::Error,
            _ => Health::Warning,
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Health::Normal => write!(f, "normal"),
            Health::Warning => write!(f, "warning"),
            Health::Error => write!(f, "error"),
        }
    }
}

/// Read-only snapshot of the connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub endpoint: Endpoint,
    pub state: ConnectionState,
    pub health: Health,
    pub last_error: Option<String>,
    /// Attempts since the last successful handshake
    pub retry_count: u32,
    pub since: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: ConnectionState::Disconnected,
            health: Health::Warning,
            last_error: None,
            retry_count: 0,
            since: Utc::now(),
        }
    }
}

/// Categories of [`LifecycleEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    Status,
    Connected,
    Disconnected,
}

/// Emitted by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// Every state transition
    StatusChanged(ConnectionInfo),
    Connected,
    Disconnected { reason: String },
}

impl Categorized for LifecycleEvent {
    type Category = LifecycleKind;

    fn category(&self) -> LifecycleKind {
        match self {
            LifecycleEvent::StatusChanged(_) => LifecycleKind::Status,
            LifecycleEvent::Connected => LifecycleKind::Connected,
            LifecycleEvent::Disconnected { .. } => LifecycleKind::Disconnected,
        }
    }
}
