//! Protocol transport
//!
//! Duplex, message-based connection to one endpoint. The transport moves
//! text frames and knows nothing about their meaning; the handshake in
//! [`crate::protocol::handshake`] runs on top of any [`Connector`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;
use crate::protocol::{self, Credentials, EventSubscription};

pub mod memory;
pub mod websocket;

pub use memory::MemoryConnector;
pub use websocket::WebSocketConnector;

/// Network address of the remote control server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("localhost", 4455)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next text frame.
    ///
    /// `Ok(None)` means the connection closed normally. A close carrying an
    /// authentication or version close code is reported as the matching
    /// [`TransportError`].
    async fn receive(&mut self) -> Result<Option<String>, TransportError>;
}

/// An open connection, split so reads and writes can proceed independently
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens raw connections to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError>;
}

/// Connect and authenticate in one step.
///
/// `on_connected` runs once the raw connection is up, before the handshake
/// starts. The handshake is bounded by `handshake_timeout`.
pub async fn open(
    connector: &dyn Connector,
    endpoint: &Endpoint,
    credentials: &Credentials,
    subscriptions: EventSubscription,
    handshake_timeout: Duration,
    on_connected: impl FnOnce() + Send,
) -> Result<Connection, TransportError> {
    let mut conn = connector.connect(endpoint).await?;
    on_connected();

    match tokio::time::timeout(
        handshake_timeout,
        protocol::authenticate(&mut conn, credentials, subscriptions),
    )
    .await
    {
        Ok(Ok(rpc)) => {
            debug!("Identified with {} (rpc {})", endpoint, rpc);
            Ok(conn)
        },
        Ok(Err(e)) => {
            let _ = conn.sink.close().await;
            Err(e)
        },
        Err(_) => {
            let _ = conn.sink.close().await;
            Err(TransportError::Protocol(format!(
                "handshake timed out after {}ms",
                handshake_timeout.as_millis()
            )))
        },
    }
}
