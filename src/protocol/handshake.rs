//! Session handshake: Hello → Identify → Identified

use std::fmt;
use tracing::debug;

use super::auth::authentication_string;
use super::{close_code, EventSubscription, Identify, Message, RPC_VERSION};
use crate::error::TransportError;
use crate::transport::Connection;

/// Shared secret presented during the handshake
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub secret: Option<String>,
}

impl Credentials {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Map a WebSocket close code to the handshake error it signals
pub fn classify_close(code: u16, reason: &str) -> TransportError {
    match code {
        close_code::AUTHENTICATION_FAILED => TransportError::HandshakeRejected(reason.to_string()),
        close_code::UNSUPPORTED_RPC_VERSION => {
            TransportError::ProtocolVersionMismatch(reason.to_string())
        },
        _ => TransportError::Closed(format!("code {}: {}", code, reason)),
    }
}

async fn next_message(conn: &mut Connection, waiting_for: &str) -> Result<Message, TransportError> {
    let frame = conn
        .source
        .receive()
        .await?
        .ok_or_else(|| TransportError::Closed(format!("closed while waiting for {}", waiting_for)))?;
    Ok(Message::parse(&frame)?)
}

/// Authenticate and register for events on a freshly opened connection.
///
/// Returns the negotiated RPC version. Any error is terminal for this
/// connection attempt.
pub async fn authenticate(
    conn: &mut Connection,
    credentials: &Credentials,
    subscriptions: EventSubscription,
) -> Result<u32, TransportError> {
    let hello = match next_message(conn, "Hello").await? {
        Message::Hello(hello) => hello,
        other => {
            return Err(TransportError::Protocol(format!(
                "expected Hello, got op {}",
                other.op()
            )))
        },
    };

    debug!(
        "Hello from obs-websocket {} (rpc {})",
        hello.obs_web_socket_version.as_deref().unwrap_or("?"),
        hello.rpc_version
    );

    if hello.rpc_version < RPC_VERSION {
        return Err(TransportError::ProtocolVersionMismatch(format!(
            "server offers rpc {}, need {}",
            hello.rpc_version, RPC_VERSION
        )));
    }

    let authentication = match (&hello.authentication, &credentials.secret) {
        (Some(challenge), Some(secret)) => Some(authentication_string(
            secret,
            &challenge.salt,
            &challenge.challenge,
        )),
        (Some(_), None) => {
            return Err(TransportError::HandshakeRejected(
                "server requires a password but none is configured".to_string(),
            ))
        },
        (None, _) => None,
    };

    let identify = Message::Identify(Identify {
        rpc_version: RPC_VERSION,
        authentication,
        event_subscriptions: subscriptions.bits(),
    });
    conn.sink.send(identify.to_frame()?).await?;

    match next_message(conn, "Identified").await? {
        Message::Identified(identified) if identified.negotiated_rpc_version == RPC_VERSION => {
            Ok(identified.negotiated_rpc_version)
        },
        Message::Identified(identified) => Err(TransportError::ProtocolVersionMismatch(format!(
            "negotiated rpc {}",
            identified.negotiated_rpc_version
        ))),
        other => Err(TransportError::Protocol(format!(
            "expected Identified, got op {}",
            other.op()
        ))),
    }
}
