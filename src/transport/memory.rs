//! In-process transport
//!
//! A [`MemoryConnector`] hands every accepted connection's far end to a
//! [`MemoryListener`], where a test (or a demo) plays the remote application:
//! answering the handshake, replying to requests and pushing events. It can
//! also refuse a number of connection attempts to simulate an application
//! that is still starting.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{Connection, Connector, Endpoint, FrameSink, FrameSource};
use crate::error::TransportError;
use crate::protocol::auth::authentication_string;
use crate::protocol::handshake::classify_close;
use crate::protocol::{
    close_code, AuthChallenge, Event, Hello, Identified, Message, Request, RequestResponse,
    RequestStatus,
};

enum Incoming {
    Frame(String),
    Close { code: u16, reason: String },
}

/// Connector whose connections terminate in this process
pub struct MemoryConnector {
    refusals: Mutex<usize>,
    attempts: AtomicUsize,
    accepted: mpsc::UnboundedSender<RemoteEnd>,
}

/// Receives the remote end of each accepted connection
pub struct MemoryListener {
    rx: mpsc::UnboundedReceiver<RemoteEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            refusals: Mutex::new(0),
            attempts: AtomicUsize::new(0),
            accepted: tx,
        });
        (connector, MemoryListener { rx })
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_next(&self, count: usize) {
        *self.refusals.lock() = count;
    }

    /// Total connection attempts seen, refused or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        {
            let mut refusals = self.refusals.lock();
            if *refusals > 0 {
                *refusals -= 1;
                return Err(TransportError::Unreachable(format!(
                    "{}: connection refused",
                    endpoint
                )));
            }
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();

        let remote = RemoteEnd {
            to_client,
            from_client,
        };
        if self.accepted.send(remote).is_err() {
            return Err(TransportError::Unreachable(format!(
                "{}: no listener",
                endpoint
            )));
        }

        Ok(Connection {
            sink: Box::new(MemorySink {
                tx: Some(client_tx),
            }),
            source: Box::new(MemorySource { rx: client_rx }),
        })
    }
}

impl MemoryListener {
    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> Option<RemoteEnd> {
        self.rx.recv().await
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TransportError::Closed("sink closed".to_string()))?;
        tx.send(frame)
            .map_err(|_| TransportError::Closed("remote end dropped".to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<Incoming>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn receive(&mut self) -> Result<Option<String>, TransportError> {
        match self.rx.recv().await {
            Some(Incoming::Frame(frame)) => Ok(Some(frame)),
            Some(Incoming::Close { code, .. }) if code == 1000 => Ok(None),
            Some(Incoming::Close { code, reason }) => Err(classify_close(code, &reason)),
            None => Ok(None),
        }
    }
}

/// The remote application's side of an in-memory connection
pub struct RemoteEnd {
    to_client: mpsc::UnboundedSender<Incoming>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl RemoteEnd {
    /// Push a raw frame to the client
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(Incoming::Frame(frame.into()));
    }

    pub fn push_message(&self, message: &Message) {
        if let Ok(frame) = message.to_frame() {
            self.push(frame);
        }
    }

    /// Push an event notification
    pub fn emit(&self, event_type: &str, data: Value) {
        self.push_message(&Message::Event(Event {
            event_type: event_type.to_string(),
            event_intent: 0,
            event_data: data,
        }));
    }

    /// Close the connection with a WebSocket close code
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(Incoming::Close {
            code,
            reason: reason.to_string(),
        });
    }

    pub fn send_hello(&self, challenge: Option<(&str, &str)>, rpc_version: u32) {
        self.push_message(&Message::Hello(Hello {
            obs_web_socket_version: Some("5.5.0".to_string()),
            rpc_version,
            authentication: challenge.map(|(challenge, salt)| AuthChallenge {
                challenge: challenge.to_string(),
                salt: salt.to_string(),
            }),
        }));
    }

    /// Next frame sent by the client; `None` once the client hung up
    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next frame if one is already queued
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Next request sent by the client, skipping anything else
    pub async fn next_request(&mut self) -> Option<Request> {
        while let Some(frame) = self.next_frame().await {
            if let Ok(Message::Request(request)) = Message::parse(&frame) {
                return Some(request);
            }
        }
        None
    }

    /// Answer a request successfully
    pub fn respond(&self, request: &Request, data: Value) {
        self.push_message(&Message::Response(RequestResponse {
            request_type: request.request_type.clone(),
            request_id: request.request_id.clone(),
            request_status: RequestStatus {
                result: true,
                code: 100,
                comment: None,
            },
            response_data: data,
        }));
    }

    /// Answer a request with a failure status
    pub fn fail(&self, request: &Request, code: u32, comment: &str) {
        self.push_message(&Message::Response(RequestResponse {
            request_type: request.request_type.clone(),
            request_id: request.request_id.clone(),
            request_status: RequestStatus {
                result: false,
                code,
                comment: Some(comment.to_string()),
            },
            response_data: Value::Null,
        }));
    }

    /// Play the server side of the handshake.
    ///
    /// With a secret, a challenge is issued and the client's answer checked;
    /// a wrong answer closes with the authentication-failed code. Returns the
    /// client's event subscription mask on success.
    pub async fn serve_handshake(&mut self, secret: Option<&str>) -> Option<u32> {
        const CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";
        const SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";

        self.send_hello(secret.map(|_| (CHALLENGE, SALT)), 1);

        let frame = self.next_frame().await?;
        let identify = match Message::parse(&frame) {
            Ok(Message::Identify(identify)) => identify,
            _ => {
                self.close(4007, "expected Identify");
                return None;
            },
        };

        if let Some(secret) = secret {
            let expected = authentication_string(secret, SALT, CHALLENGE);
            if identify.authentication.as_deref() != Some(expected.as_str()) {
                self.close(close_code::AUTHENTICATION_FAILED, "Authentication failed.");
                return None;
            }
        }

        self.push_message(&Message::Identified(Identified {
            negotiated_rpc_version: 1,
        }));
        Some(identify.event_subscriptions)
    }
}
