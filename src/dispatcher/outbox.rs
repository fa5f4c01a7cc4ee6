//! Outbound send path and pending-command table
//!
//! Every outbound request goes through one mutex-guarded sink. Requests are
//! registered in the pending table before they hit the wire so a fast
//! response can always be correlated.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::keys::EntityRef;
use crate::protocol::{Message, Request};
use crate::transport::FrameSink;

/// Deadline and retry budget applied to every request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPolicy {
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            retries: 1,
        }
    }
}

/// An outbound request before it is numbered
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub request_type: &'static str,
    pub data: Option<Value>,
    pub target: Option<EntityRef>,
    pub desired: Option<Value>,
    /// Safe to re-send after a timeout
    pub idempotent: bool,
}

impl Command {
    pub fn new(request_type: &'static str) -> Self {
        Self {
            request_type,
            data: None,
            target: None,
            desired: None,
            idempotent: true,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn target(mut self, target: EntityRef) -> Self {
        self.target = Some(target);
        self
    }

    pub fn desired(mut self, value: impl Into<Value>) -> Self {
        self.desired = Some(value.into());
        self
    }

    /// Mark as unsafe to repeat (transitions, replay saves)
    pub fn once(mut self) -> Self {
        self.idempotent = false;
        self
    }
}

/// A request awaiting its response
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub request: Request,
    pub target: Option<EntityRef>,
    pub desired: Option<Value>,
    pub retries: u32,
    pub deadline: Instant,
    pub idempotent: bool,
}

/// Serialized send path plus the table of unanswered requests
pub struct Outbox {
    sink: Mutex<Option<Box<dyn FrameSink>>>,
    open: AtomicBool,
    next_id: AtomicU64,
    pending: DashMap<String, PendingCommand>,
    policy: CommandPolicy,
}

impl Outbox {
    pub fn new(policy: CommandPolicy) -> Self {
        Self {
            sink: Mutex::new(None),
            open: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            policy,
        }
    }

    /// True while a session is attached and no stop has begun
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn policy(&self) -> CommandPolicy {
        self.policy
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Install the write half of a freshly identified connection.
    ///
    /// Returns false (and drops the sink) if the session was cancelled.
    pub(crate) async fn attach(&self, sink: Box<dyn FrameSink>, cancel: &CancellationToken) -> bool {
        let mut guard = self.sink.lock().await;
        if cancel.is_cancelled() {
            return false;
        }
        *guard = Some(sink);
        self.open.store(true, Ordering::SeqCst);
        true
    }

    /// Refuse every send from now on
    pub(crate) fn close_gate(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Close the gate, close the sink and fail everything pending.
    ///
    /// Returns how many pending requests were dropped.
    pub(crate) async fn detach(&self) -> usize {
        self.close_gate();
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!("Closing sink: {}", e);
            }
        }

        let dropped = self.pending.len();
        self.pending.clear();
        if dropped > 0 {
            debug!("Failed {} pending request(s) on disconnect", dropped);
        }
        dropped
    }

    /// Number, register and send a command. Returns the request id.
    pub async fn submit(&self, command: Command) -> Result<String, TransportError> {
        if !self.is_open() {
            return Err(not_connected());
        }

        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let request = Request {
            request_type: command.request_type.to_string(),
            request_id: request_id.clone(),
            request_data: command.data,
        };
        let frame = Message::Request(request.clone()).to_frame()?;

        self.pending.insert(
            request_id.clone(),
            PendingCommand {
                request,
                target: command.target,
                desired: command.desired,
                retries: 0,
                deadline: Instant::now() + self.policy.timeout,
                idempotent: command.idempotent,
            },
        );

        if let Err(e) = self.write(frame).await {
            self.pending.remove(&request_id);
            return Err(e);
        }
        Ok(request_id)
    }

    async fn write(&self, frame: String) -> Result<(), TransportError> {
        let mut guard = self.sink.lock().await;
        let sink = match guard.as_mut() {
            Some(sink) if self.is_open() => sink,
            _ => return Err(not_connected()),
        };
        trace!("→ {}", frame);
        sink.send(frame).await
    }

    /// Remove and return the entry a response answers
    pub(crate) fn complete(&self, request_id: &str) -> Option<PendingCommand> {
        self.pending.remove(request_id).map(|(_, pending)| pending)
    }

    /// Re-send or drop requests past their deadline
    pub(crate) async fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| entry.key().clone())
            .collect();

        for request_id in expired {
            let Some((_, mut pending)) = self.pending.remove(&request_id) else {
                continue;
            };

            if !pending.idempotent || pending.retries >= self.policy.retries {
                warn!(
                    "⏱️ {} (id {}) timed out after {} retr{}, dropping",
                    pending.request.request_type,
                    request_id,
                    pending.retries,
                    if pending.retries == 1 { "y" } else { "ies" }
                );
                continue;
            }

            pending.retries += 1;
            pending.deadline = now + self.policy.timeout;
            debug!(
                "🔁 Re-sending {} (id {}, retry {})",
                pending.request.request_type, request_id, pending.retries
            );

            let frame = match Message::Request(pending.request.clone()).to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Cannot re-encode {}: {}", request_id, e);
                    continue;
                },
            };
            self.pending.insert(request_id.clone(), pending);
            if let Err(e) = self.write(frame).await {
                debug!("Re-send of {} failed: {}", request_id, e);
                self.pending.remove(&request_id);
            }
        }
    }
}

fn not_connected() -> TransportError {
    TransportError::Closed("not connected".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::requests;
    use crate::transport::{Connector, Endpoint, MemoryConnector};
    use serde_json::json;

    async fn attached(policy: CommandPolicy) -> (Outbox, crate::transport::memory::RemoteEnd) {
        let (connector, mut listener) = MemoryConnector::new();
        let conn = connector.connect(&Endpoint::default()).await.unwrap();
        let remote = listener.accept().await.unwrap();
        let outbox = Outbox::new(policy);
        assert!(outbox.attach(conn.sink, &CancellationToken::new()).await);
        (outbox, remote)
    }

    #[tokio::test]
    async fn test_submit_refused_when_detached() {
        let outbox = Outbox::new(CommandPolicy::default());
        assert!(outbox.submit(Command::new(requests::START_STREAM)).await.is_err());
        assert_eq!(outbox.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_registers_and_sends() {
        let (outbox, mut remote) = attached(CommandPolicy::default()).await;

        let id = outbox
            .submit(
                Command::new(requests::SET_INPUT_MUTE)
                    .with_data(json!({"inputName": "Mic", "inputMuted": true}))
                    .target(EntityRef::input("Mic"))
                    .desired(true),
            )
            .await
            .unwrap();

        let request = remote.next_request().await.unwrap();
        assert_eq!(request.request_id, id);
        assert_eq!(request.request_type, "SetInputMute");
        assert_eq!(outbox.pending_count(), 1);

        let pending = outbox.complete(&id).unwrap();
        assert_eq!(pending.desired, Some(json!(true)));
        assert_eq!(outbox.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_resends_idempotent_then_drops() {
        let policy = CommandPolicy {
            timeout: Duration::from_millis(100),
            retries: 1,
        };
        let (outbox, mut remote) = attached(policy).await;

        let id = outbox.submit(Command::new(requests::STOP_STREAM)).await.unwrap();
        remote.next_request().await.unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;
        outbox.sweep_expired().await;
        let resent = remote.next_request().await.unwrap();
        assert_eq!(resent.request_id, id);
        assert_eq!(outbox.pending_count(), 1);

        tokio::time::advance(Duration::from_millis(150)).await;
        outbox.sweep_expired().await;
        assert_eq!(outbox.pending_count(), 0);
        assert!(remote.try_next_frame().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_never_repeats_one_shot_commands() {
        let policy = CommandPolicy {
            timeout: Duration::from_millis(100),
            retries: 3,
        };
        let (outbox, mut remote) = attached(policy).await;

        outbox
            .submit(Command::new(requests::SAVE_REPLAY_BUFFER).once())
            .await
            .unwrap();
        remote.next_request().await.unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;
        outbox.sweep_expired().await;
        assert_eq!(outbox.pending_count(), 0);
        assert!(remote.try_next_frame().is_none());
    }

    #[tokio::test]
    async fn test_detach_fails_pending_and_closes_gate() {
        let (outbox, _remote) = attached(CommandPolicy::default()).await;
        outbox.submit(Command::new(requests::START_RECORD)).await.unwrap();
        outbox.submit(Command::new(requests::START_STREAM)).await.unwrap();

        assert_eq!(outbox.detach().await, 2);
        assert!(!outbox.is_open());
        assert!(outbox.submit(Command::new(requests::START_STREAM)).await.is_err());
    }
}
