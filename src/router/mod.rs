//! Event Router - inbound frames → cache updates → subscriber callbacks
//!
//! The router owns the receive side of a session:
//! - Classifies every event notification into a [`DomainEvent`]
//! - Applies it to the [`StateCache`] (the cache's only writer)
//! - Publishes it to subscribers of its [`EventCategory`]
//! - Correlates responses with the dispatcher's pending table
//! - Refreshes non-pushed state after each handshake
//!
//! Frames are processed strictly in arrival order, one at a time.

mod classify;
mod events;
mod refresh;


pub use classify::{classify, Classified};
pub use events::{DomainEvent, EventCategory};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bus::EventBus;
use crate::dispatcher::{Command, Outbox};
use crate::error::TransportError;
use crate::protocol::{Event, Message, RequestResponse};
use crate::state::StateCache;
use crate::transport::FrameSource;

/// Routes one session's inbound traffic
pub struct EventRouter {
    cache: Arc<StateCache>,
    bus: Arc<EventBus>,
    outbox: Arc<Outbox>,
}

impl EventRouter {
    pub fn new(cache: Arc<StateCache>, bus: Arc<EventBus>, outbox: Arc<Outbox>) -> Self {
        Self { cache, bus, outbox }
    }

    /// Process one raw frame. Returns the read requests it calls for.
    pub fn handle_frame(&self, frame: &str) -> Vec<Command> {
        trace!("← {}", frame);

        match Message::parse(frame) {
            Ok(Message::Event(event)) => self.handle_event(event),
            Ok(Message::Response(response)) => self.handle_response(response),
            Ok(other) => {
                debug!("Ignoring op {} frame", other.op());
                Vec::new()
            },
            Err(e) => {
                warn!("⚠️ Dropping undecodable frame: {}", e);
                Vec::new()
            },
        }
    }

    fn handle_event(&self, event: Event) -> Vec<Command> {
        match classify(&event) {
            Classified::Domain(domain) => {
                let follow_ups = match &domain {
                    DomainEvent::SceneCollectionChanged { .. } => refresh::initial_requests(),
                    _ => Vec::new(),
                };
                self.publish(domain);
                follow_ups
            },
            Classified::Exit => {
                info!("👋 OBS is shutting down");
                Vec::new()
            },
            Classified::Unknown => {
                debug!("Unrouted event {}", event.event_type);
                Vec::new()
            },
            Classified::Malformed(reason) => {
                warn!("⚠️ Dropping {} event: {}", event.event_type, reason);
                Vec::new()
            },
        }
    }

    fn handle_response(&self, response: RequestResponse) -> Vec<Command> {
        let Some(pending) = self.outbox.complete(&response.request_id) else {
            warn!(
                "Response to unknown request {} ({})",
                response.request_id, response.request_type
            );
            return Vec::new();
        };

        let status = &response.request_status;
        if !status.result {
            let comment = status.comment.as_deref().unwrap_or("no comment");
            if refresh::is_read(&response.request_type) {
                debug!(
                    "{} failed: code {} ({})",
                    response.request_type, status.code, comment
                );
            } else {
                warn!(
                    "❌ OBS rejected {}{}: code {} ({})",
                    response.request_type,
                    pending
                        .target
                        .as_ref()
                        .map(|t| format!(" for {}", t))
                        .unwrap_or_default(),
                    status.code,
                    comment
                );
            }
            return Vec::new();
        }

        if !refresh::is_read(&response.request_type) {
            trace!("{} acknowledged", response.request_type);
            return Vec::new();
        }

        match refresh::translate(&pending.request, &response.response_data) {
            Ok(translation) => {
                for event in translation.events {
                    self.publish(event);
                }
                translation.follow_ups
            },
            Err(reason) => {
                warn!("⚠️ Unreadable {} response: {}", response.request_type, reason);
                Vec::new()
            },
        }
    }

    /// Apply to the cache, then notify subscribers
    fn publish(&self, event: DomainEvent) {
        self.cache.apply(&event);
        debug!("📥 {}", event);
        self.bus.publish(&event);
    }

    async fn send_all(&self, commands: Vec<Command>) {
        for command in commands {
            if let Err(e) = self.outbox.submit(command).await {
                debug!("Follow-up request not sent: {}", e);
                break;
            }
        }
    }

    /// Ask the remote for everything it does not push on its own
    pub async fn refresh(&self) {
        debug!("Refreshing state from OBS");
        self.send_all(refresh::initial_requests()).await;
    }

    /// Receive loop for one session.
    ///
    /// Returns `Ok(())` when cancelled and an error when the connection is
    /// lost. Expired pending requests are swept every `sweep_every`.
    pub async fn run(
        &self,
        mut source: Box<dyn FrameSource>,
        cancel: &CancellationToken,
        sweep_every: Duration,
    ) -> Result<(), TransportError> {
        let mut sweep = tokio::time::interval(sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Router loop cancelled");
                    return Ok(());
                }

                received = source.receive() => match received {
                    Ok(Some(frame)) => {
                        let follow_ups = self.handle_frame(&frame);
                        self.send_all(follow_ups).await;
                    },
                    Ok(None) => {
                        return Err(TransportError::Closed("remote closed the connection".to_string()));
                    },
                    Err(e) => return Err(e),
                },

                _ = sweep.tick() => self.outbox.sweep_expired().await,
            }
        }
    }
}
