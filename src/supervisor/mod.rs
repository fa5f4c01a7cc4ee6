//! Connection Supervisor - connect, authenticate, retry, health
//!
//! State machine:
//!
//! ```text
//! Disconnected → Connecting → Authenticating → Connected
//!                    ↑                             │
//!                    └──────── Reconnecting ←──────┘
//! ```
//!
//! Startup probes a bounded number of times; once a session has existed,
//! losing it triggers reconnection at a fixed interval until `stop()`.
//! Every new session starts from an empty cache, a fresh Identify and a full
//! state refresh.

mod status;

#[cfg(test)]
mod tests;

pub use status::{ConnectionInfo, ConnectionState, Health, LifecycleEvent, LifecycleKind};

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::Registry;
use crate::dispatcher::Outbox;
use crate::error::TransportError;
use crate::protocol::{Credentials, EventSubscription};
use crate::router::EventRouter;
use crate::state::StateCache;
use crate::transport::{self, Connection, Connector, Endpoint};

/// How often the router checks for expired requests
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

/// Connection parameters and retry policy
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
    pub subscriptions: EventSubscription,
    pub probe_attempts: u32,
    pub probe_interval: Duration,
    pub reconnect_interval: Duration,
    pub handshake_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            credentials: Credentials::default(),
            subscriptions: EventSubscription::ROUTED,
            probe_attempts: 20,
            probe_interval: Duration::from_millis(1000),
            reconnect_interval: Duration::from_millis(1000),
            handshake_timeout: Duration::from_millis(5000),
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.host.trim().is_empty() {
            return Err("host is empty".to_string());
        }
        if self.endpoint.port == 0 {
            return Err("port 0 is not valid".to_string());
        }
        if self.probe_attempts == 0 {
            return Err("probe_attempts must be at least 1".to_string());
        }
        if self.handshake_timeout.is_zero() {
            return Err("handshake_timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

struct Inner {
    config: SupervisorConfig,
    connector: Arc<dyn Connector>,
    cache: Arc<StateCache>,
    outbox: Arc<Outbox>,
    router: Arc<EventRouter>,
    info: RwLock<ConnectionInfo>,
    lifecycle: Registry<LifecycleEvent>,
}

struct Session {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the connection lifecycle for one endpoint
pub struct Supervisor {
    inner: Arc<Inner>,
    session: Mutex<Option<Session>>,
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

impl Inner {
    fn update(&self, f: impl FnOnce(&mut ConnectionInfo)) {
        let snapshot = {
            let mut info = self.info.write();
            f(&mut info);
            info.since = Utc::now();
            info.clone()
        };
        debug!(
            "OBS status: {} ({}){}",
            snapshot.state,
            snapshot.health,
            snapshot
                .last_error
                .as_ref()
                .map(|e| format!(" - {}", e))
                .unwrap_or_default()
        );
        self.lifecycle
            .publish(&LifecycleEvent::StatusChanged(snapshot));
    }

    fn give_up(&self, health: Health, reason: String) {
        let last_error = reason.clone();
        self.update(move |i| {
            i.state = ConnectionState::Disconnected;
            i.health = health;
            i.last_error = Some(last_error);
        });
        self.lifecycle
            .publish(&LifecycleEvent::Disconnected { reason });
    }

    /// One connect + handshake. `None` when cancelled.
    async fn attempt(&self, cancel: &CancellationToken) -> Option<Result<Connection, TransportError>> {
        let open = transport::open(
            self.connector.as_ref(),
            &self.config.endpoint,
            &self.config.credentials,
            self.config.subscriptions,
            self.config.handshake_timeout,
            || self.update(|i| i.state = ConnectionState::Authenticating),
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = open => Some(result),
        }
    }

    /// Bounded startup probe
    async fn probe(&self, cancel: &CancellationToken) -> Option<Connection> {
        let attempts = self.config.probe_attempts;
        info!("🎬 Connecting to OBS at {}", self.config.endpoint);

        for attempt in 1..=attempts {
            self.update(|i| {
                i.state = ConnectionState::Connecting;
                i.health = Health::Warning;
                i.retry_count = attempt - 1;
            });

            match self.attempt(cancel).await? {
                Ok(conn) => return Some(conn),
                Err(e @ TransportError::HandshakeRejected(_))
                | Err(e @ TransportError::ProtocolVersionMismatch(_)) => {
                    error!("❌ OBS refused the handshake: {}", e);
                    self.give_up(Health::after_failure(&e), e.to_string());
                    return None;
                },
                Err(e) => {
                    debug!("OBS probe {}/{} failed: {}", attempt, attempts, e);
                    let last_error = e.to_string();
                    self.update(move |i| i.last_error = Some(last_error));
                },
            }

            if attempt < attempts && !sleep_or_cancel(self.config.probe_interval, cancel).await {
                return None;
            }
        }

        let reason = format!("OBS not reachable after {} attempts", attempts);
        warn!("⚠️ {}", reason);
        self.give_up(Health::Error, reason);
        None
    }

    /// Unbounded reconnection after a session was lost
    async fn reconnect(&self, cancel: &CancellationToken) -> Option<Connection> {
        let mut retry = 0u32;
        loop {
            if !sleep_or_cancel(self.config.reconnect_interval, cancel).await {
                return None;
            }
            retry = retry.saturating_add(1);
            debug!(
                "⏳ OBS reconnect #{} ({}ms interval)",
                retry,
                self.config.reconnect_interval.as_millis()
            );
            self.update(|i| {
                i.state = ConnectionState::Connecting;
                i.retry_count = retry;
            });

            match self.attempt(cancel).await? {
                Ok(conn) => {
                    info!("✅ OBS reconnection successful");
                    return Some(conn);
                },
                Err(e) => {
                    debug!("OBS reconnect #{} failed: {}", retry, e);
                    let health = Health::after_failure(&e);
                    let last_error = e.to_string();
                    self.update(move |i| {
                        i.state = ConnectionState::Reconnecting;
                        i.health = health;
                        i.last_error = Some(last_error);
                    });
                },
            }
        }
    }

    /// Run one identified session until it ends
    async fn serve(&self, conn: Connection, cancel: &CancellationToken) -> Result<(), TransportError> {
        let Connection { sink, source } = conn;
        if !self.outbox.attach(sink, cancel).await {
            return Ok(());
        }

        self.update(|i| {
            i.state = ConnectionState::Connected;
            i.health = Health::Normal;
            i.last_error = None;
            i.retry_count = 0;
        });
        info!("✅ OBS WebSocket connected");
        self.lifecycle.publish(&LifecycleEvent::Connected);

        self.router.refresh().await;
        self.router.run(source, cancel, SWEEP_INTERVAL).await
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let Some(mut conn) = self.probe(&cancel).await else {
            return;
        };

        loop {
            let outcome = self.serve(conn, &cancel).await;
            self.outbox.detach().await;
            self.cache.reset();

            let error = match outcome {
                Ok(()) => return,
                Err(e) => e,
            };
            warn!("🔌 OBS connection lost: {}", error);
            let health = Health::after_failure(&error);
            let reason = error.to_string();
            let last_error = reason.clone();
            self.update(move |i| {
                i.state = ConnectionState::Reconnecting;
                i.health = health;
                i.last_error = Some(last_error);
            });
            self.lifecycle
                .publish(&LifecycleEvent::Disconnected { reason });

            conn = match self.reconnect(&cancel).await {
                Some(conn) => conn,
                None => return,
            };
        }
    }
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        connector: Arc<dyn Connector>,
        cache: Arc<StateCache>,
        outbox: Arc<Outbox>,
        router: Arc<EventRouter>,
    ) -> Self {
        let info = ConnectionInfo::new(config.endpoint.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                cache,
                outbox,
                router,
                info: RwLock::new(info),
                lifecycle: Registry::new(),
            }),
            session: Mutex::new(None),
        }
    }

    pub fn info(&self) -> ConnectionInfo {
        self.inner.info.read().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.info.read().state
    }

    pub fn health(&self) -> Health {
        self.inner.info.read().health
    }

    /// Lifecycle event registry (status changes, connected, disconnected)
    pub fn lifecycle(&self) -> &Registry<LifecycleEvent> {
        &self.inner.lifecycle
    }

    /// Begin connecting in the background. No-op if a session task is running.
    pub async fn start(&self) {
        let mut session = self.session.lock().await;
        if session.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            debug!("Supervisor already running");
            return;
        }

        if let Err(reason) = self.inner.config.validate() {
            error!("❌ Invalid OBS configuration: {}", reason);
            self.inner
                .give_up(Health::Error, format!("invalid configuration: {}", reason));
            return;
        }

        let cancel = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { inner.run(token).await });
        *session = Some(Session { cancel, handle });
    }

    /// Tear down: no sends once this begins; returns after the session task ended
    pub async fn stop(&self) {
        let session = self.session.lock().await.take();
        let Some(Session { cancel, handle }) = session else {
            self.inner.outbox.close_gate();
            return;
        };

        cancel.cancel();
        self.inner.outbox.close_gate();
        if let Err(e) = handle.await {
            warn!("Supervisor task ended abnormally: {}", e);
        }

        self.inner.outbox.detach().await;
        self.inner.cache.reset();
        self.inner.update(|i| {
            i.state = ConnectionState::Disconnected;
            i.health = Health::Warning;
            i.retry_count = 0;
        });
        info!("🛑 OBS connection stopped");
        self.inner.lifecycle.publish(&LifecycleEvent::Disconnected {
            reason: "stopped".to_string(),
        });
    }
}
