//! Bridge handle - the six components wired together for one endpoint
//!
//! Consumers hold a `Bridge` (or clones of its parts) instead of reaching
//! for a global: subscribe to events, read the cache, send commands, watch
//! the connection.

use std::sync::Arc;

use crate::bus::{EventBus, Registry};
use crate::config::ObsConfig;
use crate::dispatcher::{CommandPolicy, Dispatcher, Outbox};
use crate::router::EventRouter;
use crate::state::StateCache;
use crate::supervisor::{ConnectionInfo, Health, LifecycleEvent, Supervisor, SupervisorConfig};
use crate::transport::Connector;

pub struct Bridge {
    cache: Arc<StateCache>,
    events: Arc<EventBus>,
    dispatcher: Dispatcher,
    supervisor: Supervisor,
}

impl Bridge {
    pub fn new(config: SupervisorConfig, policy: CommandPolicy, connector: Arc<dyn Connector>) -> Self {
        let cache = Arc::new(StateCache::new());
        let events = Arc::new(EventBus::new());
        let outbox = Arc::new(Outbox::new(policy));
        let router = Arc::new(EventRouter::new(
            Arc::clone(&cache),
            Arc::clone(&events),
            Arc::clone(&outbox),
        ));
        let dispatcher = Dispatcher::new(Arc::clone(&cache), Arc::clone(&outbox));
        let supervisor = Supervisor::new(config, connector, Arc::clone(&cache), outbox, router);

        Self {
            cache,
            events,
            dispatcher,
            supervisor,
        }
    }

    pub fn from_config(config: &ObsConfig, connector: Arc<dyn Connector>) -> Self {
        Self::new(config.supervisor(), config.command_policy(), connector)
    }

    /// Begin connecting in the background
    pub async fn start(&self) {
        self.supervisor.start().await;
    }

    /// Disconnect; returns once the session task has ended
    pub async fn stop(&self) {
        self.supervisor.stop().await;
    }

    pub fn status(&self) -> ConnectionInfo {
        self.supervisor.info()
    }

    pub fn health(&self) -> Health {
        self.supervisor.health()
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Routed domain events
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn lifecycle(&self) -> &Registry<LifecycleEvent> {
        self.supervisor.lifecycle()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
