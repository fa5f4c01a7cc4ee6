//! DeckBridge - connection and state synchronization core for OBS control surfaces
//!
//! Keeps an eventually-consistent mirror of OBS Studio state over an
//! obs-websocket v5 connection that is probed at startup, re-established
//! when lost, and shared by many concurrent command sources.
//!
//! Components, leaf first:
//! - [`keys`]: hierarchical entity key codec
//! - [`transport`] / [`protocol`]: frames, handshake, authentication
//! - [`state`]: confirmed remote state
//! - [`router`]: inbound frames → cache updates → subscriber callbacks
//! - [`dispatcher`]: validated outbound commands
//! - [`supervisor`]: connection lifecycle and health
//! - [`bridge`]: all of the above for one endpoint

pub mod bridge;
pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod keys;
pub mod protocol;
pub mod router;
pub mod state;
pub mod supervisor;
pub mod transport;

pub use bridge::Bridge;
pub use bus::{EventBus, SubscriptionId};
pub use dispatcher::{CommandOutcome, Dispatcher};
pub use keys::EntityRef;
pub use router::{DomainEvent, EventCategory};
pub use supervisor::{ConnectionState, Health, LifecycleEvent};
