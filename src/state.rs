//! State cache module - mirror of remote application state
//!
//! Holds what the remote application has confirmed (scenes, inputs, scene
//! items, audio, filters, outputs, studio mode). Written only by the event
//! router; a command's effect shows up here once the remote reports it, never
//! at send time.

mod store;
mod types;

pub use store::StateCache;
pub use types::{Facet, Output, OutputState, OutputStatus, Singleton, StateKey, StateValue};
