//! obs-websocket v5 wire protocol
//!
//! JSON envelopes `{ "op": <u8>, "d": {...} }` over a WebSocket. Messages fall
//! into three classes: requests (op 6), responses correlated by request id
//! (op 7) and unsolicited events (op 5). Ops 0-2 belong to the session
//! handshake.

pub mod auth;
pub mod handshake;
mod message;
pub mod requests;

pub use handshake::{authenticate, Credentials};
pub use message::{
    op, AuthChallenge, Event, Hello, Identified, Identify, Message, Request, RequestResponse,
    RequestStatus,
};
pub use requests::EventSubscription;

/// RPC version this crate negotiates
pub const RPC_VERSION: u32 = 1;

/// WebSocket close codes sent by the server
pub mod close_code {
    pub const AUTHENTICATION_FAILED: u16 = 4009;
    pub const UNSUPPORTED_RPC_VERSION: u16 = 4010;
}
