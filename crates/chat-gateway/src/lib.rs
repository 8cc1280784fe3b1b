//! # chat-gateway
//!
//! WebSocket gateway for real-time events: connection lifecycle, session
//! resume, and subscription-based fan-out of dispatch events.

pub mod broadcast;
pub mod connection;
pub mod events;
pub mod handlers;
pub mod protocol;
pub mod server;

pub use broadcast::{EventDispatcher, Namespace};
pub use connection::{Session, SessionRegistry};
pub use server::{create_app, create_gateway_state, run, serve, GatewayState};
