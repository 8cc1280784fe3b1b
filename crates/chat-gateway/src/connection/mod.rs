//! Connection management
//!
//! Per-socket state, the sessions that outlive sockets, and the registry
//! dispatches are resolved through.

mod connection;
mod registry;
mod session;

pub use connection::Connection;
pub use registry::SessionRegistry;
pub use session::{Delivery, DeliveryError, Outbound, ResumeError, Session, SessionState};
