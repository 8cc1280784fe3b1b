//! Op code handlers
//!
//! Routes decoded client frames according to the connection state.

mod error;
mod heartbeat;
mod identify;
mod presence;
mod resume;
pub mod teardown;

pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatHandler;
pub use identify::IdentifyHandler;
pub use presence::PresenceHandler;
pub use resume::ResumeHandler;
pub use teardown::Disconnect;

use crate::connection::{Connection, SessionState};
use crate::protocol::{CloseCode, CodecError, GatewayMessage, OpCode};
use crate::server::GatewayState;

/// Dispatch incoming client messages to appropriate handlers
pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Handle one decoded client frame. `Some(code)` ends the connection.
    pub async fn dispatch(
        state: &GatewayState,
        connection: &mut Connection,
        message: GatewayMessage,
    ) -> HandlerResult<Option<CloseCode>> {
        match connection.state() {
            SessionState::Connected => Self::unauthenticated(state, connection, message).await,
            SessionState::Ready => Self::authenticated(connection, message).await,
            // Nothing is read while identifying/resuming; closing frames are ignored
            SessionState::Identified
            | SessionState::Resuming
            | SessionState::Closing
            | SessionState::Closed => Ok(None),
        }
    }

    /// Close code for a frame that could not be decoded
    pub fn decode_failure(state: SessionState, error: &CodecError) -> CloseCode {
        match (state, error) {
            (SessionState::Connected, CodecError::UnknownOpcode(_)) => CloseCode::NotAuthenticated,
            (_, CodecError::UnknownOpcode(_)) => CloseCode::UnknownOpcode,
            _ => CloseCode::DecodeError,
        }
    }

    async fn unauthenticated(
        state: &GatewayState,
        connection: &mut Connection,
        message: GatewayMessage,
    ) -> HandlerResult<Option<CloseCode>> {
        match message.op {
            OpCode::Identify => {
                let payload = message.as_identify().ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid Identify payload".to_string())
                })?;

                IdentifyHandler::handle(state, connection, payload).await
            }
            OpCode::Resume => {
                let payload = message.as_resume().ok_or_else(|| {
                    HandlerError::InvalidPayload("Invalid Resume payload".to_string())
                })?;

                ResumeHandler::handle(state, connection, payload).await
            }
            op => {
                tracing::debug!(op = %op, "Frame before authentication");
                Err(HandlerError::NotAuthenticated)
            }
        }
    }

    async fn authenticated(
        connection: &mut Connection,
        message: GatewayMessage,
    ) -> HandlerResult<Option<CloseCode>> {
        match message.op {
            OpCode::Heartbeat => HeartbeatHandler::handle(connection, message.as_heartbeat_seq()).await,
            OpCode::Identify | OpCode::Resume => Err(HandlerError::AlreadyAuthenticated),
            op => {
                tracing::warn!(
                    session_id = ?connection.session().map(|s| s.id().to_string()),
                    op = %op,
                    "Received server-only op code from client"
                );
                Ok(Some(CloseCode::UnknownOpcode))
            }
        }
    }
}
