//! Heartbeat handler (op 1)

use super::HandlerResult;
use crate::connection::Connection;
use crate::protocol::{CloseCode, GatewayMessage};

/// Handles heartbeat messages
pub struct HeartbeatHandler;

impl HeartbeatHandler {
    /// Push the deadline out and acknowledge.
    ///
    /// `last_sequence` is the client's last received sequence number; it is
    /// only logged.
    pub async fn handle(
        connection: &mut Connection,
        last_sequence: Option<u64>,
    ) -> HandlerResult<Option<CloseCode>> {
        connection.record_heartbeat();

        tracing::trace!(
            session_id = ?connection.session().map(|s| s.id().to_string()),
            client_seq = ?last_sequence,
            server_seq = ?connection.session().map(|s| s.last_sequence()),
            "Heartbeat received"
        );

        connection.send(&GatewayMessage::heartbeat_ack()).await?;
        Ok(None)
    }
}
