//! Resume handler (op 6)

use super::identify::bare_token;
use super::{teardown, HandlerError, HandlerResult, PresenceHandler};
use crate::connection::{Connection, ResumeError, SessionState};
use crate::events::{PresenceStatus, ResumedEvent};
use crate::protocol::{CloseCode, GatewayMessage, ResumePayload};
use crate::server::GatewayState;

/// Handles Resume messages
pub struct ResumeHandler;

impl ResumeHandler {
    /// Reattach a retained session to this socket.
    ///
    /// Any failure to find a resumable session answers INVALID_SESSION and
    /// leaves the connection in `Connected`, awaiting a fresh IDENTIFY.
    pub async fn handle(
        state: &GatewayState,
        connection: &mut Connection,
        payload: ResumePayload,
    ) -> HandlerResult<Option<CloseCode>> {
        let user_id = match state.authenticator().authenticate(bare_token(&payload.token)) {
            Ok(user_id) => user_id,
            Err(e) => {
                tracing::debug!(session_id = %payload.session_id, error = %e, "Resume token rejected");
                return Self::invalid(connection).await;
            }
        };

        let encoding = connection.params().encoding;
        let was_online = state.registry().is_online(user_id);
        // Live again from here on; dispatches before the replay below are
        // buffered and replayed, later ones go straight to the socket
        let Some(session) = state.registry().revive(&payload.session_id, |session| {
            session.user_id() == user_id && session.params().encoding == encoding
        }) else {
            tracing::debug!(
                session_id = %payload.session_id,
                user_id = %user_id,
                "No resumable session"
            );
            return Self::invalid(connection).await;
        };

        connection.set_session(session.clone());
        connection.set_state(SessionState::Resuming);

        let resumed = serde_json::to_value(ResumedEvent { trace: state.trace() })
            .map_err(|e| HandlerError::Internal(e.to_string()))?;

        match session.resume(connection.outbound(), payload.seq, resumed) {
            Ok(replayed) => {
                connection.set_state(SessionState::Ready);
                connection.record_heartbeat();
                if !was_online {
                    PresenceHandler::announce(state, user_id, PresenceStatus::Online).await?;
                }

                tracing::info!(
                    session_id = %session.id(),
                    user_id = %user_id,
                    replayed,
                    "Session resumed"
                );
                Ok(None)
            }
            Err(ResumeError::SequenceAhead { claimed, current }) => {
                tracing::debug!(session_id = %session.id(), claimed, current, "Resume sequence ahead of server");
                Self::abandon(state, connection);
                Err(HandlerError::InvalidSequence(claimed))
            }
            Err(ResumeError::ReplayGap(seq)) => {
                tracing::debug!(session_id = %session.id(), seq, "Resume replay no longer available");
                Self::abandon(state, connection);
                Self::invalid(connection).await
            }
            Err(err @ (ResumeError::Transport | ResumeError::Encode)) => {
                Err(HandlerError::Internal(err.to_string()))
            }
        }
    }

    /// Undo a revive that could not be completed
    fn abandon(state: &GatewayState, connection: &mut Connection) {
        if let Some(session) = connection.take_session() {
            state.registry().deregister(&session);
            teardown::release(state, &session);
        }
    }

    async fn invalid(connection: &mut Connection) -> HandlerResult<Option<CloseCode>> {
        connection.set_state(SessionState::Connected);
        connection.send(&GatewayMessage::invalid_session(false)).await?;
        Ok(None)
    }
}
