//! Session teardown
//!
//! The session leaves the registry before the socket is closed, so no
//! dispatch can race a half-closed transport.

use super::PresenceHandler;
use crate::connection::{Connection, Session, SessionState};
use crate::events::PresenceStatus;
use crate::protocol::CloseCode;
use crate::server::GatewayState;

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The server closes with this code
    Server(CloseCode),
    /// The client sent a close frame, with its code if any
    Client(Option<u16>),
    /// The socket failed or ended without a close frame
    Transport,
}

impl Disconnect {
    /// Whether the session stays resumable afterwards
    pub fn keeps_session(self) -> bool {
        match self {
            Self::Server(code) => code.keeps_session(),
            Self::Client(Some(1000 | 1001)) => false,
            Self::Client(_) | Self::Transport => true,
        }
    }
}

/// Take the connection's session out of the registry, then either keep it
/// resumable or release its subscriptions. Announces the user offline when
/// this was its last live session.
pub async fn teardown(state: &GatewayState, connection: &mut Connection, disconnect: Disconnect) {
    let Some(session) = connection.take_session() else {
        return;
    };
    let user_id = session.user_id();
    let keep = disconnect.keeps_session();

    // Retain before deregistering so no dispatch falls between the two
    if keep {
        state.registry().retain(session.clone());
    }
    let was_live = state.registry().deregister(&session);
    session.detach();
    session.set_state(SessionState::Closed);

    tracing::info!(
        session_id = %session.id(),
        user_id = %user_id,
        disconnect = ?disconnect,
        resumable = keep,
        age_secs = session.age().as_secs(),
        "Session closed"
    );

    if was_live && !state.registry().is_online(user_id) {
        if let Err(e) = PresenceHandler::announce(state, user_id, PresenceStatus::Offline).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to announce offline presence");
        }
    }

    if !keep {
        release(state, &session);
    }
}

/// Drop the subscriptions a session made, unless the user still has another
/// live or resumable session relying on them
pub fn release(state: &GatewayState, session: &Session) {
    let user_id = session.user_id();
    if state.registry().has_any_session(user_id) {
        return;
    }
    let subscriptions = session.subscriptions();
    for &(namespace, key) in &subscriptions {
        state.dispatcher().unsub(namespace, key, user_id);
    }
    tracing::debug!(
        session_id = %session.id(),
        user_id = %user_id,
        keys = subscriptions.len(),
        "Subscriptions released"
    );
}

/// Release every retained session whose resume window has passed
pub fn sweep_expired(state: &GatewayState) -> usize {
    let expired = state.registry().sweep_expired();
    for session in &expired {
        release(state, session);
    }
    if !expired.is_empty() {
        tracing::debug!(count = expired.len(), "Expired sessions swept");
    }
    expired.len()
}
