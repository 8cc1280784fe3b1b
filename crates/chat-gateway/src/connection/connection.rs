//! Per-socket state
//!
//! Owned by the connection task. Everything that may be touched from other
//! tasks lives on the shared `Session` instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{DeliveryError, Outbound, Session, SessionState};
use crate::protocol::codec;
use crate::protocol::{CloseCode, ConnectParams, GatewayMessage};

/// How long a close frame may wait for room in the outbound queue
const CLOSE_SEND_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Connection {
    params: ConnectParams,
    state: SessionState,
    outbound: mpsc::Sender<Outbound>,
    session: Option<Arc<Session>>,
    heartbeat_timeout: Duration,
    deadline: Instant,
    /// Close code chosen by the server, if it initiated the close
    close_code: Option<CloseCode>,
}

impl Connection {
    /// Fresh connection in `Connected`, with the heartbeat deadline armed
    pub fn new(
        params: ConnectParams,
        outbound: mpsc::Sender<Outbound>,
        heartbeat_timeout: Duration,
    ) -> Self {
        Self {
            params,
            state: SessionState::Connected,
            outbound,
            session: None,
            heartbeat_timeout,
            deadline: Instant::now() + heartbeat_timeout,
            close_code: None,
        }
    }

    pub fn params(&self) -> ConnectParams {
        self.params
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
        if let Some(session) = &self.session {
            session.set_state(state);
        }
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn set_session(&mut self, session: Arc<Session>) {
        self.session = Some(session);
    }

    pub fn take_session(&mut self) -> Option<Arc<Session>> {
        self.session.take()
    }

    /// Sender handed to a session when it is attached to this socket
    pub fn outbound(&self) -> mpsc::Sender<Outbound> {
        self.outbound.clone()
    }

    // === Heartbeat ===

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Push the heartbeat deadline out by a full timeout
    pub fn record_heartbeat(&mut self) {
        self.deadline = Instant::now() + self.heartbeat_timeout;
        if let Some(session) = &self.session {
            session.record_heartbeat_ack();
        }
    }

    // === Outbound ===

    /// Send a control frame (no sequence number)
    pub async fn send(&self, message: &GatewayMessage) -> Result<(), DeliveryError> {
        let frame = codec::encode(message, self.params.encoding)?;
        self.outbound
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| DeliveryError::Closed)
    }

    /// Queue a close frame and move to `Closing`
    pub async fn close(&mut self, code: CloseCode, reason: impl Into<String>) {
        if self.close_code.is_some() {
            return;
        }
        self.close_code = Some(code);
        self.set_state(SessionState::Closing);
        // A gone or wedged writer means nobody is listening for the close
        let _ = tokio::time::timeout(
            CLOSE_SEND_TIMEOUT,
            self.outbound.send(Outbound::Close(code, reason.into())),
        )
        .await;
    }

    pub fn close_code(&self) -> Option<CloseCode> {
        self.close_code
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("params", &self.params)
            .field("state", &self.state)
            .field("session", &self.session.as_ref().map(|s| s.id().to_string()))
            .field("close_code", &self.close_code)
            .finish_non_exhaustive()
    }
}
