//! Authenticated gateway session
//!
//! A session outlives the socket that created it: when the socket drops with a
//! resumable close, the session is detached from its transport and kept in the
//! registry's retained set, still accepting dispatches into its replay buffer,
//! until a RESUME attaches a new socket or the resume window lapses.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chat_core::Snowflake;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use crate::broadcast::Namespace;
use crate::events::GatewayEventType;
use crate::protocol::codec::{self, CodecError, WireFrame};
use crate::protocol::{CloseCode, ConnectParams, GatewayMessage};

/// What the connection's writer task consumes
#[derive(Debug)]
pub enum Outbound {
    Frame(WireFrame),
    /// Written back to back with nothing interleaved (resume replay)
    Batch(Vec<WireFrame>),
    Close(CloseCode, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket accepted, HELLO sent, nothing authenticated yet
    Connected,
    /// Credentials accepted, READY being assembled
    Identified,
    /// RESUME accepted, replay in progress
    Resuming,
    Ready,
    Closing,
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Identified | Self::Resuming | Self::Ready)
    }
}

/// How a dispatch was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on a live transport
    Sent,
    /// Session is detached; only the replay buffer got it
    Buffered,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport closed")]
    Closed,
    #[error("outbound queue full")]
    Full,
    #[error(transparent)]
    Encode(#[from] CodecError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResumeError {
    /// Client claims a sequence the server never sent
    #[error("sequence {claimed} is ahead of {current}")]
    SequenceAhead { claimed: u64, current: u64 },
    /// Events after the client's sequence were evicted
    #[error("events after {0} are no longer retained")]
    ReplayGap(u64),
    #[error("transport closed during replay")]
    Transport,
    #[error("replay could not be encoded")]
    Encode,
}

#[derive(Debug, Clone)]
struct ReplayEntry {
    seq: u64,
    event: String,
    data: Value,
}

#[derive(Debug)]
struct SessionInner {
    seq: u64,
    replay: VecDeque<ReplayEntry>,
    transport: Option<mpsc::Sender<Outbound>>,
    last_heartbeat_ack: Instant,
    /// Keys this session's user was subscribed to on its behalf
    subscriptions: HashSet<(Namespace, Snowflake)>,
    /// Guilds for `dispatch_user_guild`: those loaded in READY, minus any the
    /// user has since left
    guilds: HashSet<Snowflake>,
}

impl SessionInner {
    fn record(&mut self, seq: u64, event: &str, data: Value, limit: usize) {
        self.seq = seq;
        if limit == 0 {
            return;
        }
        while self.replay.len() >= limit {
            self.replay.pop_front();
        }
        self.replay.push_back(ReplayEntry {
            seq,
            event: event.to_string(),
            data,
        });
    }
}

pub struct Session {
    id: String,
    user_id: Snowflake,
    params: ConnectParams,
    heartbeat_interval_ms: u64,
    replay_limit: usize,
    state: Mutex<SessionState>,
    inner: Mutex<SessionInner>,
    close_requested: Notify,
    pending_close: Mutex<Option<CloseCode>>,
    created_at: Instant,
}

impl Session {
    /// Fresh, time-ordered session id
    pub fn generate_id() -> String {
        uuid::Uuid::now_v7().simple().to_string()
    }

    pub fn new(
        id: String,
        user_id: Snowflake,
        params: ConnectParams,
        heartbeat_interval_ms: u64,
        replay_limit: usize,
        guilds: HashSet<Snowflake>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            user_id,
            params,
            heartbeat_interval_ms,
            replay_limit,
            state: Mutex::new(SessionState::Identified),
            inner: Mutex::new(SessionInner {
                seq: 0,
                replay: VecDeque::new(),
                transport: None,
                last_heartbeat_ack: Instant::now(),
                subscriptions: HashSet::new(),
                guilds,
            }),
            close_requested: Notify::new(),
            pending_close: Mutex::new(None),
            created_at: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Snowflake {
        self.user_id
    }

    pub fn params(&self) -> ConnectParams {
        self.params
    }

    pub fn heartbeat_interval_ms(&self) -> u64 {
        self.heartbeat_interval_ms
    }

    pub fn has_guild(&self, guild_id: Snowflake) -> bool {
        self.inner.lock().guilds.contains(&guild_id)
    }

    /// Stop treating `guild_id` as one of this session's guilds
    pub fn forget_guild(&self, guild_id: Snowflake) -> bool {
        self.inner.lock().guilds.remove(&guild_id)
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    pub fn last_sequence(&self) -> u64 {
        self.inner.lock().seq
    }

    pub fn is_attached(&self) -> bool {
        self.inner.lock().transport.is_some()
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub fn record_heartbeat_ack(&self) {
        self.inner.lock().last_heartbeat_ack = Instant::now();
    }

    pub fn since_heartbeat_ack(&self) -> std::time::Duration {
        self.inner.lock().last_heartbeat_ack.elapsed()
    }

    // === Transport ===

    pub fn attach(&self, transport: mpsc::Sender<Outbound>) {
        self.inner.lock().transport = Some(transport);
    }

    /// Drop the transport; later dispatches only fill the replay buffer
    pub fn detach(&self) {
        self.inner.lock().transport = None;
    }

    /// Push one dispatch.
    ///
    /// The sequence number is assigned and the event retained under the
    /// session lock, so concurrent dispatchers see a single total order. A
    /// frame that fails to encode consumes no sequence number. A closed or full
    /// transport still retains the event for replay and detaches the session.
    pub fn dispatch(&self, event: &str, data: Value) -> Result<Delivery, DeliveryError> {
        let mut inner = self.inner.lock();
        let seq = inner.seq + 1;

        let Some(transport) = inner.transport.clone() else {
            inner.record(seq, event, data, self.replay_limit);
            return Ok(Delivery::Buffered);
        };

        let message = GatewayMessage::dispatch(event, seq, data);
        let frame = codec::encode(&message, self.params.encoding)?;
        let data = message.d.unwrap_or(Value::Null);

        match transport.try_send(Outbound::Frame(frame)) {
            Ok(()) => {
                inner.record(seq, event, data, self.replay_limit);
                Ok(Delivery::Sent)
            }
            Err(err) => {
                inner.record(seq, event, data, self.replay_limit);
                inner.transport = None;
                Err(match err {
                    mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
                    mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
                })
            }
        }
    }

    /// Queue a control frame (no sequence number) on the live transport
    pub fn send_control(&self, message: &GatewayMessage) -> Result<(), DeliveryError> {
        let inner = self.inner.lock();
        let Some(transport) = &inner.transport else {
            return Err(DeliveryError::Closed);
        };
        let frame = codec::encode(message, self.params.encoding)?;
        transport
            .try_send(Outbound::Frame(frame))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    /// Attach a new transport, replaying everything after `after_seq` followed
    /// by RESUMED, as one uninterrupted batch.
    pub fn resume(
        &self,
        transport: mpsc::Sender<Outbound>,
        after_seq: u64,
        resumed: Value,
    ) -> Result<usize, ResumeError> {
        let mut inner = self.inner.lock();

        if after_seq > inner.seq {
            return Err(ResumeError::SequenceAhead {
                claimed: after_seq,
                current: inner.seq,
            });
        }
        let oldest = inner.replay.front().map_or(inner.seq + 1, |e| e.seq);
        if after_seq < inner.seq && oldest > after_seq + 1 {
            return Err(ResumeError::ReplayGap(after_seq));
        }

        let encoding = self.params.encoding;
        let mut frames = inner
            .replay
            .iter()
            .filter(|entry| entry.seq > after_seq)
            .map(|entry| {
                let message = GatewayMessage::dispatch(&entry.event, entry.seq, entry.data.clone());
                codec::encode(&message, encoding)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ResumeError::Encode)?;
        let replayed = frames.len();

        let seq = inner.seq + 1;
        let event = GatewayEventType::Resumed.as_str();
        let message = GatewayMessage::dispatch(event, seq, resumed);
        frames.push(codec::encode(&message, encoding).map_err(|_| ResumeError::Encode)?);

        transport
            .try_send(Outbound::Batch(frames))
            .map_err(|_| ResumeError::Transport)?;

        inner.record(seq, event, message.d.unwrap_or(Value::Null), self.replay_limit);
        inner.transport = Some(transport);
        inner.last_heartbeat_ack = Instant::now();
        *self.pending_close.lock() = None;
        Ok(replayed)
    }

    // === Close scheduling ===

    /// Ask the owning connection task to close; the first code wins
    pub fn schedule_close(&self, code: CloseCode) {
        let mut pending = self.pending_close.lock();
        if pending.is_none() {
            *pending = Some(code);
            self.close_requested.notify_one();
        }
    }

    /// Resolves once `schedule_close` was called
    pub async fn close_requested(&self) -> CloseCode {
        loop {
            if let Some(code) = *self.pending_close.lock() {
                return code;
            }
            self.close_requested.notified().await;
        }
    }

    // === Subscription bookkeeping ===

    pub fn track_subscription(&self, namespace: Namespace, key: Snowflake) {
        self.inner.lock().subscriptions.insert((namespace, key));
    }

    pub fn forget_subscription(&self, namespace: Namespace, key: Snowflake) {
        self.inner.lock().subscriptions.remove(&(namespace, key));
    }

    pub fn subscriptions(&self) -> Vec<(Namespace, Snowflake)> {
        self.inner.lock().subscriptions.iter().copied().collect()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
