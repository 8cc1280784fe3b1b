//! Session registry
//!
//! Tracks live sessions by id and by user, plus sessions that lost their
//! socket but may still be resumed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chat_core::Snowflake;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::Session;

struct Retained {
    session: Arc<Session>,
    expires_at: Instant,
}

pub struct SessionRegistry {
    /// Live sessions by session id
    sessions: DashMap<String, Arc<Session>>,

    /// User id to live session ids
    by_user: DashMap<Snowflake, HashSet<String>>,

    /// Detached sessions awaiting RESUME
    retained: DashMap<String, Retained>,

    /// User id to retained session ids
    retained_by_user: DashMap<Snowflake, HashSet<String>>,

    /// Held for writing while a session moves between the live and retained
    /// sets, and for reading by `deliverable_for_user`
    transition: RwLock<()>,

    resume_window: Duration,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(resume_window: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: DashMap::new(),
            retained: DashMap::new(),
            retained_by_user: DashMap::new(),
            transition: RwLock::new(()),
            resume_window,
        }
    }

    #[must_use]
    pub fn new_shared(resume_window: Duration) -> Arc<Self> {
        Arc::new(Self::new(resume_window))
    }

    /// Make a session reachable for dispatch
    pub fn register(&self, session: Arc<Session>) {
        let _guard = self.transition.write();
        self.insert_live(session);
    }

    fn insert_live(&self, session: Arc<Session>) {
        let session_id = session.id().to_string();
        let user_id = session.user_id();

        // By id first: a user index entry must always resolve
        self.sessions.insert(session_id.clone(), session);
        self.by_user
            .entry(user_id)
            .or_default()
            .insert(session_id.clone());

        tracing::debug!(session_id = %session_id, user_id = %user_id, "Session registered");
    }

    /// Remove a live session. Returns false when it was not registered.
    pub fn deregister(&self, session: &Session) -> bool {
        let session_id = session.id();
        let _guard = self.transition.write();
        if self.sessions.remove(session_id).is_none() {
            return false;
        }
        remove_id(&self.by_user, session.user_id(), session_id);

        tracing::debug!(session_id = %session_id, user_id = %session.user_id(), "Session deregistered");
        true
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Live sessions of a user
    pub fn sessions_for_user(&self, user_id: Snowflake) -> Vec<Arc<Session>> {
        collect(&self.by_user, user_id, |id| self.get(id))
    }

    /// Sessions a dispatch should reach: live ones plus retained ones, whose
    /// replay buffers keep filling until they are resumed or expire
    ///
    /// A session moving from live to retained may briefly sit in both sets; it
    /// is listed once.
    pub fn deliverable_for_user(&self, user_id: Snowflake) -> Vec<Arc<Session>> {
        let _guard = self.transition.read();
        let mut sessions = self.sessions_for_user(user_id);
        for retained in collect(&self.retained_by_user, user_id, |id| {
            self.retained.get(id).map(|r| r.session.clone())
        }) {
            if !sessions.iter().any(|s| s.id() == retained.id()) {
                sessions.push(retained);
            }
        }
        sessions
    }

    pub fn is_online(&self, user_id: Snowflake) -> bool {
        self.by_user.contains_key(&user_id)
    }

    /// Live or retained sessions remain for the user
    pub fn has_any_session(&self, user_id: Snowflake) -> bool {
        self.by_user.contains_key(&user_id) || self.retained_by_user.contains_key(&user_id)
    }

    // === Resume support ===

    /// Keep a detached session resumable for the resume window
    pub fn retain(&self, session: Arc<Session>) {
        let session_id = session.id().to_string();
        let user_id = session.user_id();
        let _guard = self.transition.write();
        self.retained_by_user
            .entry(user_id)
            .or_default()
            .insert(session_id.clone());
        self.retained.insert(
            session_id.clone(),
            Retained {
                session,
                expires_at: Instant::now() + self.resume_window,
            },
        );

        tracing::debug!(session_id = %session_id, user_id = %user_id, "Session retained for resume");
    }

    /// Move a retained session back to the live set if it has not expired and
    /// `accept` approves it. Anything else stays put; expired entries are left
    /// to the sweeper.
    ///
    /// The session is live before its retained entry goes away, so a
    /// concurrent dispatch always finds it in one set or the other.
    pub fn revive(
        &self,
        session_id: &str,
        accept: impl Fn(&Session) -> bool,
    ) -> Option<Arc<Session>> {
        let _guard = self.transition.write();
        let session = {
            let retained = self.retained.get(session_id)?;
            if retained.expires_at <= Instant::now() || !accept(&retained.session) {
                return None;
            }
            retained.session.clone()
        };

        self.insert_live(session.clone());
        if self.retained.remove(session_id).is_some() {
            remove_id(&self.retained_by_user, session.user_id(), session_id);
        }

        tracing::debug!(session_id = %session_id, user_id = %session.user_id(), "Session revived");
        Some(session)
    }

    /// Drop retained sessions past their window and hand them back for cleanup
    pub fn sweep_expired(&self) -> Vec<Arc<Session>> {
        let now = Instant::now();
        let expired: Vec<String> = self
            .retained
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        let _guard = self.transition.write();
        expired
            .into_iter()
            .filter_map(|id| {
                let (_, retained) = self.retained.remove_if(&id, |_, r| r.expires_at <= now)?;
                remove_id(&self.retained_by_user, retained.session.user_id(), &id);
                Some(retained.session)
            })
            .collect()
    }

    // === Stats ===

    pub fn live_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }

    pub fn online_user_count(&self) -> usize {
        self.by_user.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

/// Drop `session_id` from the user's set, removing the entry once empty
fn remove_id(map: &DashMap<Snowflake, HashSet<String>>, user_id: Snowflake, session_id: &str) {
    map.alter(&user_id, |_, mut ids| {
        ids.remove(session_id);
        ids
    });
    map.remove_if(&user_id, |_, ids| ids.is_empty());
}

fn collect(
    map: &DashMap<Snowflake, HashSet<String>>,
    user_id: Snowflake,
    lookup: impl Fn(&str) -> Option<Arc<Session>>,
) -> Vec<Arc<Session>> {
    // Clone the ids first so no shard lock is held during lookup
    let ids: Vec<String> = map
        .get(&user_id)
        .map(|ids| ids.iter().cloned().collect())
        .unwrap_or_default();
    ids.iter().filter_map(|id| lookup(id)).collect()
}
