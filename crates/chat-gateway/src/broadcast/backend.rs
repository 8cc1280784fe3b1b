//! Dispatch backends
//!
//! One backend per namespace. A backend owns its subscription table and turns
//! a key into deliveries: snapshot the subscribers, resolve their sessions
//! through the registry, push to each. A failed push is logged and schedules
//! that session for close; it never stops the rest of the fanout.

use std::collections::HashSet;
use std::sync::Arc;

use chat_core::Snowflake;
use serde_json::Value;
use tracing::{trace, warn};

use super::{Namespace, SubscriptionTable};
use crate::connection::{Delivery, Session, SessionRegistry};
use crate::protocol::CloseCode;

/// Per-subscriber payload: `None` skips the subscriber
pub type PayloadFilter<'a> = &'a dyn Fn(Snowflake) -> Option<Value>;

pub trait DispatchBackend: Send + Sync {
    fn namespace(&self) -> Namespace;

    fn table(&self) -> &SubscriptionTable;

    fn registry(&self) -> &SessionRegistry;

    fn subscribe(&self, key: Snowflake, user_id: Snowflake) -> bool {
        self.table().subscribe(key, user_id)
    }

    fn unsubscribe(&self, key: Snowflake, user_id: Snowflake) -> bool {
        self.table().unsubscribe(key, user_id)
    }

    fn members(&self, key: Snowflake) -> Vec<Snowflake> {
        self.table().members(key)
    }

    fn reset(&self, key: Snowflake) {
        self.table().reset(key);
    }

    fn remove(&self, key: Snowflake) {
        self.table().remove(key);
    }

    /// Push `event` to every session subscribed to `key`, except those in
    /// `skip`. Returns the ids of the sessions reached.
    fn dispatch(
        &self,
        key: Snowflake,
        event: &str,
        data: &Value,
        skip: &HashSet<String>,
    ) -> Vec<String> {
        let members = self.members(key);
        trace!(namespace = %self.namespace(), key = %key, event = %event, subscribers = members.len(), "Dispatching");
        fanout(self.registry(), &members, event, skip, &|_| Some(data.clone()))
    }

    /// Like `dispatch`, with the payload chosen per subscriber
    fn dispatch_filter(
        &self,
        key: Snowflake,
        event: &str,
        filter: PayloadFilter<'_>,
        skip: &HashSet<String>,
    ) -> Vec<String> {
        let members = self.members(key);
        trace!(namespace = %self.namespace(), key = %key, event = %event, subscribers = members.len(), "Dispatching filtered");
        fanout(self.registry(), &members, event, skip, filter)
    }
}

/// Deliver to every session of `users`. `users` must already be a snapshot.
pub fn fanout(
    registry: &SessionRegistry,
    users: &[Snowflake],
    event: &str,
    skip: &HashSet<String>,
    filter: PayloadFilter<'_>,
) -> Vec<String> {
    let mut reached = Vec::new();
    for &user_id in users {
        let Some(data) = filter(user_id) else {
            continue;
        };
        for session in registry.deliverable_for_user(user_id) {
            if skip.contains(session.id()) {
                continue;
            }
            if push(&session, event, data.clone()) {
                reached.push(session.id().to_string());
            }
        }
    }
    reached
}

/// Push one event to one session. A retained session counts as reached since
/// the event will be replayed on resume.
pub fn push(session: &Session, event: &str, data: Value) -> bool {
    match session.dispatch(event, data) {
        Ok(Delivery::Sent) => true,
        Ok(Delivery::Buffered) => {
            trace!(session_id = %session.id(), event = %event, "Buffered for resume");
            true
        }
        Err(err) => {
            warn!(
                session_id = %session.id(),
                user_id = %session.user_id(),
                event = %event,
                error = %err,
                "Delivery failed, closing session"
            );
            session.schedule_close(CloseCode::UnknownError);
            false
        }
    }
}

/// Backend for namespaces with nothing beyond the subscriber set
pub struct SubscriberBackend {
    namespace: Namespace,
    table: SubscriptionTable,
    registry: Arc<SessionRegistry>,
}

impl SubscriberBackend {
    pub fn new(namespace: Namespace, registry: Arc<SessionRegistry>) -> Self {
        Self {
            namespace,
            table: SubscriptionTable::new(),
            registry,
        }
    }
}

impl DispatchBackend for SubscriberBackend {
    fn namespace(&self) -> Namespace {
        self.namespace
    }

    fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

/// `user` namespace: a user is implicitly subscribed to its own key
pub struct UserBackend {
    table: SubscriptionTable,
    registry: Arc<SessionRegistry>,
}

impl UserBackend {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            table: SubscriptionTable::new(),
            registry,
        }
    }
}

impl DispatchBackend for UserBackend {
    fn namespace(&self) -> Namespace {
        Namespace::User
    }

    fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn members(&self, key: Snowflake) -> Vec<Snowflake> {
        let mut members = self.table.members(key);
        if !members.contains(&key) {
            members.push(key);
        }
        members
    }
}
