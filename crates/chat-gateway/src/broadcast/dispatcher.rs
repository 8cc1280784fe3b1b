//! Event dispatcher
//!
//! Single entry point for pushing events to sessions. Routes each call to
//! the backend of its namespace.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chat_core::Snowflake;
use serde_json::Value;
use tracing::{debug, warn};

use super::backend::{fanout, push, DispatchBackend, PayloadFilter, SubscriberBackend, UserBackend};
use super::member_list::MemberListBackend;
use super::Namespace;
use crate::connection::SessionRegistry;

pub struct EventDispatcher {
    registry: Arc<SessionRegistry>,
    backends: HashMap<Namespace, Arc<dyn DispatchBackend>>,
    member_lists: Arc<MemberListBackend>,
}

impl EventDispatcher {
    /// Dispatcher with one backend per namespace, all resolving sessions
    /// through `registry`
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        let member_lists = Arc::new(MemberListBackend::new(registry.clone()));

        let mut backends: HashMap<Namespace, Arc<dyn DispatchBackend>> = HashMap::new();
        for namespace in [Namespace::Channel, Namespace::Guild, Namespace::Friend] {
            backends.insert(
                namespace,
                Arc::new(SubscriberBackend::new(namespace, registry.clone())),
            );
        }
        backends.insert(Namespace::User, Arc::new(UserBackend::new(registry.clone())));
        backends.insert(Namespace::LazyGuild, member_lists.clone());

        Self {
            registry,
            backends,
            member_lists,
        }
    }

    pub fn new_shared(registry: Arc<SessionRegistry>) -> Arc<Self> {
        Arc::new(Self::new(registry))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn member_lists(&self) -> &MemberListBackend {
        &self.member_lists
    }

    fn backend(&self, namespace: Namespace) -> Option<&Arc<dyn DispatchBackend>> {
        let backend = self.backends.get(&namespace);
        if backend.is_none() {
            warn!(namespace = %namespace, "No backend for namespace");
        }
        backend
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Push to every session subscribed to `(namespace, key)`
    pub fn dispatch(&self, namespace: Namespace, key: Snowflake, event: &str, data: &Value) -> Vec<String> {
        self.backend(namespace)
            .map(|b| b.dispatch(key, event, data, &HashSet::new()))
            .unwrap_or_default()
    }

    pub fn dispatch_filter(
        &self,
        namespace: Namespace,
        key: Snowflake,
        event: &str,
        filter: PayloadFilter<'_>,
    ) -> Vec<String> {
        self.backend(namespace)
            .map(|b| b.dispatch_filter(key, event, filter, &HashSet::new()))
            .unwrap_or_default()
    }

    /// Push to every session of the user, regardless of subscriptions
    pub fn dispatch_user(&self, user_id: Snowflake, event: &str, data: &Value) -> Vec<String> {
        fanout(&self.registry, &[user_id], event, &HashSet::new(), &|_| Some(data.clone()))
    }

    /// Push to the user's sessions that still hold `guild_id`
    pub fn dispatch_user_guild(
        &self,
        user_id: Snowflake,
        guild_id: Snowflake,
        event: &str,
        data: &Value,
    ) -> Vec<String> {
        self.registry
            .deliverable_for_user(user_id)
            .into_iter()
            .filter(|session| session.has_guild(guild_id))
            .filter(|session| push(session, event, data.clone()))
            .map(|session| session.id().to_string())
            .collect()
    }

    pub fn dispatch_guild(&self, guild_id: Snowflake, event: &str, data: &Value) -> Vec<String> {
        self.dispatch(Namespace::Guild, guild_id, event, data)
    }

    /// One `dispatch` per key, in order; a session subscribed to several keys
    /// receives the event once per key
    pub fn dispatch_many(
        &self,
        namespace: Namespace,
        keys: &[Snowflake],
        event: &str,
        data: &Value,
    ) -> Vec<String> {
        keys.iter()
            .flat_map(|&key| self.dispatch(namespace, key, event, data))
            .collect()
    }

    /// Dispatch over several keys reaching each session at most once, and
    /// never a session listed in `already_reached`. Returns the sessions this
    /// call reached so callers can thread it into the next call.
    pub fn dispatch_many_filter_list(
        &self,
        namespace: Namespace,
        keys: &[Snowflake],
        already_reached: &[String],
        event: &str,
        data: &Value,
    ) -> Vec<String> {
        let Some(backend) = self.backend(namespace) else {
            return Vec::new();
        };
        let mut skip: HashSet<String> = already_reached.iter().cloned().collect();
        let mut reached = Vec::new();
        for &key in keys {
            let sessions = backend.dispatch(key, event, data, &skip);
            skip.extend(sessions.iter().cloned());
            reached.extend(sessions);
        }
        reached
    }

    /// Snapshot the subscribers, drop the key, then deliver to the snapshot
    pub fn dispatch_and_remove(
        &self,
        namespace: Namespace,
        key: Snowflake,
        event: &str,
        data: &Value,
    ) -> Vec<String> {
        let Some(backend) = self.backend(namespace) else {
            return Vec::new();
        };
        let subscribers = backend.members(key);
        backend.remove(key);
        debug!(namespace = %namespace, key = %key, subscribers = subscribers.len(), "Key removed");
        fanout(&self.registry, &subscribers, event, &HashSet::new(), &|_| Some(data.clone()))
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub fn sub(&self, namespace: Namespace, key: Snowflake, user_id: Snowflake) -> bool {
        self.backend(namespace)
            .is_some_and(|b| b.subscribe(key, user_id))
    }

    pub fn unsub(&self, namespace: Namespace, key: Snowflake, user_id: Snowflake) -> bool {
        self.backend(namespace)
            .is_some_and(|b| b.unsubscribe(key, user_id))
    }

    pub fn reset(&self, namespace: Namespace, key: Snowflake) {
        if let Some(backend) = self.backend(namespace) {
            backend.reset(key);
        }
    }

    pub fn remove(&self, namespace: Namespace, key: Snowflake) {
        if let Some(backend) = self.backend(namespace) {
            backend.remove(key);
        }
    }

    pub fn members(&self, namespace: Namespace, key: Snowflake) -> Vec<Snowflake> {
        self.backend(namespace)
            .map(|b| b.members(key))
            .unwrap_or_default()
    }
}
