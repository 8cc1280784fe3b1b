//! Subscription table
//!
//! Key to subscriber (user id) sets for one namespace. Readers only ever get
//! copies, so a fanout can iterate while the table keeps changing.

use std::collections::HashSet;

use chat_core::Snowflake;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct SubscriptionTable {
    keys: DashMap<Snowflake, HashSet<Snowflake>>,
}

impl SubscriptionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the user was not subscribed yet
    pub fn subscribe(&self, key: Snowflake, user_id: Snowflake) -> bool {
        self.keys.entry(key).or_default().insert(user_id)
    }

    /// Returns true when the user was subscribed. A key left without
    /// subscribers is dropped.
    pub fn unsubscribe(&self, key: Snowflake, user_id: Snowflake) -> bool {
        let removed = self
            .keys
            .get_mut(&key)
            .is_some_and(|mut users| users.remove(&user_id));
        if removed {
            self.keys.remove_if(&key, |_, users| users.is_empty());
        }
        removed
    }

    /// Copy of the current subscribers; unknown keys are empty
    pub fn members(&self, key: Snowflake) -> Vec<Snowflake> {
        self.keys
            .get(&key)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every subscriber but keep the key
    pub fn reset(&self, key: Snowflake) {
        if let Some(mut users) = self.keys.get_mut(&key) {
            users.clear();
        }
    }

    /// Forget the key entirely
    pub fn remove(&self, key: Snowflake) {
        self.keys.remove(&key);
    }

    pub fn contains_key(&self, key: Snowflake) -> bool {
        self.keys.contains_key(&key)
    }
}
