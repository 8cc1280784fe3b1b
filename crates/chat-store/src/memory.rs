//! In-memory implementation of Storage

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::instrument;

use chat_core::entities::{Channel, Guild, User};
use chat_core::traits::{RepoResult, Storage};
use chat_core::value_objects::Snowflake;

/// Sharded in-memory projections.
///
/// Id sets are ordered so listings come back in id order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<Snowflake, User>,
    guilds: DashMap<Snowflake, Guild>,
    channels: DashMap<Snowflake, Channel>,
    /// guild_id -> member user ids
    members: DashMap<Snowflake, BTreeSet<Snowflake>>,
    /// user_id -> guild ids
    user_guilds: DashMap<Snowflake, BTreeSet<Snowflake>>,
    /// guild_id -> channel ids
    guild_channels: DashMap<Snowflake, BTreeSet<Snowflake>>,
    /// user_id -> DM channel ids
    private_channels: DashMap<Snowflake, BTreeSet<Snowflake>>,
    /// user_id -> friend ids (kept symmetric)
    friends: DashMap<Snowflake, BTreeSet<Snowflake>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Writers
    // ========================================================================

    pub fn upsert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn upsert_guild(&self, guild: Guild) {
        self.guilds.insert(guild.id, guild);
    }

    pub fn add_member(&self, guild_id: Snowflake, user_id: Snowflake) {
        self.members.entry(guild_id).or_default().insert(user_id);
        self.user_guilds.entry(user_id).or_default().insert(guild_id);
    }

    pub fn remove_member(&self, guild_id: Snowflake, user_id: Snowflake) {
        remove_from(&self.members, guild_id, user_id);
        remove_from(&self.user_guilds, user_id, guild_id);
    }

    /// Insert a guild channel or a DM, indexing it by guild or by recipients
    pub fn upsert_channel(&self, channel: Channel) {
        if let Some(guild_id) = channel.guild_id {
            self.guild_channels
                .entry(guild_id)
                .or_default()
                .insert(channel.id);
        }
        if channel.is_dm() {
            for recipient in &channel.recipients {
                self.private_channels
                    .entry(*recipient)
                    .or_default()
                    .insert(channel.id);
            }
        }
        self.channels.insert(channel.id, channel);
    }

    pub fn remove_channel(&self, channel_id: Snowflake) -> Option<Channel> {
        let (_, channel) = self.channels.remove(&channel_id)?;
        if let Some(guild_id) = channel.guild_id {
            remove_from(&self.guild_channels, guild_id, channel_id);
        }
        for recipient in &channel.recipients {
            remove_from(&self.private_channels, *recipient, channel_id);
        }
        Some(channel)
    }

    pub fn add_friendship(&self, a: Snowflake, b: Snowflake) {
        if a == b {
            return;
        }
        self.friends.entry(a).or_default().insert(b);
        self.friends.entry(b).or_default().insert(a);
    }

    pub fn remove_friendship(&self, a: Snowflake, b: Snowflake) {
        remove_from(&self.friends, a, b);
        remove_from(&self.friends, b, a);
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }
}

/// Drop `value` from the set at `key`, discarding the set once empty
fn remove_from(map: &DashMap<Snowflake, BTreeSet<Snowflake>>, key: Snowflake, value: Snowflake) {
    map.alter(&key, |_, mut set| {
        set.remove(&value);
        set
    });
    map.remove_if(&key, |_, set| set.is_empty());
}

fn ids_of(map: &DashMap<Snowflake, BTreeSet<Snowflake>>, key: Snowflake) -> Vec<Snowflake> {
    map.get(&key)
        .map(|set| set.iter().copied().collect())
        .unwrap_or_default()
}

#[async_trait]
impl Storage for MemoryStore {
    #[instrument(skip(self))]
    async fn get_user(&self, id: Snowflake) -> RepoResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    #[instrument(skip(self))]
    async fn get_friend_ids(&self, user_id: Snowflake) -> RepoResult<Vec<Snowflake>> {
        Ok(ids_of(&self.friends, user_id))
    }

    #[instrument(skip(self))]
    async fn get_private_channels(&self, user_id: Snowflake) -> RepoResult<Vec<Channel>> {
        Ok(ids_of(&self.private_channels, user_id)
            .into_iter()
            .filter_map(|id| self.channels.get(&id).map(|c| c.clone()))
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_guild(&self, id: Snowflake) -> RepoResult<Option<Guild>> {
        Ok(self.guilds.get(&id).map(|g| g.clone()))
    }

    #[instrument(skip(self))]
    async fn get_user_guilds(&self, user_id: Snowflake) -> RepoResult<Vec<Snowflake>> {
        Ok(ids_of(&self.user_guilds, user_id))
    }

    #[instrument(skip(self))]
    async fn get_member_ids(&self, guild_id: Snowflake) -> RepoResult<Vec<Snowflake>> {
        Ok(ids_of(&self.members, guild_id))
    }

    #[instrument(skip(self))]
    async fn get_channel(&self, id: Snowflake) -> RepoResult<Option<Channel>> {
        Ok(self.channels.get(&id).map(|c| c.clone()))
    }

    #[instrument(skip(self))]
    async fn get_channel_ids(&self, guild_id: Snowflake) -> RepoResult<Vec<Snowflake>> {
        Ok(ids_of(&self.guild_channels, guild_id))
    }
}
