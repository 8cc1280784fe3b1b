//! JSON seed documents for `MemoryStore`
//!
//! ```json
//! {
//!   "users": [{"id": "1", "username": "ana", "discriminator": "0001"}],
//!   "guilds": [{"id": "100", "name": "home", "owner_id": "1",
//!               "members": ["1"],
//!               "channels": [{"id": "10", "type": 0, "name": "general"}]}],
//!   "private_channels": [{"id": "20", "type": 1, "recipients": ["1", "2"]}],
//!   "friendships": [["1", "2"]]
//! }
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use chat_common::AppError;
use chat_core::entities::{Channel, Guild, User};
use chat_core::value_objects::Snowflake;

use crate::memory::MemoryStore;

#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub guilds: Vec<SeedGuild>,
    #[serde(default)]
    pub private_channels: Vec<Channel>,
    #[serde(default)]
    pub friendships: Vec<(Snowflake, Snowflake)>,
}

/// A guild together with its members and channels
#[derive(Debug, Deserialize)]
pub struct SeedGuild {
    #[serde(flatten)]
    pub guild: Guild,
    #[serde(default)]
    pub members: Vec<Snowflake>,
    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl Seed {
    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw).map_err(AppError::seed)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let seed = Self::from_json(&raw)?;
        info!(path = %path.display(), users = seed.users.len(), guilds = seed.guilds.len(), "Loaded store seed");
        Ok(seed)
    }

    /// Copy everything into the store. Guild channels inherit the guild id.
    pub fn apply(self, store: &MemoryStore) {
        for user in self.users {
            store.upsert_user(user);
        }

        for SeedGuild {
            guild,
            members,
            channels,
        } in self.guilds
        {
            let guild_id = guild.id;
            // the owner is always a member
            store.add_member(guild_id, guild.owner_id);
            store.upsert_guild(guild);
            for member in members {
                store.add_member(guild_id, member);
            }
            for mut channel in channels {
                channel.guild_id = Some(guild_id);
                store.upsert_channel(channel);
            }
        }

        for channel in self.private_channels {
            store.upsert_channel(channel);
        }

        for (a, b) in self.friendships {
            store.add_friendship(a, b);
        }
    }
}
