//! Structural flows
//!
//! Multi-step dispatches that also change who is subscribed to what.

use chat_core::{Channel, DomainError, Snowflake, Storage};
use serde_json::Value;
use tracing::info;

use super::member_list::MemberListChange;
use super::{EventDispatcher, Namespace};
use crate::events::{GatewayEventType, GuildDeleteEvent, GuildMemberRemoveEvent};

fn to_value<T: serde::Serialize>(payload: &T) -> Result<Value, DomainError> {
    serde_json::to_value(payload).map_err(|e| DomainError::InternalError(e.to_string()))
}

impl EventDispatcher {
    /// Push a user's changed profile: the private projection to the user's
    /// own sessions, the public one to its guilds and then its friends, each
    /// session at most once. Member lists of its guilds are refreshed last.
    pub async fn mass_user_update(
        &self,
        storage: &dyn Storage,
        user_id: Snowflake,
    ) -> Result<Vec<String>, DomainError> {
        let user = storage
            .get_user(user_id)
            .await?
            .ok_or(DomainError::UserNotFound(user_id))?;
        let event = GatewayEventType::UserUpdate.as_str();

        let mut reached = self.dispatch_user(user_id, event, &to_value(&user)?);

        let public = to_value(&user.public())?;
        let guild_ids = storage.get_user_guilds(user_id).await?;
        let from_guilds =
            self.dispatch_many_filter_list(Namespace::Guild, &guild_ids, &reached, event, &public);
        reached.extend(from_guilds);

        let from_friends =
            self.dispatch_many_filter_list(Namespace::Friend, &[user_id], &reached, event, &public);
        reached.extend(from_friends);

        let user_value = to_value(&user_id)?;
        for guild_id in guild_ids {
            self.dispatch(
                Namespace::LazyGuild,
                guild_id,
                MemberListChange::UpdateUser.as_str(),
                &user_value,
            );
        }

        Ok(reached)
    }

    /// Take a member out of a guild: its sessions that loaded the guild get
    /// GUILD_DELETE and lose the guild's keys, the remaining subscribers get
    /// GUILD_MEMBER_REMOVE.
    pub async fn remove_guild_member(
        &self,
        storage: &dyn Storage,
        guild_id: Snowflake,
        user_id: Snowflake,
    ) -> Result<(), DomainError> {
        let user = storage
            .get_user(user_id)
            .await?
            .ok_or(DomainError::UserNotFound(user_id))?;

        let delete = GuildDeleteEvent {
            id: guild_id,
            unavailable: false,
        };
        self.dispatch_user_guild(
            user_id,
            guild_id,
            GatewayEventType::GuildDelete.as_str(),
            &to_value(&delete)?,
        );

        let mut keys = vec![(Namespace::Guild, guild_id), (Namespace::LazyGuild, guild_id)];
        keys.extend(
            storage
                .get_channel_ids(guild_id)
                .await?
                .into_iter()
                .map(|channel_id| (Namespace::Channel, channel_id)),
        );
        let sessions = self.registry().deliverable_for_user(user_id);
        for session in &sessions {
            session.forget_guild(guild_id);
        }
        for (namespace, key) in keys {
            self.unsub(namespace, key, user_id);
            for session in &sessions {
                session.forget_subscription(namespace, key);
            }
        }

        self.dispatch(
            Namespace::LazyGuild,
            guild_id,
            MemberListChange::RemoveMember.as_str(),
            &to_value(&user_id)?,
        );

        let removed = GuildMemberRemoveEvent {
            guild_id,
            user: user.public(),
        };
        self.dispatch_guild(
            guild_id,
            GatewayEventType::GuildMemberRemove.as_str(),
            &to_value(&removed)?,
        );

        info!(guild_id = %guild_id, user_id = %user_id, "Guild member removed");
        Ok(())
    }

    /// Tell the channel's subscribers it is gone and drop its key
    pub fn delete_channel(&self, channel: &Channel) -> Vec<String> {
        let reached = self.dispatch_and_remove(
            Namespace::Channel,
            channel.id,
            GatewayEventType::ChannelDelete.as_str(),
            &channel.to_value(),
        );
        info!(channel_id = %channel.id, reached = reached.len(), "Channel deleted");
        reached
    }
}
