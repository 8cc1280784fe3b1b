//! Presence announcements
//!
//! A user is online while it has at least one live session.

use super::{HandlerError, HandlerResult};
use crate::broadcast::{MemberListChange, Namespace};
use crate::events::{GatewayEventType, PresenceEvent, PresenceStatus, UserIdPayload};
use crate::server::GatewayState;
use chat_core::Snowflake;

/// Broadcasts presence changes
pub struct PresenceHandler;

impl PresenceHandler {
    /// Send PRESENCE_UPDATE across the user's guilds and friends, each
    /// session at most once, then refresh the guilds' member lists.
    pub async fn announce(
        state: &GatewayState,
        user_id: Snowflake,
        status: PresenceStatus,
    ) -> HandlerResult<Vec<String>> {
        let guild_ids = state.storage().get_user_guilds(user_id).await?;
        let presence = PresenceEvent {
            user: UserIdPayload { id: user_id },
            status,
            guild_id: None,
        };
        let data = serde_json::to_value(&presence)
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        let event = GatewayEventType::PresenceUpdate.as_str();

        let dispatcher = state.dispatcher();
        let mut reached =
            dispatcher.dispatch_many_filter_list(Namespace::Guild, &guild_ids, &[], event, &data);
        let from_friends =
            dispatcher.dispatch_many_filter_list(Namespace::Friend, &[user_id], &reached, event, &data);
        reached.extend(from_friends);

        let user_value = serde_json::json!(user_id);
        for &guild_id in &guild_ids {
            dispatcher.dispatch(
                Namespace::LazyGuild,
                guild_id,
                MemberListChange::UpdateUser.as_str(),
                &user_value,
            );
        }

        tracing::debug!(
            user_id = %user_id,
            status = status.as_str(),
            reached = reached.len(),
            "Presence announced"
        );
        Ok(reached)
    }
}
