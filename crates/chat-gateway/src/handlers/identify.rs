//! Identify handler (op 2)

use super::{HandlerError, HandlerResult, PresenceHandler};
use crate::broadcast::Namespace;
use crate::connection::{Connection, Session, SessionState};
use crate::events::{GatewayEventType, PresenceStatus, ReadyEvent, ReadyGuild, Relationship};
use crate::protocol::{CloseCode, IdentifyPayload};
use crate::server::GatewayState;
use chat_core::{AuthError, Channel, Snowflake, Storage, User};
use std::collections::HashSet;

/// Member-list window every new session subscribes to
const DEFAULT_MEMBER_WINDOW: [usize; 2] = [0, 99];

/// Strip an optional `Bearer ` prefix
pub(super) fn bare_token(token: &str) -> &str {
    token.strip_prefix("Bearer ").unwrap_or(token)
}

/// Everything READY carries, loaded before any subscription is made
struct Snapshot {
    user: User,
    guilds: Vec<ReadyGuild>,
    /// guild_id -> member ids, for the member lists
    members: Vec<(Snowflake, Vec<Snowflake>)>,
    private_channels: Vec<Channel>,
    friends: Vec<Snowflake>,
}

impl Snapshot {
    async fn load(storage: &dyn Storage, user: User) -> HandlerResult<Self> {
        let user_id = user.id;
        let mut guilds = Vec::new();
        let mut members = Vec::new();

        for guild_id in storage.get_user_guilds(user_id).await? {
            let Some(guild) = storage.get_guild(guild_id).await? else {
                continue;
            };
            let mut channels = Vec::new();
            for channel_id in storage.get_channel_ids(guild_id).await? {
                if let Some(channel) = storage.get_channel(channel_id).await? {
                    channels.push(channel);
                }
            }
            let member_ids = storage.get_member_ids(guild_id).await?;
            guilds.push(ReadyGuild {
                guild,
                channels,
                member_count: member_ids.len(),
                unavailable: false,
            });
            members.push((guild_id, member_ids));
        }

        Ok(Self {
            guilds,
            members,
            private_channels: storage.get_private_channels(user_id).await?,
            friends: storage.get_friend_ids(user_id).await?,
            user,
        })
    }

    fn guild_ids(&self) -> HashSet<Snowflake> {
        self.guilds.iter().map(|g| g.guild.id).collect()
    }

    /// (namespace, key) pairs the user listens on
    fn subscription_keys(&self) -> Vec<(Namespace, Snowflake)> {
        let mut keys = Vec::new();
        for ready_guild in &self.guilds {
            keys.push((Namespace::Guild, ready_guild.guild.id));
            keys.extend(ready_guild.channels.iter().map(|c| (Namespace::Channel, c.id)));
        }
        keys.extend(self.private_channels.iter().map(|c| (Namespace::Channel, c.id)));
        keys.extend(self.friends.iter().map(|&f| (Namespace::Friend, f)));
        keys
    }
}

/// Handles Identify messages
pub struct IdentifyHandler;

impl IdentifyHandler {
    /// Authenticate, build the READY snapshot, subscribe and register.
    ///
    /// READY is queued before the session is registered, so it is always the
    /// first dispatch (sequence 1) the client sees.
    pub async fn handle(
        state: &GatewayState,
        connection: &mut Connection,
        payload: IdentifyPayload,
    ) -> HandlerResult<Option<CloseCode>> {
        let user_id = state
            .authenticator()
            .authenticate(bare_token(&payload.token))
            .inspect_err(|e| tracing::debug!(error = %e, "Identify token rejected"))?;

        let user = state
            .storage()
            .get_user(user_id)
            .await?
            .ok_or(HandlerError::AuthenticationFailed(AuthError::InvalidSubject))?;

        connection.set_state(SessionState::Identified);

        let snapshot = Snapshot::load(state.storage(), user).await?;
        let gateway = state.gateway_config();
        let session = Session::new(
            Session::generate_id(),
            user_id,
            connection.params(),
            gateway.heartbeat_interval_ms,
            gateway.replay_buffer_size,
            snapshot.guild_ids(),
        );

        let dispatcher = state.dispatcher();
        for (namespace, key) in snapshot.subscription_keys() {
            dispatcher.sub(namespace, key, user_id);
            session.track_subscription(namespace, key);
        }

        session.attach(connection.outbound());
        connection.set_session(session.clone());

        let ready = ReadyEvent {
            v: connection.params().version,
            user: snapshot.user,
            guilds: snapshot.guilds,
            private_channels: snapshot.private_channels,
            relationships: snapshot.friends.into_iter().map(Relationship::friend).collect(),
            session_id: session.id().to_string(),
            trace: state.trace(),
        };
        let ready = serde_json::to_value(&ready).map_err(|e| HandlerError::Internal(e.to_string()))?;
        session.dispatch(GatewayEventType::Ready.as_str(), ready)?;

        connection.set_state(SessionState::Ready);
        let was_online = state.registry().is_online(user_id);
        state.registry().register(session.clone());

        if !was_online {
            PresenceHandler::announce(state, user_id, PresenceStatus::Online).await?;
        }

        for (guild_id, member_ids) in &snapshot.members {
            dispatcher.member_lists().subscribe_window(
                *guild_id,
                user_id,
                member_ids.iter().copied(),
                vec![DEFAULT_MEMBER_WINDOW],
            );
            session.track_subscription(Namespace::LazyGuild, *guild_id);
        }

        tracing::info!(
            session_id = %session.id(),
            user_id = %user_id,
            guilds = snapshot.members.len(),
            online_users = state.registry().online_user_count(),
            "Session ready"
        );

        Ok(None)
    }
}
