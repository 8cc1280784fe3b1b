//! Event payload definitions

use chat_core::{Channel, Guild, PublicUser, Snowflake, User};
use serde::Serialize;

// === Connection Events ===

/// READY event payload
///
/// Snapshot of everything the client needs before steady-state events.
#[derive(Debug, Clone, Serialize)]
pub struct ReadyEvent {
    /// Gateway protocol version
    pub v: u8,
    /// Current user, private projection
    pub user: User,
    pub guilds: Vec<ReadyGuild>,
    pub private_channels: Vec<Channel>,
    /// Friends of the current user
    pub relationships: Vec<Relationship>,
    pub session_id: String,
    #[serde(rename = "_trace")]
    pub trace: Vec<String>,
}

/// RESUMED event payload
#[derive(Debug, Clone, Serialize)]
pub struct ResumedEvent {
    #[serde(rename = "_trace")]
    pub trace: Vec<String>,
}

/// Guild entry inside READY
#[derive(Debug, Clone, Serialize)]
pub struct ReadyGuild {
    #[serde(flatten)]
    pub guild: Guild,
    pub channels: Vec<Channel>,
    pub member_count: usize,
    pub unavailable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    pub id: Snowflake,
    /// 1 = friend
    #[serde(rename = "type")]
    pub kind: u8,
}

impl Relationship {
    #[must_use]
    pub fn friend(id: Snowflake) -> Self {
        Self { id, kind: 1 }
    }
}

// === Presence ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// PRESENCE_UPDATE event payload
#[derive(Debug, Clone, Serialize)]
pub struct PresenceEvent {
    pub user: UserIdPayload,
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UserIdPayload {
    pub id: Snowflake,
}

// === Guild Events ===

/// GUILD_DELETE event payload
#[derive(Debug, Clone, Serialize)]
pub struct GuildDeleteEvent {
    pub id: Snowflake,
    /// True for an outage; false when the user left or was removed
    pub unavailable: bool,
}

/// GUILD_MEMBER_REMOVE event payload
#[derive(Debug, Clone, Serialize)]
pub struct GuildMemberRemoveEvent {
    pub guild_id: Snowflake,
    pub user: PublicUser,
}

// === Member list ===

/// GUILD_MEMBER_LIST_UPDATE event payload
#[derive(Debug, Clone, Serialize)]
pub struct MemberListUpdateEvent {
    pub guild_id: Snowflake,
    /// Member list id; only the whole-guild list exists here
    pub id: &'static str,
    pub member_count: usize,
    pub online_count: usize,
    pub groups: Vec<MemberListGroup>,
    pub ops: Vec<MemberListOp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberListGroup {
    pub id: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberListOp {
    pub op: &'static str,
    pub range: [usize; 2],
    pub items: Vec<MemberListItem>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberListItem {
    Group(MemberListGroup),
    Member(MemberListEntry),
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberListEntry {
    pub user: UserIdPayload,
    pub status: PresenceStatus,
}
