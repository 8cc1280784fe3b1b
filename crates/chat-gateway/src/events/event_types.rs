//! Gateway event names
//!
//! These are the event names sent in the `t` field of dispatch messages.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayEventType {
    // Connection events
    /// Sent after successful Identify
    Ready,
    /// Sent after successful Resume
    Resumed,

    // Guild events
    GuildCreate,
    GuildDelete,
    GuildMemberAdd,
    GuildMemberRemove,
    /// Presence-aware member list delta
    GuildMemberListUpdate,

    // Channel events
    ChannelCreate,
    ChannelDelete,
    TypingStart,

    // Message events
    MessageCreate,
    MessageAck,

    // User events
    PresenceUpdate,
    UserUpdate,
}

impl GatewayEventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::GuildMemberAdd => "GUILD_MEMBER_ADD",
            Self::GuildMemberRemove => "GUILD_MEMBER_REMOVE",
            Self::GuildMemberListUpdate => "GUILD_MEMBER_LIST_UPDATE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::TypingStart => "TYPING_START",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageAck => "MESSAGE_ACK",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::UserUpdate => "USER_UPDATE",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "READY" => Some(Self::Ready),
            "RESUMED" => Some(Self::Resumed),
            "GUILD_CREATE" => Some(Self::GuildCreate),
            "GUILD_DELETE" => Some(Self::GuildDelete),
            "GUILD_MEMBER_ADD" => Some(Self::GuildMemberAdd),
            "GUILD_MEMBER_REMOVE" => Some(Self::GuildMemberRemove),
            "GUILD_MEMBER_LIST_UPDATE" => Some(Self::GuildMemberListUpdate),
            "CHANNEL_CREATE" => Some(Self::ChannelCreate),
            "CHANNEL_DELETE" => Some(Self::ChannelDelete),
            "TYPING_START" => Some(Self::TypingStart),
            "MESSAGE_CREATE" => Some(Self::MessageCreate),
            "MESSAGE_ACK" => Some(Self::MessageAck),
            "PRESENCE_UPDATE" => Some(Self::PresenceUpdate),
            "USER_UPDATE" => Some(Self::UserUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for GatewayEventType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
