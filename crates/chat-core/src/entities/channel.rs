//! Channel projection - a guild text channel, DM, or category

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value_objects::Snowflake;

/// Channel type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ChannelType {
    /// Guild text channel
    #[default]
    GuildText = 0,
    /// Direct message between users
    Dm = 1,
    /// Guild category for organizing channels
    GuildCategory = 4,
}

impl ChannelType {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::GuildText),
            1 => Some(Self::Dm),
            4 => Some(Self::GuildCategory),
            _ => None,
        }
    }
}

// Wire form is the numeric type
impl Serialize for ChannelType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for ChannelType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown channel type: {value}")))
    }
}

/// Channel projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub position: i32,
    /// Participants of a DM channel
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<Snowflake>,
}

impl Channel {
    pub fn new_text(id: Snowflake, guild_id: Snowflake, name: impl Into<String>) -> Self {
        Self {
            id,
            channel_type: ChannelType::GuildText,
            guild_id: Some(guild_id),
            name: Some(name.into()),
            topic: None,
            position: 0,
            recipients: Vec::new(),
        }
    }

    pub fn new_dm(id: Snowflake, recipients: Vec<Snowflake>) -> Self {
        Self {
            id,
            channel_type: ChannelType::Dm,
            guild_id: None,
            name: None,
            topic: None,
            position: 0,
            recipients,
        }
    }

    #[inline]
    pub fn is_dm(&self) -> bool {
        self.channel_type == ChannelType::Dm
    }

    /// The DM participant that is not `user_id`
    pub fn peer_of(&self, user_id: Snowflake) -> Option<Snowflake> {
        self.recipients.iter().copied().find(|id| *id != user_id)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
