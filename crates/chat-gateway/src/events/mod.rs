//! Gateway events
//!
//! Dispatch event names and the payloads the gateway builds itself.

mod event_types;
mod payloads;

pub use event_types::GatewayEventType;
pub use payloads::{
    GuildDeleteEvent, GuildMemberRemoveEvent, MemberListEntry, MemberListGroup, MemberListItem,
    MemberListOp, MemberListUpdateEvent, PresenceEvent, PresenceStatus, ReadyEvent, ReadyGuild,
    Relationship, ResumedEvent, UserIdPayload,
};
