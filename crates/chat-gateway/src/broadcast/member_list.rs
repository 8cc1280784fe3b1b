//! Lazy guild member lists
//!
//! Each guild keeps one member list, rendered as rows: the `online` group
//! header, online members by id, the `offline` group header, offline members
//! by id. Viewers subscribe to index windows of that list. When a member
//! changes, the rows from the first changed index onward are recomputed and
//! every viewer whose window overlaps them gets its own SYNC of that window.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chat_core::Snowflake;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use super::backend::{fanout, DispatchBackend};
use super::{Namespace, SubscriptionTable};
use crate::connection::SessionRegistry;
use crate::events::{
    GatewayEventType, MemberListEntry, MemberListGroup, MemberListItem, MemberListOp,
    MemberListUpdateEvent, PresenceStatus, UserIdPayload,
};

/// Member list id sent to clients; only the whole-guild list exists
const LIST_ID: &str = "everyone";

/// Change applied to a member list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberListChange {
    /// Presence of an existing member changed
    UpdateUser,
    NewMember,
    RemoveMember,
}

impl MemberListChange {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UpdateUser => "update_user",
            Self::NewMember => "new_member",
            Self::RemoveMember => "remove_member",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "update_user" => Some(Self::UpdateUser),
            "new_member" => Some(Self::NewMember),
            "remove_member" => Some(Self::RemoveMember),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row {
    Group(PresenceStatus, usize),
    Member(Snowflake, PresenceStatus),
}

impl Row {
    fn to_item(self) -> MemberListItem {
        match self {
            Self::Group(status, count) => MemberListItem::Group(MemberListGroup {
                id: status.as_str(),
                count,
            }),
            Self::Member(id, status) => MemberListItem::Member(MemberListEntry {
                user: UserIdPayload { id },
                status,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct MemberList {
    members: BTreeSet<Snowflake>,
    online: BTreeSet<Snowflake>,
}

impl MemberList {
    fn online_count(&self) -> usize {
        self.online.len()
    }

    fn offline_count(&self) -> usize {
        self.members.len() - self.online.len()
    }

    fn rows(&self) -> Vec<Row> {
        let mut rows = Vec::with_capacity(self.members.len() + 2);
        rows.push(Row::Group(PresenceStatus::Online, self.online_count()));
        rows.extend(self.online.iter().map(|&id| Row::Member(id, PresenceStatus::Online)));
        rows.push(Row::Group(PresenceStatus::Offline, self.offline_count()));
        rows.extend(
            self.members
                .difference(&self.online)
                .map(|&id| Row::Member(id, PresenceStatus::Offline)),
        );
        rows
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            rows: self.rows(),
            member_count: self.members.len(),
            online_count: self.online_count(),
        }
    }

    fn set_online(&mut self, user_id: Snowflake, online: bool) {
        if online {
            self.online.insert(user_id);
        } else {
            self.online.remove(&user_id);
        }
    }
}

/// Rendered list after a change
struct Snapshot {
    rows: Vec<Row>,
    member_count: usize,
    online_count: usize,
}

impl Snapshot {
    fn event(&self, guild_id: Snowflake, windows: &[[usize; 2]]) -> MemberListUpdateEvent {
        MemberListUpdateEvent {
            guild_id,
            id: LIST_ID,
            member_count: self.member_count,
            online_count: self.online_count,
            groups: vec![
                MemberListGroup {
                    id: PresenceStatus::Online.as_str(),
                    count: self.online_count,
                },
                MemberListGroup {
                    id: PresenceStatus::Offline.as_str(),
                    count: self.member_count - self.online_count,
                },
            ],
            ops: windows.iter().map(|&range| self.sync(range)).collect(),
        }
    }

    fn sync(&self, range: [usize; 2]) -> MemberListOp {
        let [start, end] = range;
        let items = self
            .rows
            .iter()
            .enumerate()
            .filter(|(index, _)| (start..=end).contains(index))
            .map(|(_, row)| row.to_item())
            .collect();
        MemberListOp {
            op: "SYNC",
            range,
            items,
        }
    }
}

/// Index range that differs between two renderings, if any
fn changed_range(old: &[Row], new: &[Row]) -> Option<[usize; 2]> {
    let len = old.len().max(new.len());
    let first = (0..len).find(|&i| old.get(i) != new.get(i))?;
    Some([first, len - 1])
}

fn overlaps(window: [usize; 2], changed: [usize; 2]) -> bool {
    window[0] <= changed[1] && changed[0] <= window[1]
}

pub struct MemberListBackend {
    /// guild_id -> viewers
    table: SubscriptionTable,
    registry: Arc<SessionRegistry>,
    lists: DashMap<Snowflake, MemberList>,
    /// (guild_id, viewer) -> subscribed index ranges
    windows: DashMap<(Snowflake, Snowflake), Vec<[usize; 2]>>,
}

impl MemberListBackend {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            table: SubscriptionTable::new(),
            registry,
            lists: DashMap::new(),
            windows: DashMap::new(),
        }
    }

    /// Subscribe `viewer` to windows of the guild's list and sync them right
    /// away. The list is built from `member_ids` unless it already exists.
    pub fn subscribe_window(
        &self,
        guild_id: Snowflake,
        viewer: Snowflake,
        member_ids: impl IntoIterator<Item = Snowflake>,
        ranges: Vec<[usize; 2]>,
    ) -> Vec<String> {
        let ranges: Vec<[usize; 2]> = ranges.into_iter().filter(|r| r[0] <= r[1]).collect();
        if ranges.is_empty() {
            return Vec::new();
        }

        let snapshot = {
            let list = self.lists.entry(guild_id).or_insert_with(|| {
                let members: BTreeSet<Snowflake> = member_ids.into_iter().collect();
                let online = members
                    .iter()
                    .copied()
                    .filter(|&id| self.registry.is_online(id))
                    .collect();
                debug!(guild_id = %guild_id, members = members.len(), "Member list loaded");
                MemberList { members, online }
            });
            // Subscribed under the entry so pruning cannot drop the list first
            self.table.subscribe(guild_id, viewer);
            self.windows.insert((guild_id, viewer), ranges.clone());
            list.snapshot()
        };

        let data = serde_json::to_value(snapshot.event(guild_id, &ranges)).ok();
        fanout(
            &self.registry,
            &[viewer],
            GatewayEventType::GuildMemberListUpdate.as_str(),
            &HashSet::new(),
            &|_| data.clone(),
        )
    }

    pub fn windows(&self, guild_id: Snowflake, viewer: Snowflake) -> Vec<[usize; 2]> {
        self.windows
            .get(&(guild_id, viewer))
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    /// Apply a change and sync affected viewers
    pub fn apply(
        &self,
        guild_id: Snowflake,
        change: MemberListChange,
        user_id: Snowflake,
        skip: &HashSet<String>,
    ) -> Vec<String> {
        let (old, snapshot) = {
            let Some(mut list) = self.lists.get_mut(&guild_id) else {
                return Vec::new();
            };
            let old = list.rows();
            match change {
                MemberListChange::UpdateUser => {
                    if !list.members.contains(&user_id) {
                        return Vec::new();
                    }
                    list.set_online(user_id, self.registry.is_online(user_id));
                }
                MemberListChange::NewMember => {
                    list.members.insert(user_id);
                    list.set_online(user_id, self.registry.is_online(user_id));
                }
                MemberListChange::RemoveMember => {
                    list.members.remove(&user_id);
                    list.online.remove(&user_id);
                }
            }
            (old, list.snapshot())
        };

        let Some(changed) = changed_range(&old, &snapshot.rows) else {
            return Vec::new();
        };
        debug!(guild_id = %guild_id, change = change.as_str(), user_id = %user_id, range = ?changed, "Member list changed");

        let viewers = self.table.members(guild_id);
        let filter = |viewer: Snowflake| {
            let affected: Vec<[usize; 2]> = self
                .windows(guild_id, viewer)
                .into_iter()
                .filter(|&window| overlaps(window, changed))
                .collect();
            if affected.is_empty() {
                return None;
            }
            serde_json::to_value(snapshot.event(guild_id, &affected)).ok()
        };
        fanout(
            &self.registry,
            &viewers,
            GatewayEventType::GuildMemberListUpdate.as_str(),
            skip,
            &filter,
        )
    }
}

impl DispatchBackend for MemberListBackend {
    fn namespace(&self) -> Namespace {
        Namespace::LazyGuild
    }

    fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The list goes once its last viewer leaves
    fn unsubscribe(&self, key: Snowflake, user_id: Snowflake) -> bool {
        self.windows.remove(&(key, user_id));
        let removed = self.table.unsubscribe(key, user_id);
        if removed && self.lists.remove_if(&key, |_, _| !self.table.contains_key(key)).is_some() {
            debug!(guild_id = %key, "Member list dropped");
        }
        removed
    }

    fn reset(&self, key: Snowflake) {
        self.table.reset(key);
        self.windows.retain(|(guild_id, _), _| *guild_id != key);
    }

    fn remove(&self, key: Snowflake) {
        self.table.remove(key);
        self.windows.retain(|(guild_id, _), _| *guild_id != key);
        self.lists.remove(&key);
    }

    /// `event` names the change, `data` is the affected user id
    fn dispatch(
        &self,
        key: Snowflake,
        event: &str,
        data: &Value,
        skip: &HashSet<String>,
    ) -> Vec<String> {
        let Some(change) = MemberListChange::parse(event) else {
            warn!(guild_id = %key, change = %event, "Unknown member list change");
            return Vec::new();
        };
        match serde_json::from_value::<Snowflake>(data.clone()) {
            Ok(user_id) => self.apply(key, change, user_id, skip),
            Err(err) => {
                warn!(guild_id = %key, error = %err, "Member list change without a user id");
                Vec::new()
            }
        }
    }
}
