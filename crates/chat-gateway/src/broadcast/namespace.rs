//! Subscription namespaces

use std::fmt;

/// Kind of resource a subscription key identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Channel,
    Guild,
    /// Keyed by user id; the user is always a member of its own key
    User,
    /// Keyed by a user; subscribers are that user's friends
    Friend,
    /// Per-guild member lists with viewer windows
    LazyGuild,
}

impl Namespace {
    pub const ALL: [Self; 5] = [
        Self::Channel,
        Self::Guild,
        Self::User,
        Self::Friend,
        Self::LazyGuild,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Guild => "guild",
            Self::User => "user",
            Self::Friend => "friend",
            Self::LazyGuild => "lazy_guild",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| ns.as_str() == raw)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
