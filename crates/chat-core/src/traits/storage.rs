//! Storage port - read-only projections consumed by the gateway
//!
//! Writes happen elsewhere and are committed before any event about them is
//! dispatched, so everything here is a plain read.

use async_trait::async_trait;

use crate::entities::{Channel, Guild, User};
use crate::error::DomainError;
use crate::value_objects::Snowflake;

/// Result type for storage operations
pub type RepoResult<T> = Result<T, DomainError>;

#[async_trait]
pub trait Storage: Send + Sync {
    // ========================================================================
    // Users
    // ========================================================================

    /// Find user by ID (private projection, strip with `User::public`)
    async fn get_user(&self, id: Snowflake) -> RepoResult<Option<User>>;

    /// Friend ids of a user
    async fn get_friend_ids(&self, user_id: Snowflake) -> RepoResult<Vec<Snowflake>>;

    /// DM channels the user participates in
    async fn get_private_channels(&self, user_id: Snowflake) -> RepoResult<Vec<Channel>>;

    // ========================================================================
    // Guilds
    // ========================================================================

    async fn get_guild(&self, id: Snowflake) -> RepoResult<Option<Guild>>;

    /// Guild ids the user is a member of
    async fn get_user_guilds(&self, user_id: Snowflake) -> RepoResult<Vec<Snowflake>>;

    async fn get_member_ids(&self, guild_id: Snowflake) -> RepoResult<Vec<Snowflake>>;

    // ========================================================================
    // Channels
    // ========================================================================

    async fn get_channel(&self, id: Snowflake) -> RepoResult<Option<Channel>>;

    /// Channel ids belonging to a guild
    async fn get_channel_ids(&self, guild_id: Snowflake) -> RepoResult<Vec<Snowflake>>;
}
