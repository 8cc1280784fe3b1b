//! # chat-core
//!
//! Domain layer containing identifiers, read projections, and the ports the
//! gateway consumes (`Storage`, `Authenticator`).
//! This crate has zero dependencies on infrastructure (storage engine, web framework, etc.).

pub mod entities;
pub mod error;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{Channel, ChannelType, Guild, PublicUser, User};
pub use error::{AuthError, DomainError};
pub use traits::{Authenticator, RepoResult, Storage};
pub use value_objects::{Snowflake, SnowflakeParseError};
