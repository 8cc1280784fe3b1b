//! # chat-store
//!
//! In-memory implementation of the `Storage` port defined in `chat-core`.
//!
//! ## Overview
//!
//! Relational persistence is owned by another service; the gateway only needs
//! read projections. `MemoryStore` keeps them in sharded maps and can be
//! populated from a JSON seed document at start-up.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chat_store::{MemoryStore, Seed};
//!
//! async fn example() -> Result<(), chat_common::AppError> {
//!     let store = MemoryStore::new();
//!     Seed::load("seed.json").await?.apply(&store);
//!     Ok(())
//! }
//! ```

pub mod memory;
pub mod seed;

pub use memory::MemoryStore;
pub use seed::{Seed, SeedGuild};
