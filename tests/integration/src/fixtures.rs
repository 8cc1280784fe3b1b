//! Test fixtures
//!
//! A small world: Alice and Bob share a guild with one text channel and a
//! DM; Alice and Carol are friends. Dave exists but belongs nowhere.

use chat_core::{Channel, Guild, Snowflake, User};
use chat_store::MemoryStore;

pub const ALICE: Snowflake = Snowflake::new(1001);
pub const BOB: Snowflake = Snowflake::new(1002);
pub const CAROL: Snowflake = Snowflake::new(1003);
pub const DAVE: Snowflake = Snowflake::new(1004);

pub const GUILD: Snowflake = Snowflake::new(2001);
pub const GENERAL: Snowflake = Snowflake::new(3001);
pub const ALICE_BOB_DM: Snowflake = Snowflake::new(3002);

/// Fill `store` with the fixture world
pub fn seed_store(store: &MemoryStore) {
    store.upsert_user(User::new(ALICE, "alice", "0001"));
    store.upsert_user(User::new(BOB, "bob", "0002"));
    store.upsert_user(User::new(CAROL, "carol", "0003"));
    store.upsert_user(User::new(DAVE, "dave", "0004"));

    store.upsert_guild(Guild::new(GUILD, "Rustaceans", ALICE));
    store.add_member(GUILD, ALICE);
    store.add_member(GUILD, BOB);
    store.upsert_channel(Channel::new_text(GENERAL, GUILD, "general"));

    store.upsert_channel(Channel::new_dm(ALICE_BOB_DM, vec![ALICE, BOB]));
    store.add_friendship(ALICE, CAROL);
}
