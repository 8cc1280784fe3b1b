//! Ports - what the gateway needs from the outside world

mod auth;
mod storage;

pub use auth::Authenticator;
pub use storage::{RepoResult, Storage};
