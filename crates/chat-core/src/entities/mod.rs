//! Read projections - the shapes storage hands to the gateway

mod channel;
mod guild;
mod user;

pub use channel::{Channel, ChannelType};
pub use guild::Guild;
pub use user::{PublicUser, User};
