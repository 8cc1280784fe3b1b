//! Event broadcasting
//!
//! Subscription tables, per-namespace dispatch backends and the dispatcher
//! façade in front of them.

mod backend;
mod dispatcher;
mod flows;
mod member_list;
mod namespace;
mod table;

pub use backend::{fanout, DispatchBackend, PayloadFilter, SubscriberBackend, UserBackend};
pub use dispatcher::EventDispatcher;
pub use member_list::{MemberListBackend, MemberListChange};
pub use namespace::Namespace;
pub use table::SubscriptionTable;
