use crate::error::AuthError;
use crate::value_objects::Snowflake;

/// Verifies an identify/resume credential and yields the user it belongs to.
///
/// Authorization beyond "who is this" happens upstream of the gateway.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Snowflake, AuthError>;
}
