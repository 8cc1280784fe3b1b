use thiserror::Error;

/// Why a gateway credential was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Token is malformed")]
    Malformed,

    #[error("Token has expired")]
    Expired,

    #[error("Token signature is invalid")]
    InvalidSignature,

    #[error("Token is not an access token")]
    WrongTokenType,

    #[error("Token subject is not a valid user id")]
    InvalidSubject,
}
