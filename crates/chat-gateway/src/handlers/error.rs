//! Handler error types

use crate::connection::DeliveryError;
use crate::protocol::CloseCode;
use chat_core::{AuthError, DomainError};
use thiserror::Error;

/// Handler error type
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Invalid payload received
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Token rejected, or it names no known user
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(#[from] AuthError),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Already authenticated")]
    AlreadyAuthenticated,

    /// Client resumed from a sequence the server never sent
    #[error("Invalid resume sequence {0}")]
    InvalidSequence(u64),

    /// Storage failure while assembling a snapshot
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),

    /// The session's own transport refused a frame
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Close code the connection ends with
    pub fn to_close_code(&self) -> CloseCode {
        match self {
            Self::InvalidPayload(_) => CloseCode::DecodeError,
            Self::AuthenticationFailed(_) => CloseCode::AuthenticationFailed,
            Self::NotAuthenticated => CloseCode::NotAuthenticated,
            Self::AlreadyAuthenticated => CloseCode::AlreadyAuthenticated,
            Self::InvalidSequence(_) => CloseCode::InvalidSequence,
            Self::DomainError(_) | Self::Delivery(_) | Self::Internal(_) => CloseCode::UnknownError,
        }
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
