//! Gateway protocol definitions
//!
//! Op codes, frame format, close codes, and the wire codec.

pub mod codec;
mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::CloseCode;
pub use codec::{
    CodecError, Compression, ConnectParams, ConnectQuery, Encoding, NegotiationError, WireFrame,
    ZlibStream,
};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, ResumePayload};
