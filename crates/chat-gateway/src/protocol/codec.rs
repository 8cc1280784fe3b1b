//! Wire encoding and transport compression
//!
//! Encoding, compression and protocol version are fixed when the socket is
//! accepted. `json` frames travel as text; `binary` frames are a bincode
//! envelope whose `d` is embedded JSON text. With `zlib-stream` every outbound
//! frame is pushed through one long-lived zlib stream, sync-flushed, and sent as
//! a binary message; inbound frames are never compressed.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression as ZlibLevel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{GatewayMessage, OpCode};

/// Protocol versions the gateway speaks
pub const SUPPORTED_VERSIONS: [u8; 2] = [6, 7];

/// Version assumed when `v` is absent
pub const DEFAULT_VERSION: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Json,
    Binary,
}

impl Encoding {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "json" => Some(Self::Json),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "binary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    ZlibStream,
}

impl Compression {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "zlib-stream" => Some(Self::ZlibStream),
            _ => None,
        }
    }
}

/// Raw query string of `GET /gateway`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectQuery {
    pub v: Option<String>,
    pub encoding: Option<String>,
    pub compress: Option<String>,
}

/// Parameters a connection was accepted with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    pub version: u8,
    pub encoding: Encoding,
    pub compression: Compression,
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            encoding: Encoding::Json,
            compression: Compression::None,
        }
    }
}

/// Refused connect parameters; the message doubles as the close reason
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    #[error("Invalid gateway version")]
    Version,
    #[error("Invalid gateway encoding")]
    Encoding,
    #[error("Invalid gateway compress")]
    Compress,
}

impl ConnectQuery {
    /// Validate the query. An empty `compress` means no compression.
    pub fn negotiate(&self) -> Result<ConnectParams, NegotiationError> {
        let version = match self.v.as_deref() {
            None => DEFAULT_VERSION,
            Some(raw) => raw
                .parse::<u8>()
                .ok()
                .filter(|v| SUPPORTED_VERSIONS.contains(v))
                .ok_or(NegotiationError::Version)?,
        };

        let encoding = match self.encoding.as_deref() {
            None => Encoding::Json,
            Some(raw) => Encoding::parse(raw).ok_or(NegotiationError::Encoding)?,
        };

        let compression = match self.compress.as_deref() {
            None | Some("") => Compression::None,
            Some(raw) => Compression::parse(raw).ok_or(NegotiationError::Compress)?,
        };

        Ok(ConnectParams {
            version,
            encoding,
            compression,
        })
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid binary frame: {0}")]
    Binary(#[from] bincode::Error),

    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    #[error("{0} frame on a {1} connection")]
    WrongFrameKind(&'static str, &'static str),

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

/// One encoded websocket message, before transport compression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl WireFrame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

/// Inbound frame with the opcode still numeric
#[derive(Deserialize)]
struct JsonEnvelope {
    op: u8,
    #[serde(default)]
    t: Option<String>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    d: Option<Value>,
}

/// Binary envelope; `d` is JSON text since bincode is not self-describing
#[derive(Debug, Serialize, Deserialize)]
struct BinaryEnvelope {
    op: u8,
    t: Option<String>,
    s: Option<u64>,
    d: Option<String>,
}

fn known_op(op: u8) -> Result<OpCode, CodecError> {
    OpCode::from_u8(op).ok_or(CodecError::UnknownOpcode(op))
}

pub fn encode(message: &GatewayMessage, encoding: Encoding) -> Result<WireFrame, CodecError> {
    match encoding {
        Encoding::Json => Ok(WireFrame::Text(serde_json::to_string(message)?)),
        Encoding::Binary => {
            let envelope = BinaryEnvelope {
                op: message.op.as_u8(),
                t: message.t.clone(),
                s: message.s,
                d: message.d.as_ref().map(serde_json::to_string).transpose()?,
            };
            Ok(WireFrame::Binary(bincode::serialize(&envelope)?))
        }
    }
}

pub fn decode(frame: &WireFrame, encoding: Encoding) -> Result<GatewayMessage, CodecError> {
    match (encoding, frame) {
        (Encoding::Json, WireFrame::Text(text)) => decode_json(text.as_bytes()),
        // some clients send JSON in binary messages
        (Encoding::Json, WireFrame::Binary(bytes)) => decode_json(bytes),
        (Encoding::Binary, WireFrame::Binary(bytes)) => {
            let envelope: BinaryEnvelope = bincode::deserialize(bytes)?;
            Ok(GatewayMessage {
                op: known_op(envelope.op)?,
                t: envelope.t,
                s: envelope.s,
                d: envelope.d.as_deref().map(serde_json::from_str).transpose()?,
            })
        }
        (Encoding::Binary, WireFrame::Text(_)) => {
            Err(CodecError::WrongFrameKind("text", Encoding::Binary.as_str()))
        }
    }
}

fn decode_json(bytes: &[u8]) -> Result<GatewayMessage, CodecError> {
    let envelope: JsonEnvelope = serde_json::from_slice(bytes)?;
    Ok(GatewayMessage {
        op: known_op(envelope.op)?,
        t: envelope.t,
        s: envelope.s,
        d: envelope.d,
    })
}

/// Per-connection zlib stream; the dictionary carries over between frames
pub struct ZlibStream {
    encoder: ZlibEncoder<Vec<u8>>,
}

impl ZlibStream {
    pub fn new() -> Self {
        Self {
            encoder: ZlibEncoder::new(Vec::new(), ZlibLevel::default()),
        }
    }

    /// Compress one frame; output ends on a sync-flush marker (`00 00 ff ff`)
    pub fn compress(&mut self, frame: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.encoder.write_all(frame)?;
        self.encoder.flush()?;
        Ok(std::mem::take(self.encoder.get_mut()))
    }
}

impl Default for ZlibStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ZlibStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZlibStream").finish_non_exhaustive()
    }
}
