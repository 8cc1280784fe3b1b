//! Payloads of the non-dispatch frames

use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
    /// Servers that handled the connection, for client-side diagnostics
    #[serde(rename = "_trace")]
    pub trace: Vec<String>,
}

impl HelloPayload {
    /// Default heartbeat interval (45 seconds)
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 45_000;

    #[must_use]
    pub fn new(heartbeat_interval: u64, trace: Vec<String>) -> Self {
        Self {
            heartbeat_interval,
            trace,
        }
    }
}

impl Default for HelloPayload {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HEARTBEAT_INTERVAL, Vec::new())
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IdentifyProperties>,

    /// Per-payload compression, which this gateway does not do; accepted and ignored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
}

impl IdentifyPayload {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            properties: None,
            compress: None,
        }
    }
}

/// Client connection properties; v6 clients prefix the keys with `$`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyProperties {
    #[serde(default, alias = "$os", skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    #[serde(default, alias = "$browser", skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    #[serde(default, alias = "$device", skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    /// Last sequence number the client received
    pub seq: u64,
}
