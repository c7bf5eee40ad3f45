use std::io;

/// Errors produced by the WebSocket protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    /// The frame declares a 64-bit extended length (length field 127).
    #[error("large payloads not supported (64-bit length field)")]
    LargePayload,

    /// The buffer ends before the header, mask or payload it declares.
    #[error("truncated frame: needed {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// The unmasked text payload was not valid UTF-8 JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The outbound value could not be serialized.
    #[error("serialize payload: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Outbound payloads are limited to the 16-bit extended length.
    #[error("payload of {0} bytes exceeds the 65535 byte limit")]
    PayloadTooLarge(usize),

    /// The request did not ask for `Upgrade: websocket`.
    #[error("missing or invalid Upgrade header")]
    BadUpgrade,

    /// The upgrade request carried no `Sec-WebSocket-Key`.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    /// The HTTP request head could not be parsed.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
