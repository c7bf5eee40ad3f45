//! Minimal WebSocket server protocol for a development live-reload channel.
//!
//! Covers exactly what a "reload the page" notification needs:
//! - **Frame codec** (`frame`): single-frame decode with mask removal, unmasked text-frame encode
//! - **Handshake** (`handshake`): HTTP upgrade with Sec-WebSocket-Accept and optional `json` subprotocol
//! - **Registry** (`registry`): sockets that completed the handshake
//! - **Broadcast** (`broadcast`): fan `{"message":"reload"}` out to every registered socket
//!
//! Fragmentation, 64-bit payload lengths, extensions and ping/pong are not
//! supported.

pub mod broadcast;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod registry;

pub use broadcast::{BroadcastReport, FailurePolicy, ReloadBroadcaster, ReloadMessage};
pub use error::WsError;
pub use frame::{decode_frame, encode_text, read_frame_bytes, Decoded, Frame, Opcode};
pub use handshake::{compute_accept_key, negotiate, HandshakeRequest, Negotiated};
pub use registry::{ConnectionId, ConnectionRegistry};
