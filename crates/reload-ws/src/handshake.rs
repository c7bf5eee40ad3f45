//! WebSocket HTTP upgrade handshake (RFC 6455 Section 4.2).
//!
//! Validates the client's upgrade request, computes the
//! `Sec-WebSocket-Accept` header, and writes the `101` response (or a
//! `400 Bad Request` when the request is not a WebSocket upgrade).
//!
//! - [`HandshakeRequest::read_from`]: Parse an HTTP request head from a stream
//! - [`negotiate`]: Validate and write the response
//! - [`compute_accept_key`]: SHA-1 + Base64 computation per RFC 6455 Section 4.2.2

use std::io::{BufRead, Read, Take, Write};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::WsError;

/// RFC 6455 magic GUID concatenated with the client key for Sec-WebSocket-Accept.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only subprotocol this server ever agrees to.
pub const JSON_PROTOCOL: &str = "json";

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_BYTES: u64 = 8192;

const BAD_REQUEST: &str = "HTTP/1.1 400 Bad Request\r\n\r\n";

/// Compute the `Sec-WebSocket-Accept` value per RFC 6455 Section 4.2.2.
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// An HTTP request head as seen by the upgrade path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl HandshakeRequest {
    /// Build a request from a header list (method `GET`, path `/`).
    pub fn from_headers<K, V>(headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        HandshakeRequest {
            method: "GET".to_string(),
            path: "/".to_string(),
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Read a request line and headers up to the blank line.
    ///
    /// Leaves anything after the blank line unread in `reader`. The head as a
    /// whole may not exceed [`MAX_HEAD_BYTES`].
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<Self, WsError> {
        let mut reader = reader.take(MAX_HEAD_BYTES);

        let mut request_line = String::new();
        if !read_head_line(&mut reader, &mut request_line)? {
            return Err(WsError::MalformedRequest("connection closed before request line".into()));
        }

        let trimmed = request_line.trim_end();
        let mut parts = trimmed.splitn(3, ' ');
        let (method, path) = match (parts.next(), parts.next()) {
            (Some(m), Some(p)) if !m.is_empty() && !p.is_empty() => (m.to_string(), p.to_string()),
            _ => return Err(WsError::MalformedRequest(format!("request line: {}", trimmed))),
        };

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            if !read_head_line(&mut reader, &mut line)? {
                break;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim().to_string()));
            }
        }

        Ok(HandshakeRequest { method, path, headers })
    }

    /// Find a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the request carries an `Upgrade` header at all.
    pub fn wants_upgrade(&self) -> bool {
        self.header("Upgrade").is_some()
    }
}

/// Read one line of the request head into `line`.
///
/// Returns `false` at end of input. Running into the [`MAX_HEAD_BYTES`] cap
/// before a newline is an error.
fn read_head_line<R: BufRead>(reader: &mut Take<&mut R>, line: &mut String) -> Result<bool, WsError> {
    let read = reader.read_line(line)?;
    if reader.limit() == 0 && !line.ends_with('\n') {
        return Err(WsError::MalformedRequest(format!(
            "request head exceeds {} bytes",
            MAX_HEAD_BYTES
        )));
    }
    Ok(read > 0)
}

/// A completed handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub accept: String,
    pub protocol: Option<&'static str>,
}

/// Pick the subprotocol to echo from a `Sec-WebSocket-Protocol` value.
pub fn select_protocol(offered: Option<&str>) -> Option<&'static str> {
    offered?
        .split(',')
        .map(str::trim)
        .any(|p| p == JSON_PROTOCOL)
        .then_some(JSON_PROTOCOL)
}

/// Validate `request` and write the handshake response to `socket`.
///
/// On success the `101` header block has been written and the socket is
/// ready for frames. On failure a `400 Bad Request` has been written and
/// the caller is expected to close the socket.
pub fn negotiate<W: Write>(request: &HandshakeRequest, socket: &mut W) -> Result<Negotiated, WsError> {
    let upgrade_ok = request
        .header("Upgrade")
        .is_some_and(|v| v == "websocket");
    if !upgrade_ok {
        reject(socket)?;
        return Err(WsError::BadUpgrade);
    }

    let client_key = match request.header("Sec-WebSocket-Key") {
        Some(key) if !key.is_empty() => key,
        _ => {
            reject(socket)?;
            return Err(WsError::MissingKey);
        }
    };

    let accept = compute_accept_key(client_key);
    let protocol = select_protocol(request.header("Sec-WebSocket-Protocol"));

    let mut lines = vec![
        "HTTP/1.1 101 Web Socket Protocol Handshake".to_string(),
        "Upgrade: WebSocket".to_string(),
        "Connection: Upgrade".to_string(),
        format!("Sec-WebSocket-Accept: {}", accept),
    ];
    if let Some(p) = protocol {
        lines.push(format!("Sec-WebSocket-Protocol: {}", p));
    }

    let response = lines.join("\r\n") + "\r\n\r\n";
    socket.write_all(response.as_bytes())?;
    socket.flush()?;

    Ok(Negotiated { accept, protocol })
}

fn reject<W: Write>(socket: &mut W) -> Result<(), WsError> {
    socket.write_all(BAD_REQUEST.as_bytes())?;
    socket.flush()?;
    Ok(())
}
