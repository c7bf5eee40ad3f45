//! Static file responses for the development server.
//!
//! Request paths are resolved against the site root after stripping the
//! mount prefix. Directories serve their `index.html`. HTML pages get the
//! reload client `<script>` injected when enabled.

use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use reload_ws::HandshakeRequest;

use crate::config::ServerConfig;

/// URL the reload client script is served from.
pub const CLIENT_SCRIPT_PATH: &str = "/__reload.js";

const CLIENT_SCRIPT: &str = include_str!("../assets/reload-client.js");

/// Content type for a file, by extension.
pub fn mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") => "text/javascript",
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("svg") => "image/svg+xml",
        Some("ttf") => "application/x-font-ttf",
        Some("webmanifest") => "application/manifest+json",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        _ => "text/plain",
    }
}

/// Where and how the site is served.
#[derive(Debug, Clone)]
pub struct Site {
    pub root: PathBuf,
    /// Normalized mount prefix, `""` for the root.
    pub mount: String,
    pub inject_client: bool,
}

impl Site {
    pub fn from_config(config: &ServerConfig) -> Self {
        Site {
            root: config.root.clone(),
            mount: config.mount_prefix(),
            inject_client: config.inject_client,
        }
    }

    /// Map a request target to a file under the root.
    ///
    /// Returns `None` for paths outside the mount, paths containing `..`,
    /// and files that do not exist.
    pub fn resolve(&self, target: &str) -> Option<PathBuf> {
        let path = target.split(|c| c == '?' || c == '#').next().unwrap_or("");
        let relative = if self.mount.is_empty() {
            path
        } else {
            let rest = path.strip_prefix(self.mount.as_str())?;
            if !(rest.is_empty() || rest.starts_with('/')) {
                return None;
            }
            rest
        };

        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return None;
        }

        let mut file = self.root.join(relative);
        if file.is_dir() {
            file.push("index.html");
        }
        file.is_file().then_some(file)
    }

    /// Answer a plain (non-upgrade) HTTP request. Returns the status sent.
    pub fn respond<W: Write>(&self, request: &HandshakeRequest, socket: &mut W) -> io::Result<u16> {
        let head_only = request.method.eq_ignore_ascii_case("HEAD");
        if !(head_only || request.method.eq_ignore_ascii_case("GET")) {
            write_response(socket, 405, "Method Not Allowed", "text/plain", b"method not allowed", false)?;
            return Ok(405);
        }

        if request.path.split('?').next() == Some(CLIENT_SCRIPT_PATH) {
            write_response(socket, 200, "OK", "text/javascript", CLIENT_SCRIPT.as_bytes(), head_only)?;
            return Ok(200);
        }

        let Some(file) = self.resolve(&request.path) else {
            write_response(socket, 404, "Not Found", "text/plain", b"not found", head_only)?;
            return Ok(404);
        };

        let mime = mime_type(&file);
        let mut body = std::fs::read(&file)?;
        if self.inject_client && mime == "text/html" {
            body = inject_client_script(&body);
        }
        write_response(socket, 200, "OK", mime, &body, head_only)?;
        Ok(200)
    }
}

/// Insert the reload client tag before the last `</body>`, or append it.
pub fn inject_client_script(html: &[u8]) -> Vec<u8> {
    let tag = format!("<script src=\"{}\"></script>", CLIENT_SCRIPT_PATH);
    let text = String::from_utf8_lossy(html);
    let lower = text.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(text.len() + tag.len());
            out.push_str(&text[..pos]);
            out.push_str(&tag);
            out.push_str(&text[pos..]);
            out.into_bytes()
        }
        None => {
            let mut out = html.to_vec();
            out.extend_from_slice(tag.as_bytes());
            out
        }
    }
}

fn write_response<W: Write>(
    socket: &mut W,
    status: u16,
    reason: &str,
    content_type: &str,
    body: &[u8],
    head_only: bool,
) -> io::Result<()> {
    write!(
        socket,
        "HTTP/1.1 {} {}\r\n\
         Content-Type: {}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        status,
        reason,
        content_type,
        body.len()
    )?;
    if !head_only {
        socket.write_all(body)?;
    }
    socket.flush()
}
