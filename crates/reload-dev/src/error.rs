use std::io;
use std::path::PathBuf;

use reload_ws::WsError;

/// Errors surfaced by the development server.
#[derive(Debug, thiserror::Error)]
pub enum DevError {
    #[error("failed to read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error(transparent)]
    WebSocket(#[from] WsError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
