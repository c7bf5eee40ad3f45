//! Development server for static sites with a WebSocket live-reload channel.
//!
//! - [`config`]: `reload.toml` loading and defaults
//! - [`static_files`]: Path resolution, MIME types, reload client injection
//! - [`watcher`]: File change notifications turned into rebuild signals
//! - [`server`]: Accept loop, upgrade routing, broadcast loop

pub mod config;
pub mod error;
pub mod server;
pub mod static_files;
pub mod watcher;

pub use config::Config;
pub use error::DevError;
pub use server::DevServer;
pub use watcher::{ReloadTrigger, SiteWatcher};
