use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::DevError;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "reload.toml";

/// Parsed `reload.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub watch: WatchConfig,
}

/// The `[server]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory the site is served from.
    pub root: PathBuf,
    /// URL prefix stripped from request paths before resolving files.
    pub mount: String,
    /// Add the reload client `<script>` to served HTML pages.
    pub inject_client: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            root: PathBuf::from("docs"),
            mount: "/".to_string(),
            inject_client: true,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Mount prefix with exactly one leading slash and no trailing slash
    /// (`""` for the site root).
    pub fn mount_prefix(&self) -> String {
        let trimmed = self.mount.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }
}

/// The `[watch]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchConfig {
    pub enabled: bool,
    /// Paths to watch; empty means the server root.
    pub paths: Vec<PathBuf>,
    /// Quiet period that coalesces a burst of changes into one reload.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            enabled: true,
            paths: Vec::new(),
            debounce_ms: 100,
        }
    }
}

impl WatchConfig {
    pub fn paths_or(&self, root: &Path) -> Vec<PathBuf> {
        if self.paths.is_empty() {
            vec![root.to_path_buf()]
        } else {
            self.paths.clone()
        }
    }
}

impl Config {
    /// Load `path`, or `reload.toml` from the working directory when no
    /// path is given. A missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Config, DevError> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Config::default())
                }
            }
        }
    }

    /// Read and parse a config file.
    pub fn from_file(path: &Path) -> Result<Config, DevError> {
        let content = std::fs::read_to_string(path).map_err(|source| DevError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| DevError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config text.
    pub fn from_str(content: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml = r#"
[server]
host = "0.0.0.0"
port = 9090
root = "public"
mount = "/app/"
inject_client = false

[watch]
enabled = false
paths = ["public", "src"]
debounce_ms = 250
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.server.addr(), "0.0.0.0:9090");
        assert_eq!(config.server.root, PathBuf::from("public"));
        assert_eq!(config.server.mount_prefix(), "/app");
        assert!(!config.server.inject_client);
        assert!(!config.watch.enabled);
        assert_eq!(config.watch.paths, vec![PathBuf::from("public"), PathBuf::from("src")]);
        assert_eq!(config.watch.debounce_ms, 250);
    }

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.addr(), "127.0.0.1:8000");
        assert_eq!(config.server.mount_prefix(), "");
        assert_eq!(config.watch.paths_or(Path::new("docs")), vec![PathBuf::from("docs")]);
    }

    #[test]
    fn parse_partial_section() {
        let config = Config::from_str("[server]\nport = 3000\n").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.watch.enabled);
    }

    #[test]
    fn unknown_key_rejected() {
        assert!(Config::from_str("[server]\nprot = 1\n").is_err());
    }

    #[test]
    fn from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reload.toml");
        std::fs::write(&path, "[watch]\ndebounce_ms = \"soon\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, DevError::ParseConfig { .. }));
        assert!(err.to_string().contains("reload.toml"));

        let missing = Config::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, DevError::ReadConfig { .. }));
    }
}
