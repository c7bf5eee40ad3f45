//! The `reload-dev` CLI.
//!
//! - `reload-dev serve` - Serve a site directory and push reloads on change
//!
//! Options (override `reload.toml`):
//! - `--config` - Config file (default: `./reload.toml` if present)
//! - `--host`, `--port` - Listen address
//! - `--root` - Site directory
//! - `--mount` - URL prefix the site is served under
//! - `--no-watch` - Disable file watching
//! - `--no-inject` - Do not inject the reload client into HTML
//! - `--log-level` - Log filter (default: `RUST_LOG`, then `info`)

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use reload_dev::{Config, DevError, DevServer, SiteWatcher};

#[derive(Parser)]
#[command(name = "reload-dev", version, about = "Static site dev server with live reload")]
struct Cli {
    /// Log filter, e.g. `debug` or `reload_ws=trace`
    #[arg(long = "log-level", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a site directory and notify browsers when it changes
    Serve {
        /// Path to the config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to listen on
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory to serve
        #[arg(long)]
        root: Option<PathBuf>,

        /// URL prefix the site is served under
        #[arg(long)]
        mount: Option<String>,

        /// Do not watch for file changes
        #[arg(long = "no-watch")]
        no_watch: bool,

        /// Do not inject the reload client script into HTML pages
        #[arg(long = "no-inject")]
        no_inject: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            root,
            mount,
            no_watch,
            no_inject,
        } => Config::load(config.as_deref()).and_then(|mut cfg| {
            if let Some(host) = host {
                cfg.server.host = host;
            }
            if let Some(port) = port {
                cfg.server.port = port;
            }
            if let Some(root) = root {
                cfg.server.root = root;
            }
            if let Some(mount) = mount {
                cfg.server.mount = mount;
            }
            if no_watch {
                cfg.watch.enabled = false;
            }
            if no_inject {
                cfg.server.inject_client = false;
            }
            serve(&cfg)
        }),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn serve(config: &Config) -> Result<(), DevError> {
    let server = DevServer::bind(&config.server, Duration::from_millis(config.watch.debounce_ms))?;

    // Held for the lifetime of the server; dropping it stops watching.
    let _watcher = if config.watch.enabled {
        let paths = config.watch.paths_or(&config.server.root);
        Some(SiteWatcher::start(paths, server.reload_trigger())?)
    } else {
        info!("file watching disabled");
        None
    };

    server.run()
}
