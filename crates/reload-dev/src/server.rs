//! Development server: static files plus the live-reload WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! TcpListener (accept loop on calling thread)
//!     |
//!     v  one thread per connection
//! handle_connection
//!     +-- read request head
//!     +-- no Upgrade header -> static file response, close
//!     +-- Upgrade header    -> negotiate
//!             +-- 400: shut down socket
//!             +-- 101: register write half, run inbound reader until close/error
//!
//! broadcast loop (own thread)
//!     next_rebuild -> lock registry -> ReloadBroadcaster::on_rebuild_with
//!                  -> unlock -> shut down evicted sockets
//! ```
//!
//! The registry is the only shared mutable state. Registration, removal and
//! broadcasts all take its lock, so each broadcast sees the membership as it
//! is at that moment.

use std::io::{self, BufRead, BufReader};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use reload_ws::{
    decode_frame, negotiate, read_frame_bytes, BroadcastReport, ConnectionId, ConnectionRegistry,
    Decoded, HandshakeRequest, ReloadBroadcaster, WsError,
};
use tracing::{debug, info, trace, warn};

use crate::config::ServerConfig;
use crate::error::DevError;
use crate::static_files::Site;
use crate::watcher::{next_rebuild, rebuild_channel, ReloadTrigger};

/// A write that stalls this long counts as a failed write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Registry of upgraded sockets shared between connection threads and the
/// broadcast loop.
pub type SharedRegistry = Arc<Mutex<ConnectionRegistry<TcpStream>>>;

/// A bound, not yet running, development server.
pub struct DevServer {
    listener: TcpListener,
    site: Arc<Site>,
    registry: SharedRegistry,
    broadcaster: ReloadBroadcaster,
    trigger: ReloadTrigger,
    rebuilds: Receiver<()>,
    debounce: Duration,
}

impl DevServer {
    /// Bind the listener described by `config`.
    pub fn bind(config: &ServerConfig, debounce: Duration) -> Result<Self, DevError> {
        let addr = config.addr();
        let listener = TcpListener::bind(&addr).map_err(|source| DevError::Bind { addr, source })?;
        let (trigger, rebuilds) = rebuild_channel();

        Ok(DevServer {
            listener,
            site: Arc::new(Site::from_config(config)),
            registry: Arc::new(Mutex::new(ConnectionRegistry::new())),
            broadcaster: ReloadBroadcaster::default(),
            trigger,
            rebuilds,
            debounce,
        })
    }

    pub fn with_broadcaster(mut self, broadcaster: ReloadBroadcaster) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for signalling "assets rebuilt".
    pub fn reload_trigger(&self) -> ReloadTrigger {
        self.trigger.clone()
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Start the broadcast loop and accept connections on the calling
    /// thread. Only returns if the listener fails.
    pub fn run(self) -> Result<(), DevError> {
        let DevServer {
            listener,
            site,
            registry,
            broadcaster,
            trigger: _trigger,
            rebuilds,
            debounce,
        } = self;

        let loop_registry = Arc::clone(&registry);
        thread::Builder::new()
            .name("reload-broadcast".into())
            .spawn(move || broadcast_loop(rebuilds, debounce, loop_registry, broadcaster))?;

        info!(addr = %listener.local_addr()?, root = %site.root.display(), "dev server listening");

        for stream in listener.incoming() {
            let stream = match stream {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "accept error");
                    continue;
                }
            };

            let site = Arc::clone(&site);
            let registry = Arc::clone(&registry);
            let spawned = thread::Builder::new()
                .name("reload-conn".into())
                .spawn(move || {
                    let peer = stream.peer_addr().ok();
                    if let Err(e) = handle_connection(stream, &site, &registry) {
                        debug!(peer = ?peer, error = %e, "connection ended with error");
                    }
                });
            if let Err(e) = spawned {
                warn!(error = %e, "failed to spawn connection thread");
            }
        }
        Ok(())
    }
}

fn broadcast_loop(
    rebuilds: Receiver<()>,
    debounce: Duration,
    registry: SharedRegistry,
    broadcaster: ReloadBroadcaster,
) {
    while next_rebuild(&rebuilds, debounce) {
        let report = send_reload(&broadcaster, &registry);
        info!(
            delivered = report.delivered.len(),
            dropped = report.failed.len(),
            "reload sent"
        );
    }
}

/// Broadcast one reload and close every socket the broadcast evicted.
///
/// The registry lock is held across all writes, so a stalled socket delays
/// registrations and removals by up to [`WRITE_TIMEOUT`]. Evicted sockets
/// are shut down after the lock is released. Shutting down, not just
/// dropping, matters: the connection thread's reader holds a second handle
/// to the same socket, and only a shutdown ends its read and tells the
/// browser the connection is gone.
pub fn send_reload(broadcaster: &ReloadBroadcaster, registry: &SharedRegistry) -> BroadcastReport {
    let mut evicted = Vec::new();
    let report = broadcaster.on_rebuild_with(&mut *registry.lock(), |id, stream| evicted.push((id, stream)));

    for (id, stream) in evicted {
        debug!(conn_id = %id, "closing evicted reload client");
        let _ = stream.shutdown(Shutdown::Both);
    }
    report
}

/// Serve one accepted socket to completion.
pub fn handle_connection(stream: TcpStream, site: &Site, registry: &SharedRegistry) -> Result<(), DevError> {
    let mut stream = stream;
    let mut reader = BufReader::new(stream.try_clone()?);
    let request = HandshakeRequest::read_from(&mut reader)?;

    if !request.wants_upgrade() {
        let status = site.respond(&request, &mut stream)?;
        debug!(method = %request.method, path = %request.path, status, "http");
        return Ok(());
    }

    match negotiate(&request, &mut stream) {
        Ok(negotiated) => {
            stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
            let id = registry.lock().register(stream);
            info!(conn_id = %id, protocol = ?negotiated.protocol, "reload client connected");
            read_until_closed(&mut reader, id);
            if let Some(stream) = registry.lock().remove(id) {
                let _ = stream.shutdown(Shutdown::Both);
            }
            info!(conn_id = %id, "reload client disconnected");
            Ok(())
        }
        Err(e @ (WsError::BadUpgrade | WsError::MissingKey)) => {
            debug!(path = %request.path, error = %e, "rejected upgrade");
            let _ = stream.shutdown(Shutdown::Both);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Decode inbound frames until the client closes, errors, or sends
/// something undecodable. Client messages are only logged.
fn read_until_closed<R: BufRead>(reader: &mut R, id: ConnectionId) {
    loop {
        let decoded = read_frame_bytes(reader).and_then(|bytes| decode_frame(&bytes));
        match decoded {
            Ok(Decoded::Message { value, .. }) => debug!(conn_id = %id, %value, "client message"),
            Ok(Decoded::Ignored { opcode }) => trace!(conn_id = %id, opcode, "ignored frame"),
            Ok(Decoded::Close) => {
                debug!(conn_id = %id, "close frame");
                return;
            }
            Err(WsError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(conn_id = %id, "peer hung up");
                return;
            }
            Err(e) => {
                debug!(conn_id = %id, error = %e, "dropping connection");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    /// A connected pair: the server-side registry handle, the server-side
    /// reader handle, and the client end.
    fn socket_pair() -> (TcpStream, TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        let reader = server.try_clone().unwrap();
        (server, reader, client)
    }

    #[test]
    fn test_send_reload_delivers_frame() {
        let (server, _reader, mut client) = socket_pair();
        let registry: SharedRegistry = Arc::new(Mutex::new(ConnectionRegistry::new()));
        registry.lock().register(server);

        let report = send_reload(&ReloadBroadcaster::default(), &registry);
        assert_eq!(report.delivered.len(), 1);

        let mut frame = [0u8; 22];
        client.read_exact(&mut frame).unwrap();
        assert_eq!(&frame, b"\x81\x14{\"message\":\"reload\"}");
    }

    #[test]
    fn test_evicted_socket_is_shut_down() {
        let (server, mut reader, _client) = socket_pair();
        reader.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        // Writes on a socket shut down for writing fail, like a dead peer.
        server.shutdown(Shutdown::Write).unwrap();

        let registry: SharedRegistry = Arc::new(Mutex::new(ConnectionRegistry::new()));
        let id = registry.lock().register(server);

        let report = send_reload(&ReloadBroadcaster::default(), &registry);
        assert_eq!(report.failed, vec![id]);
        assert!(registry.lock().is_empty());

        // The reader handle still owns the fd, but the socket is closed for
        // reading, so the connection thread's read ends instead of blocking.
        let mut buf = [0u8; 1];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
