//! Reload fan-out to every registered connection.
//!
//! A broadcast encodes its frame once, then writes it to each socket in the
//! registry independently. A failed write never aborts the broadcast and
//! never surfaces as an error to the caller; it only shows up in the
//! [`BroadcastReport`] and, under [`FailurePolicy::Evict`], removes the
//! socket from the registry.
//!
//! Evicted sockets are handed to the caller through the `*_with` variants.
//! A registry entry may be one handle of a socket that is also read
//! elsewhere, so dropping it is not enough to close the connection; the
//! caller decides how to shut it down.

use std::io::Write;

use serde::Serialize;
use tracing::{debug, warn};

use crate::frame::encode_text;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// What to do with a socket whose write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Drop the socket from the registry on its first failed write.
    #[default]
    Evict,
    /// Legacy behavior: swallow the failure and keep the socket registered.
    Retain,
}

/// The fixed notification sent after every rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadMessage {
    pub message: &'static str,
}

impl ReloadMessage {
    pub fn new() -> Self {
        ReloadMessage { message: "reload" }
    }
}

impl Default for ReloadMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-broadcast outcome, collected from each write attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<ConnectionId>,
    pub failed: Vec<ConnectionId>,
    /// Whether `failed` connections were removed from the registry.
    pub evicted: bool,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

/// Sends [`ReloadMessage`] to all registered connections on rebuild.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReloadBroadcaster {
    policy: FailurePolicy,
}

impl ReloadBroadcaster {
    pub fn new(policy: FailurePolicy) -> Self {
        ReloadBroadcaster { policy }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Handle one "assets rebuilt" signal. Evicted sockets are dropped.
    pub fn on_rebuild<W: Write>(&self, registry: &mut ConnectionRegistry<W>) -> BroadcastReport {
        self.on_rebuild_with(registry, |_, _| {})
    }

    /// Like [`on_rebuild`](Self::on_rebuild), passing each evicted socket to
    /// `on_evict` once it is out of the registry.
    pub fn on_rebuild_with<W, F>(&self, registry: &mut ConnectionRegistry<W>, on_evict: F) -> BroadcastReport
    where
        W: Write,
        F: FnMut(ConnectionId, W),
    {
        self.broadcast_with(registry, &ReloadMessage::new(), on_evict)
    }

    /// Encode `value` once and write it to every connection in `registry`.
    pub fn broadcast<W, T>(&self, registry: &mut ConnectionRegistry<W>, value: &T) -> BroadcastReport
    where
        W: Write,
        T: Serialize + ?Sized,
    {
        self.broadcast_with(registry, value, |_, _| {})
    }

    /// Like [`broadcast`](Self::broadcast), passing each evicted socket to
    /// `on_evict`. Never called under [`FailurePolicy::Retain`].
    pub fn broadcast_with<W, T, F>(
        &self,
        registry: &mut ConnectionRegistry<W>,
        value: &T,
        mut on_evict: F,
    ) -> BroadcastReport
    where
        W: Write,
        T: Serialize + ?Sized,
        F: FnMut(ConnectionId, W),
    {
        let frame = match encode_text(value) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "failed to encode broadcast frame");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        for (id, socket) in registry.iter_mut() {
            match socket.write_all(&frame).and_then(|()| socket.flush()) {
                Ok(()) => report.delivered.push(id),
                Err(e) => {
                    debug!(conn_id = %id, error = %e, "broadcast write failed");
                    report.failed.push(id);
                }
            }
        }

        if self.policy == FailurePolicy::Evict {
            for &id in &report.failed {
                if let Some(socket) = registry.remove(id) {
                    on_evict(id, socket);
                }
            }
            report.evicted = true;
        }

        debug!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            remaining = registry.len(),
            "broadcast"
        );
        report
    }
}
