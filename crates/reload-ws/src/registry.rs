//! Registry of connections that completed the WebSocket handshake.
//!
//! The registry is an explicit value owned by whoever runs the server and
//! handed by reference to the broadcaster; there is no global instance.
//! Membership is unordered. Entries leave either through [`remove`] (close
//! frame observed, read error) or through eviction after a failed write.
//!
//! [`remove`]: ConnectionRegistry::remove

use std::fmt;

use rustc_hash::FxHashMap;

/// Handle for one registered connection, unique per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Live sockets keyed by [`ConnectionId`].
pub struct ConnectionRegistry<W> {
    next_id: u64,
    connections: FxHashMap<ConnectionId, W>,
}

impl<W> ConnectionRegistry<W> {
    /// Create a new empty registry.
    pub fn new() -> Self {
        ConnectionRegistry {
            next_id: 0,
            connections: FxHashMap::default(),
        }
    }

    /// Add a socket that just completed the handshake.
    pub fn register(&mut self, socket: W) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.connections.insert(id, socket);
        id
    }

    /// Forget a connection, handing its socket back. `None` if it was
    /// already gone.
    pub fn remove(&mut self, id: ConnectionId) -> Option<W> {
        self.connections.remove(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of the registered ids, in no particular order.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (ConnectionId, &mut W)> {
        self.connections.iter_mut().map(|(id, w)| (*id, w))
    }
}

impl<W> Default for ConnectionRegistry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> fmt::Debug for ConnectionRegistry<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_distinct_ids() {
        let mut registry = ConnectionRegistry::new();
        let a = registry.register(Vec::<u8>::new());
        let b = registry.register(Vec::<u8>::new());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a));
        assert!(registry.contains(b));
    }

    #[test]
    fn test_remove() {
        let mut registry = ConnectionRegistry::new();
        let a = registry.register(vec![1u8]);
        let b = registry.register(vec![2u8]);

        assert_eq!(registry.remove(a), Some(vec![1u8]));
        assert_eq!(registry.remove(a), None);
        assert!(!registry.contains(a));
        assert_eq!(registry.ids(), vec![b]);
    }

    #[test]
    fn test_ids_not_reused_after_remove() {
        let mut registry = ConnectionRegistry::new();
        let a = registry.register(());
        registry.remove(a);
        let b = registry.register(());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_display() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.register(());
        assert_eq!(id.to_string(), "conn-0");
        assert_eq!(id.as_u64(), 0);
    }
}
