//! Transport-side connection table
//!
//! Tracks which remote addresses currently count as connected clients:
//! - identifier assignment on connect (the id is the only identity a client has)
//! - address lookup for routing replies and broadcasts
//! - liveness tracking and timeout-based disconnect detection
//! - connection capacity enforcement
//!
//! Everything above this layer works in terms of [`ConnectionId`]; the
//! session core never sees a socket address.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// How long a connection may stay silent before it is considered dropped.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected client as the transport sees it.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    /// Last time any datagram arrived from this address.
    pub last_seen: Instant,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Registry of live connections, indexed by id.
///
/// Ids start at 1 and increase monotonically; they are never reused, so a
/// stale id from a closed connection can never alias a new client.
pub struct ConnectionManager {
    connections: HashMap<ConnectionId, Connection>,
    next_connection_id: ConnectionId,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            next_connection_id: 1,
            max_connections,
        }
    }

    /// Registers a new connection for `addr`.
    ///
    /// Returns `None` when the server is at capacity. The caller is expected
    /// to have removed any previous registration for the same address.
    pub fn register(&mut self, addr: SocketAddr) -> Option<ConnectionId> {
        if self.connections.len() >= self.max_connections {
            return None;
        }

        let connection_id = self.next_connection_id;
        self.next_connection_id += 1;

        info!("Connection {} registered from {}", connection_id, addr);
        self.connections
            .insert(connection_id, Connection::new(connection_id, addr));

        Some(connection_id)
    }

    /// Removes a connection. Returns false if it was already gone.
    pub fn remove(&mut self, connection_id: ConnectionId) -> bool {
        if let Some(connection) = self.connections.remove(&connection_id) {
            info!("Connection {} closed", connection.id);
            true
        } else {
            false
        }
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.connections
            .iter()
            .find(|(_, connection)| connection.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, connection_id: ConnectionId) -> Option<SocketAddr> {
        self.connections
            .get(&connection_id)
            .map(|connection| connection.addr)
    }

    /// Refreshes the liveness deadline for a connection.
    pub fn touch(&mut self, connection_id: ConnectionId) {
        if let Some(connection) = self.connections.get_mut(&connection_id) {
            connection.last_seen = Instant::now();
        }
    }

    /// Removes every connection that has been silent past the timeout and
    /// returns their ids so session state can be cleaned up as well.
    pub fn check_timeouts(&mut self) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, connection)| connection.is_timed_out(CONNECTION_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for connection_id in &timed_out {
            self.remove(*connection_id);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:4001".parse().unwrap()
    }

    #[test]
    fn test_register_assigns_increasing_ids() {
        let mut manager = ConnectionManager::new(4);

        let first = manager.register(test_addr()).unwrap();
        let second = manager.register(test_addr2()).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_register_at_capacity() {
        let mut manager = ConnectionManager::new(1);

        assert!(manager.register(test_addr()).is_some());
        assert!(manager.register(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_not_reused_after_remove() {
        let mut manager = ConnectionManager::new(2);

        let first = manager.register(test_addr()).unwrap();
        manager.remove(first);

        let second = manager.register(test_addr()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_remove_nonexistent() {
        let mut manager = ConnectionManager::new(2);
        assert!(!manager.remove(999));
    }

    #[test]
    fn test_find_by_addr() {
        let mut manager = ConnectionManager::new(2);
        let id = manager.register(test_addr()).unwrap();

        assert_eq!(manager.find_by_addr(test_addr()), Some(id));
        assert_eq!(manager.find_by_addr(test_addr2()), None);
    }

    #[test]
    fn test_addr_of() {
        let mut manager = ConnectionManager::new(2);
        let id = manager.register(test_addr()).unwrap();

        assert_eq!(manager.addr_of(id), Some(test_addr()));
        assert_eq!(manager.addr_of(id + 1), None);
    }

    #[test]
    fn test_timeout_detection() {
        let addr = test_addr();
        let mut connection = Connection::new(1, addr);

        assert!(!connection.is_timed_out(Duration::from_secs(1)));

        connection.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(connection.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_check_timeouts_removes_silent_connections() {
        let mut manager = ConnectionManager::new(4);
        let stale = manager.register(test_addr()).unwrap();
        let fresh = manager.register(test_addr2()).unwrap();

        if let Some(connection) = manager.connections.get_mut(&stale) {
            connection.last_seen = Instant::now() - CONNECTION_TIMEOUT - Duration::from_secs(1);
        }

        let timed_out = manager.check_timeouts();

        assert_eq!(timed_out, vec![stale]);
        assert_eq!(manager.len(), 1);
        assert!(manager.addr_of(fresh).is_some());
    }

    #[test]
    fn test_touch_refreshes_deadline() {
        let mut manager = ConnectionManager::new(2);
        let id = manager.register(test_addr()).unwrap();

        if let Some(connection) = manager.connections.get_mut(&id) {
            connection.last_seen = Instant::now() - CONNECTION_TIMEOUT - Duration::from_secs(1);
        }
        manager.touch(id);

        assert!(manager.check_timeouts().is_empty());
        assert_eq!(manager.len(), 1);
    }
}
