//! Ownership of live connections.

use crate::poller::Tag;
use bitcoin_seeder_connection::Connection;
use std::collections::{HashMap, VecDeque};

/// Live connections keyed by [`Tag`], plus the order they were admitted in.
#[derive(Debug)]
pub struct Registry<S> {
    connections: HashMap<Tag, Connection<S>>,
    /// Tags in admission order. Oldest at the front.
    eviction: VecDeque<Tag>,
    next_tag: usize,
}

impl<S> Registry<S> {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            eviction: VecDeque::new(),
            next_tag: 0,
        }
    }

    /// Take ownership of `connection` and assign it a fresh tag.
    pub fn add(&mut self, connection: Connection<S>) -> Tag {
        let tag = Tag(self.next_tag);
        self.next_tag += 1;
        self.connections.insert(tag, connection);
        self.eviction.push_back(tag);
        tag
    }

    /// Pop the oldest admitted connection's tag, whatever its state.
    ///
    /// The connection itself stays registered until [`Registry::remove`].
    pub fn evict(&mut self) -> Option<Tag> {
        self.eviction.pop_front()
    }

    /// Remove and return a connection. Dropping it closes the socket.
    ///
    /// Removing an unknown tag is a no-op.
    pub fn remove(&mut self, tag: Tag) -> Option<Connection<S>> {
        let connection = self.connections.remove(&tag)?;
        if let Some(position) = self.eviction.iter().position(|t| *t == tag) {
            self.eviction.remove(position);
        }
        Some(connection)
    }

    pub fn get(&self, tag: Tag) -> Option<&Connection<S>> {
        self.connections.get(&tag)
    }

    pub fn get_mut(&mut self, tag: Tag) -> Option<&mut Connection<S>> {
        self.connections.get_mut(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.connections.contains_key(&tag)
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.eviction.iter().copied()
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin_seeder_connection::{Address, ConnectionConfiguration, Socket};
    use std::io::{self, Read, Write};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    struct IdleSocket;

    impl Read for IdleSocket {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    impl Write for IdleSocket {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Socket for IdleSocket {
        fn local_addr(&self) -> io::Result<SocketAddr> {
            Err(io::ErrorKind::NotConnected.into())
        }

        fn peer_addr(&self) -> io::Result<SocketAddr> {
            Err(io::ErrorKind::NotConnected.into())
        }

        fn take_error(&self) -> io::Result<Option<io::Error>> {
            Ok(None)
        }
    }

    fn connection(last: u8) -> Connection<IdleSocket> {
        Connection::new(
            IdleSocket,
            Address::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, last)), 8333),
            ConnectionConfiguration::default(),
        )
    }

    #[test]
    fn test_tags_are_never_reused() {
        let mut registry = Registry::new();
        let first = registry.add(connection(1));
        registry.remove(first);
        let second = registry.add(connection(2));
        assert_ne!(first, second);
        assert!(!registry.contains(first));
        assert!(registry.contains(second));
    }

    #[test]
    fn test_evict_oldest_first() {
        let mut registry = Registry::new();
        let first = registry.add(connection(1));
        let second = registry.add(connection(2));
        let third = registry.add(connection(3));

        assert_eq!(registry.evict(), Some(first));
        let evicted = registry.remove(first).unwrap();
        assert_eq!(evicted.peer().ip(), IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(registry.count(), 2);

        // A removed connection leaves the eviction order too.
        registry.remove(second);
        assert_eq!(registry.evict(), Some(third));
        assert_eq!(registry.evict(), None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = Registry::new();
        let tag = registry.add(connection(1));
        assert!(registry.remove(tag).is_some());
        assert!(registry.remove(tag).is_none());
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.tags().count(), 0);
    }

    #[test]
    fn test_get_mut() {
        let mut registry = Registry::new();
        let tag = registry.add(connection(4));
        let conn = registry.get_mut(tag).unwrap();
        conn.mark_connecting();
        assert!(!conn.state().is_established());
        assert!(registry.get_mut(Tag(99)).is_none());
    }
}
