//! Readiness notification for many sockets at once.

use mio::event::Source;
use mio::{Events, Poll, Token};
use std::io;
use std::time::Duration;

/// Opaque handle tying a registration to its connection.
///
/// Tags are allocated monotonically and never reused, so a notification for a
/// connection that has since been closed can not be mistaken for a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub usize);

/// Readiness a registration asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    ReadWrite,
}

/// One notification out of [`Multiplexer::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub tag: Tag,
    /// Data, or end of stream, is available.
    pub readable: bool,
    pub writable: bool,
    pub errored: bool,
}

/// Register/modify/deregister/wait over sockets of type `S`.
pub trait Multiplexer<S> {
    fn register(&mut self, socket: &mut S, tag: Tag, interest: Interest) -> io::Result<()>;

    /// Replace the interest of an existing registration.
    fn reregister(&mut self, socket: &mut S, tag: Tag, interest: Interest) -> io::Result<()>;

    fn deregister(&mut self, socket: &mut S) -> io::Result<()>;

    /// Block until a registered socket is ready or `timeout` elapses.
    ///
    /// Replaces the contents of `events` with at most `capacity` notifications.
    /// Readiness beyond `capacity` stays pending for a later wait. An
    /// interrupted wait returns no notifications rather than an error.
    fn wait(
        &mut self,
        events: &mut Vec<Readiness>,
        capacity: usize,
        timeout: Option<Duration>,
    ) -> io::Result<()>;
}

/// [`Multiplexer`] backed by mio, which picks epoll, kqueue or IOCP per platform.
///
/// Notifications are edge triggered.
#[derive(Debug)]
pub struct MioMultiplexer {
    poll: Poll,
    events: Events,
}

impl MioMultiplexer {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(64),
        })
    }
}

fn mio_interest(interest: Interest) -> mio::Interest {
    match interest {
        Interest::Readable => mio::Interest::READABLE,
        Interest::ReadWrite => mio::Interest::READABLE | mio::Interest::WRITABLE,
    }
}

impl<S: Source> Multiplexer<S> for MioMultiplexer {
    fn register(&mut self, socket: &mut S, tag: Tag, interest: Interest) -> io::Result<()> {
        self.poll
            .registry()
            .register(socket, Token(tag.0), mio_interest(interest))
    }

    fn reregister(&mut self, socket: &mut S, tag: Tag, interest: Interest) -> io::Result<()> {
        self.poll
            .registry()
            .reregister(socket, Token(tag.0), mio_interest(interest))
    }

    fn deregister(&mut self, socket: &mut S) -> io::Result<()> {
        self.poll.registry().deregister(socket)
    }

    fn wait(
        &mut self,
        events: &mut Vec<Readiness>,
        capacity: usize,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();
        let capacity = capacity.max(1);
        // Events that do not fit stay queued in the kernel for the next poll.
        if self.events.capacity() != capacity {
            self.events = Events::with_capacity(capacity);
        }

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        events.extend(self.events.iter().map(|event| Readiness {
            tag: Tag(event.token().0),
            readable: event.is_readable() || event.is_read_closed(),
            writable: event.is_writable() || event.is_write_closed(),
            errored: event.is_error(),
        }));
        Ok(())
    }
}
