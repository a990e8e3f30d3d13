//! The crawl event loop.
//!
//! An [`Engine`] owns every live connection and runs on a single thread. Each
//! [`Engine::turn`] admits a batch of queued addresses, waits for readiness,
//! and drives the ready connections. Addresses peers gossip go back into the
//! shared [`AddressQueue`], handshakes go to the [`Reporter`].

use crate::poller::{Interest, Multiplexer, Readiness, Tag};
use crate::queue::{AddressQueue, QueueError};
use crate::registry::Registry;
use crate::reporter::Reporter;
use bitcoin_seeder_connection::{
    connect, Address, Connection, ConnectionConfiguration, ConnectionError, PeerEvent, Socket,
};
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Errors that stop the engine.
#[derive(Debug)]
pub enum EngineError {
    /// The readiness multiplexer could not be created.
    Multiplexer(io::Error),
    /// The file descriptor limit could not be read.
    ResourceLimit(io::Error),
    /// Waiting for readiness failed.
    Wait(io::Error),
    /// The address queue rejected a drain.
    Queue(QueueError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Multiplexer(err) => write!(f, "Failed to create multiplexer: {err}"),
            EngineError::ResourceLimit(err) => {
                write!(f, "Failed to read file descriptor limit: {err}")
            }
            EngineError::Wait(err) => write!(f, "Readiness wait failed: {err}"),
            EngineError::Queue(err) => write!(f, "Address queue error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Multiplexer(err) => Some(err),
            EngineError::ResourceLimit(err) => Some(err),
            EngineError::Wait(err) => Some(err),
            EngineError::Queue(err) => Some(err),
        }
    }
}

impl From<QueueError> for EngineError {
    fn from(err: QueueError) -> Self {
        EngineError::Queue(err)
    }
}

/// Maximum number of open connections the process can afford.
///
/// The soft `RLIMIT_NOFILE` limit, less `margin` descriptors held back for
/// everything that is not a peer socket.
pub fn admission_ceiling(margin: usize) -> Result<usize, EngineError> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `limit` is a valid, writable rlimit for the duration of the call.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc != 0 {
        return Err(EngineError::ResourceLimit(io::Error::last_os_error()));
    }
    let soft = usize::try_from(limit.rlim_cur).unwrap_or(usize::MAX);
    Ok(soft.saturating_sub(margin).max(1))
}

/// Outcome of starting a connect.
#[derive(Debug)]
pub enum Dialed<S> {
    /// The connect is in flight, completion shows up as writability.
    InProgress(S),
    /// The connect already completed.
    Established(S),
}

/// Opens outbound sockets for the engine.
pub trait Dialer {
    type Stream: Socket;

    fn dial(&mut self, address: &Address) -> Result<Dialed<Self::Stream>, ConnectionError>;
}

/// Non-blocking TCP dialer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Stream = mio::net::TcpStream;

    fn dial(&mut self, address: &Address) -> Result<Dialed<Self::Stream>, ConnectionError> {
        connect(address).map(Dialed::InProgress)
    }
}

/// Tunables of the event loop.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Most connections open at once.
    pub max_connections: usize,
    /// Most addresses admitted per turn.
    pub batch_size: usize,
    /// Longest a turn blocks waiting for readiness.
    pub poll_timeout: Duration,
    /// Minimum period between status log lines.
    pub status_interval: Duration,
}

/// Single-threaded crawl driver.
pub struct Engine<D: Dialer, M> {
    queue: Arc<AddressQueue>,
    reporter: Arc<dyn Reporter>,
    dialer: D,
    multiplexer: M,
    registry: Registry<D::Stream>,
    configuration: ConnectionConfiguration,
    settings: EngineSettings,
    /// Tags currently registered with write interest.
    write_interest: HashSet<Tag>,
    readiness: Vec<Readiness>,
    peer_events: Vec<PeerEvent>,
    shutdown: Arc<AtomicBool>,
    last_status: Instant,
}

impl<D, M> Engine<D, M>
where
    D: Dialer,
    M: Multiplexer<D::Stream>,
{
    pub fn new(
        queue: Arc<AddressQueue>,
        reporter: Arc<dyn Reporter>,
        dialer: D,
        multiplexer: M,
        configuration: ConnectionConfiguration,
        settings: EngineSettings,
    ) -> Self {
        Self {
            queue,
            reporter,
            dialer,
            multiplexer,
            registry: Registry::new(),
            configuration,
            settings,
            write_interest: HashSet::new(),
            readiness: Vec::new(),
            peer_events: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            last_status: Instant::now(),
        }
    }

    /// Flag that stops [`Engine::run`] when set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Crawl until the shutdown flag is set or the loop fails.
    pub fn run(&mut self) -> Result<(), EngineError> {
        info!(
            "Starting crawl with up to {} connections",
            self.settings.max_connections
        );
        while !self.shutdown.load(Ordering::Relaxed) {
            self.turn()?;
        }
        info!(
            "Crawl stopped with {} connections open, {} addresses seen",
            self.registry.count(),
            self.queue.seen_count()
        );
        Ok(())
    }

    /// One iteration: admit, wait, dispatch.
    ///
    /// Returns how many readiness notifications were handled.
    pub fn turn(&mut self) -> Result<usize, EngineError> {
        for address in self.queue.drain(self.settings.batch_size, false)? {
            self.admit(address);
        }

        let mut readiness = std::mem::take(&mut self.readiness);
        let capacity = self.registry.count().max(1);
        let waited = self
            .multiplexer
            .wait(&mut readiness, capacity, Some(self.settings.poll_timeout))
            .map_err(EngineError::Wait);
        let handled = readiness.len();
        if waited.is_ok() {
            for ready in readiness.drain(..) {
                self.dispatch(ready);
            }
        }
        self.readiness = readiness;
        waited?;

        self.log_status();
        Ok(handled)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.count()
    }

    pub fn max_connections(&self) -> usize {
        self.settings.max_connections
    }

    pub fn queue(&self) -> &Arc<AddressQueue> {
        &self.queue
    }

    /// Open a connection to `address`, evicting the oldest ones while full.
    fn admit(&mut self, address: Address) {
        while self.registry.count() >= self.settings.max_connections {
            match self.registry.evict() {
                Some(tag) => {
                    debug!("Connection limit reached, evicting {tag:?}");
                    self.close(tag);
                }
                None => break,
            }
        }

        let dialed = match self.dialer.dial(&address) {
            Ok(dialed) => dialed,
            Err(e) => {
                debug!("Failed to connect to {address}: {e}");
                return;
            }
        };
        let connection = match dialed {
            Dialed::InProgress(stream) => {
                let mut connection = Connection::new(stream, address, self.configuration.clone());
                connection.mark_connecting();
                connection
            }
            Dialed::Established(stream) => {
                let mut connection = Connection::new(stream, address, self.configuration.clone());
                connection.established();
                connection
            }
        };

        let tag = self.registry.add(connection);
        let registered = match self.registry.get_mut(tag) {
            Some(connection) => {
                self.multiplexer
                    .register(connection.socket_mut(), tag, Interest::ReadWrite)
            }
            None => return,
        };
        match registered {
            Ok(()) => {
                self.write_interest.insert(tag);
                trace!("Dialing {address} as {tag:?}");
            }
            Err(e) => {
                warn!("Failed to register {address}: {e}");
                self.registry.remove(tag);
            }
        }
    }

    fn dispatch(&mut self, ready: Readiness) {
        let Some(connection) = self.registry.get_mut(ready.tag) else {
            trace!("Ignoring readiness for closed {:?}", ready.tag);
            return;
        };
        let peer = *connection.peer();
        let result = drive(connection, ready, &mut self.peer_events);

        for event in self.peer_events.drain(..) {
            match event {
                PeerEvent::Handshake(handshake) => self.reporter.report_handshake(&handshake),
                PeerEvent::Addresses(addresses) => {
                    let offered = addresses.len();
                    let added = addresses
                        .into_iter()
                        .filter(|address| self.queue.offer(*address))
                        .count();
                    debug!("{peer} gossiped {offered} addresses, {added} new");
                }
            }
        }

        match result {
            Ok(()) => self.update_interest(ready.tag),
            Err(ConnectionError::PeerClosed) => {
                debug!("Peer {peer} closed the connection");
                self.close(ready.tag);
            }
            Err(e) => {
                debug!("Dropping {peer}: {e}");
                self.close(ready.tag);
            }
        }
    }

    /// Keep write interest only while a connect is in flight or data is queued.
    fn update_interest(&mut self, tag: Tag) {
        let Some(connection) = self.registry.get_mut(tag) else {
            return;
        };
        let wants_write = !connection.state().is_established() || connection.has_pending_writes();
        let has_write = self.write_interest.contains(&tag);
        if wants_write == has_write {
            return;
        }

        let interest = if wants_write {
            Interest::ReadWrite
        } else {
            Interest::Readable
        };
        match self
            .multiplexer
            .reregister(connection.socket_mut(), tag, interest)
        {
            Ok(()) if wants_write => {
                self.write_interest.insert(tag);
            }
            Ok(()) => {
                self.write_interest.remove(&tag);
            }
            Err(e) => warn!("Failed to update interest of {}: {e}", connection.peer()),
        }
    }

    fn close(&mut self, tag: Tag) {
        self.write_interest.remove(&tag);
        if let Some(mut connection) = self.registry.remove(tag) {
            if let Err(e) = self.multiplexer.deregister(connection.socket_mut()) {
                warn!("Failed to deregister {}: {e}", connection.peer());
            }
        }
    }

    fn log_status(&mut self) {
        if self.last_status.elapsed() < self.settings.status_interval {
            return;
        }
        self.last_status = Instant::now();
        info!(
            "{} connections open, {} addresses queued, {} seen",
            self.registry.count(),
            self.queue.len(),
            self.queue.seen_count()
        );
    }
}

/// Run a connection's callbacks for one notification. Write side first.
fn drive<S: Socket>(
    connection: &mut Connection<S>,
    ready: Readiness,
    events: &mut Vec<PeerEvent>,
) -> Result<(), ConnectionError> {
    if ready.writable {
        connection.on_writable()?;
    }
    if ready.readable {
        connection.on_readable(events)?;
        connection.send_buffer()?;
    }
    if ready.errored {
        return Err(connection.on_error());
    }
    Ok(())
}

impl<D: Dialer, M> fmt::Debug for Engine<D, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("connections", &self.registry.count())
            .field("settings", &self.settings)
            .field("queue", &self.queue)
            .finish()
    }
}
