//! Per-peer connection state machine.
//!
//! A [`Connection`] owns one non-blocking socket and everything needed to talk
//! to the peer behind it: lifecycle state, the reassembly buffer for inbound
//! frames, and the queue of outbound frames. It never blocks and never waits.
//! The caller reacts to readiness notifications by calling
//! [`Connection::on_writable`] and [`Connection::on_readable`], and harvests
//! what the peer told us as [`PeerEvent`]s.
//!
//! The protocol surface is deliberately small. We send `version`, answer the
//! peer's `version` with `verack` and its `ping` with `pong`, and collect the
//! records of every `addr` message. Everything else is ignored.

mod configuration;
mod error;
mod handshake;
mod io;
mod state;
mod tcp;

pub use configuration::{default_user_agent, ConnectionConfiguration};
pub use error::ConnectionError;
pub use io::{SendQueue, Socket};
pub use state::ConnectionState;
pub use tcp::{connect, TcpConnection};

use self::io::READ_CHUNK_SIZE;
use crate::address::Address;
use crate::peer::{PeerHandshake, PeerProtocolVersion, PeerServices};
use crate::wire::{
    self, decode_addr_payload, decode_header, decode_ping_payload, decode_version, peek_version,
    MessageHeader, ADDR, HEADER_SIZE, MAX_PAYLOAD_SIZE, PING, PONG, VERACK, VERSION,
};
use bitcoin::p2p::ServiceFlags;
use log::{debug, info, trace};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};

/// Something a peer told us that the crawl cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The peer's `version` message arrived.
    Handshake(PeerHandshake),
    /// Records of one `addr` message, in message order.
    Addresses(Vec<Address>),
}

/// A connection to a single peer.
#[derive(Debug)]
pub struct Connection<S> {
    socket: S,
    peer: Address,
    /// Our end of the socket, once the connect completes.
    local: Option<Address>,
    configuration: ConnectionConfiguration,
    state: ConnectionState,
    peer_version: PeerProtocolVersion,
    peer_services: PeerServices,
    /// Unconsumed inbound bytes. Always starts at a frame header, or inside
    /// the payload of `header` when it is set.
    read_buffer: Vec<u8>,
    /// Header of a frame whose payload has not fully arrived.
    header: Option<MessageHeader>,
    send_queue: SendQueue,
}

impl<S: Socket> Connection<S> {
    pub fn new(socket: S, peer: Address, configuration: ConnectionConfiguration) -> Self {
        Self {
            socket,
            peer,
            local: None,
            configuration,
            state: ConnectionState::Init,
            peer_version: PeerProtocolVersion::Unknown,
            peer_services: PeerServices::Unknown,
            read_buffer: Vec::new(),
            header: None,
            send_queue: SendQueue::default(),
        }
    }

    /// Record that a non-blocking connect was issued and has not completed.
    pub fn mark_connecting(&mut self) {
        if self.state == ConnectionState::Init {
            self.state = ConnectionState::Connecting;
        }
    }

    /// Record a connect that completed immediately and queue our version.
    pub fn established(&mut self) {
        if !self.state.is_established() {
            self.mark_connected();
        }
        self.send_version();
    }

    /// React to the socket becoming writable.
    ///
    /// Completes a pending connect, queues our version once connected, and
    /// flushes the send queue. Returns `true` while write interest is still
    /// needed, either because the connect is in flight or data remains queued.
    pub fn on_writable(&mut self) -> Result<bool, ConnectionError> {
        if !self.state.is_established() {
            if let Some(err) = self.socket.take_error()? {
                return Err(ConnectionError::Io(err));
            }
            match self.socket.peer_addr() {
                Ok(_) => self.mark_connected(),
                Err(e) if e.kind() == ErrorKind::NotConnected => {
                    trace!("Spurious writable notification for {}", self.peer);
                    return Ok(true);
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.send_version();
        self.send_buffer()
    }

    /// React to the socket becoming readable.
    ///
    /// Reads until the socket would block, pushing what the peer reported into
    /// `events`. Events extracted before an error are kept, so addresses from
    /// a peer that hangs up right after sending them are not lost.
    pub fn on_readable(&mut self, events: &mut Vec<PeerEvent>) -> Result<(), ConnectionError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.socket.read(&mut chunk) {
                Ok(0) => return Err(ConnectionError::PeerClosed),
                Ok(n) => self.receive(&chunk[..n], events)?,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The pending socket error, for an error notification.
    pub fn on_error(&mut self) -> ConnectionError {
        match self.socket.take_error() {
            Ok(Some(err)) | Err(err) => ConnectionError::Io(err),
            Ok(None) => ConnectionError::PeerClosed,
        }
    }

    /// Feed inbound bytes through reassembly and dispatch every complete frame.
    pub fn receive(
        &mut self,
        bytes: &[u8],
        events: &mut Vec<PeerEvent>,
    ) -> Result<(), ConnectionError> {
        let mut buffer = std::mem::take(&mut self.read_buffer);
        buffer.extend_from_slice(bytes);
        let mut consumed = 0;
        let result = self.process_frames(&buffer, &mut consumed, events);
        buffer.drain(..consumed);
        self.read_buffer = buffer;
        result
    }

    /// Write queued frames until the socket pushes back.
    ///
    /// Returns `true` if data remains queued.
    pub fn send_buffer(&mut self) -> Result<bool, ConnectionError> {
        Ok(self.send_queue.flush(&mut self.socket)?)
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.send_queue.is_empty()
    }

    /// Whether the peer's version has been received.
    pub fn handshake_complete(&self) -> bool {
        matches!(self.peer_version, PeerProtocolVersion::Known(_))
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> &Address {
        &self.peer
    }

    pub fn local(&self) -> Option<&Address> {
        self.local.as_ref()
    }

    pub fn peer_version(&self) -> PeerProtocolVersion {
        self.peer_version
    }

    pub fn peer_services(&self) -> PeerServices {
        self.peer_services
    }

    /// Inbound bytes received but not yet consumed by a complete frame.
    pub fn buffered_len(&self) -> usize {
        self.read_buffer.len()
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    fn mark_connected(&mut self) {
        self.local = self.socket.local_addr().ok().map(Address::from);
        self.state = ConnectionState::Connected;
        debug!("Connected to {}", self.peer);
    }

    fn send_version(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let local = self
            .local
            .unwrap_or_else(|| Address::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
        let payload = handshake::version_payload(&self.configuration, local, self.peer);
        let mut bytes = Vec::new();
        wire::encode_version(&mut bytes, &payload, self.configuration.protocol_version);
        self.push(VERSION, &bytes);
        self.state = ConnectionState::VersionSent;
        debug!("Queued version for {}", self.peer);
    }

    fn push(&mut self, command: wire::Command, payload: &[u8]) {
        self.send_queue
            .push(wire::frame(self.configuration.magic, command, payload));
    }

    fn process_frames(
        &mut self,
        buffer: &[u8],
        consumed: &mut usize,
        events: &mut Vec<PeerEvent>,
    ) -> Result<(), ConnectionError> {
        loop {
            let header = match self.header {
                Some(header) => header,
                None => {
                    if buffer.len() - *consumed < HEADER_SIZE {
                        return Ok(());
                    }
                    let header = decode_header(&buffer[*consumed..*consumed + HEADER_SIZE])?;
                    if header.magic != self.configuration.magic {
                        return Err(ConnectionError::MagicMismatch {
                            expected: self.configuration.magic,
                            received: header.magic,
                        });
                    }
                    if header.payload_length > MAX_PAYLOAD_SIZE {
                        return Err(ConnectionError::PayloadTooLarge(header.payload_length));
                    }
                    self.header = Some(header);
                    header
                }
            };

            let start = *consumed + HEADER_SIZE;
            let end = start + header.payload_length as usize;
            if buffer.len() < end {
                return Ok(());
            }
            self.header = None;
            *consumed = end;
            self.dispatch(&header, &buffer[start..end], events)?;
        }
    }

    fn dispatch(
        &mut self,
        header: &MessageHeader,
        payload: &[u8],
        events: &mut Vec<PeerEvent>,
    ) -> Result<(), ConnectionError> {
        if self.configuration.verify_checksum && wire::checksum(payload) != header.checksum {
            return Err(ConnectionError::ChecksumMismatch {
                command: header.command,
            });
        }

        match header.command {
            VERSION => self.handle_version(payload, events),
            VERACK => {
                debug!("Received verack from {}", self.peer);
                Ok(())
            }
            PING => self.handle_ping(payload),
            ADDR => self.handle_addr(payload, events),
            command => {
                trace!("Ignoring {} message from {}", command, self.peer);
                Ok(())
            }
        }
    }

    fn handle_version(
        &mut self,
        payload: &[u8],
        events: &mut Vec<PeerEvent>,
    ) -> Result<(), ConnectionError> {
        let (version, services) = peek_version(payload)?;
        let message = decode_version(payload, version)?;
        self.peer_version = PeerProtocolVersion::Known(version);
        self.peer_services = PeerServices::Known(services);

        let handshake = PeerHandshake {
            address: self.peer.with_services(services),
            user_agent: message.user_agent,
            version,
            services,
            start_height: message.start_height,
        };
        info!("Received version from {handshake}");
        events.push(PeerEvent::Handshake(handshake));

        self.push(VERACK, &[]);
        Ok(())
    }

    fn handle_ping(&mut self, payload: &[u8]) -> Result<(), ConnectionError> {
        // Pre-BIP31 pings carry no nonce and expect no reply.
        if payload.is_empty() {
            return Ok(());
        }
        let nonce = decode_ping_payload(payload)?;
        self.push(PONG, &nonce.to_le_bytes());
        Ok(())
    }

    fn handle_addr(
        &mut self,
        payload: &[u8],
        events: &mut Vec<PeerEvent>,
    ) -> Result<(), ConnectionError> {
        let version = self
            .peer_version
            .unwrap_or(self.configuration.protocol_version);
        let addresses = decode_addr_payload(payload, version)?;
        for address in &addresses {
            debug!("Got address {} from {}", address, self.peer);
        }
        events.push(PeerEvent::Addresses(addresses));
        Ok(())
    }
}

impl<S> Connection<S> {
    /// Services the peer advertised, none until its version arrives.
    pub fn advertised_services(&self) -> ServiceFlags {
        match self.peer_services {
            PeerServices::Known(services) => services,
            PeerServices::Unknown => ServiceFlags::NONE,
        }
    }
}
