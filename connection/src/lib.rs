//! Bitcoin p2p plumbing for a peer crawler.
//!
//! Wire encoding for the handful of messages a crawler needs, plus a
//! non-blocking per-peer [`Connection`] state machine that drives the
//! handshake and harvests `addr` gossip.

mod address;
mod connection;
mod peer;
mod user_agent;
pub mod wire;

pub use address::Address;
pub use connection::{
    connect, default_user_agent, Connection, ConnectionConfiguration, ConnectionError,
    ConnectionState, PeerEvent, SendQueue, Socket, TcpConnection,
};
pub use peer::{
    PeerHandshake, PeerProtocolVersion, PeerServices, ADDRESS_TIME_VERSION,
    DEFAULT_PROTOCOL_VERSION, EXTENDED_VERSION_MESSAGE_VERSION, RELAY_VERSION,
};
pub use user_agent::{UserAgent, UserAgentError};
