//! Error types for connection handling.

use crate::wire::{Command, WireError};
use bitcoin::p2p::Magic;
use std::error::Error;
use std::fmt;
use std::io;

/// Errors that tear down a single peer connection.
///
/// None of these are fatal to a crawl, the connection is closed and removed.
#[derive(Debug)]
pub enum ConnectionError {
    /// An I/O error occurred during network operations.
    Io(io::Error),
    /// A frame could not be decoded.
    Wire(WireError),
    /// The peer closed its end of the connection.
    PeerClosed,
    /// A frame belongs to a different network.
    MagicMismatch { expected: Magic, received: Magic },
    /// A payload does not hash to the checksum its header declares.
    ChecksumMismatch { command: Command },
    /// A header declares a payload above the protocol limit.
    PayloadTooLarge(u32),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Io(err) => write!(f, "Connection error: {err}"),
            ConnectionError::Wire(err) => write!(f, "Malformed frame from peer: {err}"),
            ConnectionError::PeerClosed => write!(f, "Peer closed the connection"),
            ConnectionError::MagicMismatch { expected, received } => {
                write!(f, "Invalid magic in header: expected {expected}, received {received}")
            }
            ConnectionError::ChecksumMismatch { command } => {
                write!(f, "Checksum mismatch on {command} message")
            }
            ConnectionError::PayloadTooLarge(len) => {
                write!(f, "Declared payload of {len} bytes exceeds protocol limit")
            }
        }
    }
}

impl Error for ConnectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConnectionError::Io(err) => Some(err),
            ConnectionError::Wire(err) => Some(err),
            ConnectionError::PeerClosed => None,
            ConnectionError::MagicMismatch { .. } => None,
            ConnectionError::ChecksumMismatch { .. } => None,
            ConnectionError::PayloadTooLarge(_) => None,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(err: io::Error) -> Self {
        ConnectionError::Io(err)
    }
}

impl From<WireError> for ConnectionError {
    fn from(err: WireError) -> Self {
        ConnectionError::Wire(err)
    }
}
