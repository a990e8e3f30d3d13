//! Connection lifecycle tracking.
//!
//! 1. **Init**: the connection exists, no connect has been issued.
//! 2. **Connecting**: a non-blocking connect is in flight.
//! 3. **Connected**: the connect completed, local and remote addresses are known.
//! 4. **VersionSent**: our version message is queued. This is terminal.
//!
//! Receiving the peer's version does not move the state. Whether the peer has
//! completed its half of the handshake is read from the recorded peer version.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Init,
    Connecting,
    Connected,
    VersionSent,
}

impl ConnectionState {
    /// Whether the transport connect has completed.
    pub fn is_established(&self) -> bool {
        *self >= ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Init => "init",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::VersionSent => "version-sent",
        };
        f.write_str(name)
    }
}
