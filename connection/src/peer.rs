//! Peer metadata learned during the handshake.

use crate::address::Address;
use bitcoin::p2p::ServiceFlags;
use std::fmt;

/// Protocol version advertised by this crawler unless configured otherwise.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 70015;
/// First protocol version whose version message carries the receiver address,
/// nonce, user agent and start height.
pub const EXTENDED_VERSION_MESSAGE_VERSION: u32 = 106;
/// First protocol version whose address records carry a timestamp.
pub const ADDRESS_TIME_VERSION: u32 = 31402;
/// First protocol version whose version message carries the relay flag (BIP-37).
pub const RELAY_VERSION: u32 = 70001;

/// Represents the service state of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerServices {
    /// Known services with specific ServiceFlags.
    Known(ServiceFlags),
    /// Unknown services state.
    Unknown,
}

/// Represents the protocol version of a peer.
///
/// * **106** - Version message gains the receiver address, nonce, user agent and height.
/// * **31402** - Address records gain a timestamp.
/// * **70001** - BIP 0037, version message gains the relay flag.
/// * **70015** - Version advertised by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerProtocolVersion {
    /// Known protocol version.
    Known(u32),
    /// Unknown protocol version.
    Unknown,
}

impl PeerProtocolVersion {
    /// Returns the protocol version value if known, or a default value if unknown.
    pub fn unwrap_or(self, default: u32) -> u32 {
        match self {
            PeerProtocolVersion::Known(v) => v,
            PeerProtocolVersion::Unknown => default,
        }
    }
}

impl fmt::Display for PeerProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerProtocolVersion::Known(v) => write!(f, "{v}"),
            PeerProtocolVersion::Unknown => write!(f, "unknown"),
        }
    }
}

/// A peer whose `version` message has been observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerHandshake {
    /// Endpoint the handshake was received on.
    pub address: Address,
    /// User agent the peer advertised, possibly empty.
    pub user_agent: String,
    /// Protocol version the peer advertised.
    pub version: u32,
    /// Services the peer advertised.
    pub services: ServiceFlags,
    /// Best block height the peer claimed.
    pub start_height: u32,
}

impl fmt::Display for PeerHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ([peer] agent: {:?}, services: {}, version: {}, height: {})",
            self.address, self.user_agent, self.services, self.version, self.start_height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_protocol_version_unwrap_or() {
        assert_eq!(PeerProtocolVersion::Known(70015).unwrap_or(1), 70015);
        assert_eq!(PeerProtocolVersion::Unknown.unwrap_or(1), 1);
        assert_eq!(PeerProtocolVersion::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_handshake_display() {
        let handshake = PeerHandshake {
            address: Address::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 8333),
            user_agent: "/Satoshi:25.0.0/".to_string(),
            version: 70016,
            services: ServiceFlags::NETWORK,
            start_height: 800_000,
        };
        let text = handshake.to_string();
        assert!(text.starts_with("127.0.0.1:8333"));
        assert!(text.contains("/Satoshi:25.0.0/"));
        assert!(text.contains("70016"));
    }
}
