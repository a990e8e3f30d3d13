//! Connection configuration types and constants.

use crate::peer::DEFAULT_PROTOCOL_VERSION;
use crate::user_agent::UserAgent;
use bitcoin::p2p::{Magic, ServiceFlags};
use bitcoin::Network;
use std::fmt;

/// Default user agent for bitcoin-seeder connections.
///
/// Format follows Bitcoin Core's convention: "/$NAME:$VERSION/".
pub fn default_user_agent() -> UserAgent {
    UserAgent::from_name_version("bitcoin-seeder", env!("CARGO_PKG_VERSION"))
}

/// Configuration shared by every connection of a crawl.
#[derive(Debug, Clone)]
pub struct ConnectionConfiguration {
    /// Magic expected on every inbound frame and written on every outbound one.
    pub magic: Magic,
    /// Protocol version advertised, and used to serialize our own handshake.
    pub protocol_version: u32,
    /// Custom user agent advertised for connection. Defaults to bitcoin-seeder user agent if None.
    pub user_agent: Option<UserAgent>,
    /// Service flags advertised by this node.
    pub services: ServiceFlags,
    /// Block height advertised in version messages.
    pub start_height: u32,
    /// Whether peers should relay transactions to us.
    pub relay: bool,
    /// Compare each payload against its header checksum before dispatch.
    pub verify_checksum: bool,
}

impl ConnectionConfiguration {
    /// Creates a configuration for a non-listening crawler on `network`.
    ///
    /// Advertises no services, a zero start height, and asks peers not to
    /// relay transactions.
    pub fn non_listening(
        network: Network,
        protocol_version: u32,
        user_agent: Option<UserAgent>,
    ) -> Self {
        Self {
            magic: network.magic(),
            protocol_version,
            user_agent,
            services: ServiceFlags::NONE,
            start_height: 0,
            relay: false,
            verify_checksum: true,
        }
    }

    /// Toggle payload checksum verification.
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// The user agent written into outbound version messages.
    pub fn user_agent(&self) -> UserAgent {
        self.user_agent.clone().unwrap_or_else(default_user_agent)
    }
}

impl Default for ConnectionConfiguration {
    fn default() -> Self {
        Self::non_listening(Network::Bitcoin, DEFAULT_PROTOCOL_VERSION, None)
    }
}

impl fmt::Display for ConnectionConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionConfiguration {{ magic: {}, protocol: {}, user_agent: \"{}\", services: {}, relay: {}, verify_checksum: {} }}",
            self.magic,
            self.protocol_version,
            self.user_agent(),
            self.services,
            self.relay,
            self.verify_checksum
        )
    }
}
