//! Network endpoints as carried in bitcoin address records.
//!
//! An [`Address`] always stores a 16 byte IPv6 form of the IP. IPv4 endpoints
//! are kept in the mapped range (`::ffff:0:0/96`), the same way they appear
//! on the wire.

use bitcoin::p2p::ServiceFlags;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6};

/// Prefix of an IPv4-mapped IPv6 address.
const IPV4_MAPPED_PREFIX: [u8; 12] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff];

/// A network endpoint discovered on, or dialed through, the peer-to-peer network.
///
/// Identity is the raw 16 byte address alone. Two endpoints that differ only
/// by port, scope, services, or timestamp compare equal and hash the same, so
/// a crawl visits each host once.
#[derive(Debug, Clone, Copy)]
pub struct Address {
    raw: [u8; 16],
    scope_id: u32,
    /// Port in host order.
    port: u16,
    services: Option<ServiceFlags>,
    time: Option<u32>,
}

impl Address {
    /// Create an address from its raw 16 byte form.
    pub fn from_raw(raw: [u8; 16], port: u16) -> Self {
        Address {
            raw,
            scope_id: 0,
            port,
            services: None,
            time: None,
        }
    }

    /// Create an address from an IP and port.
    pub fn new(ip: IpAddr, port: u16) -> Self {
        let raw = match ip {
            IpAddr::V4(ipv4) => ipv4.to_ipv6_mapped().octets(),
            IpAddr::V6(ipv6) => ipv6.octets(),
        };
        Address::from_raw(raw, port)
    }

    /// Returns a copy carrying the given services.
    pub fn with_services(mut self, services: ServiceFlags) -> Self {
        self.services = Some(services);
        self
    }

    /// Returns a copy carrying the given advertisement time.
    pub fn with_time(mut self, time: u32) -> Self {
        self.time = Some(time);
        self
    }

    /// The raw 16 byte address in network byte order.
    pub fn raw(&self) -> &[u8; 16] {
        &self.raw
    }

    /// Port in host order.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Services bitmask, when advertised.
    pub fn services(&self) -> Option<ServiceFlags> {
        self.services
    }

    /// Advertisement timestamp, when the record carried one.
    pub fn time(&self) -> Option<u32> {
        self.time
    }

    /// Scope id for link-local IPv6 endpoints.
    pub fn scope_id(&self) -> u32 {
        self.scope_id
    }

    pub fn is_ipv4(&self) -> bool {
        self.raw[..12] == IPV4_MAPPED_PREFIX
    }

    pub fn ip(&self) -> IpAddr {
        if self.is_ipv4() {
            IpAddr::V4(Ipv4Addr::new(
                self.raw[12],
                self.raw[13],
                self.raw[14],
                self.raw[15],
            ))
        } else {
            IpAddr::V6(Ipv6Addr::from(self.raw))
        }
    }

    /// Socket address suitable for dialing.
    pub fn socket_addr(&self) -> SocketAddr {
        match self.ip() {
            IpAddr::V4(ipv4) => SocketAddr::new(IpAddr::V4(ipv4), self.port),
            IpAddr::V6(ipv6) => {
                SocketAddr::V6(SocketAddrV6::new(ipv6, self.port, 0, self.scope_id))
            }
        }
    }

    /// Services advertised for this address, none if unknown.
    pub fn services_or_none(&self) -> ServiceFlags {
        self.services.unwrap_or(ServiceFlags::NONE)
    }
}

impl From<SocketAddr> for Address {
    fn from(socket_addr: SocketAddr) -> Self {
        let mut address = Address::new(socket_addr.ip(), socket_addr.port());
        if let SocketAddr::V6(v6) = socket_addr {
            address.scope_id = v6.scope_id();
        }
        address
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip() {
            IpAddr::V4(ipv4) => write!(f, "{ipv4}:{}", self.port),
            IpAddr::V6(ipv6) => write!(f, "[{ipv6}]:{}", self.port),
        }
    }
}
