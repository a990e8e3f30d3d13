//! Address records.
//!
//! Layout: `[time: u32]? services: u64, address: [u8; 16], port: u16 (big-endian)`.

use super::{Decoder, WireError};
use crate::address::Address;
use crate::peer::ADDRESS_TIME_VERSION;
use bitcoin::p2p::ServiceFlags;

/// Timestamp written for addresses that never carried one.
pub const DEFAULT_ADDRESS_TIME: u32 = 100_000_000;

/// Stream context deciding whether an address record carries its time field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressEncoding {
    /// The surrounding structure declares a time field (true for `addr`, false in `version`).
    pub have_time: bool,
    /// Serialization targets persistent storage rather than the network.
    pub persistent: bool,
    /// Protocol version negotiated for the stream.
    pub version: u32,
}

impl AddressEncoding {
    /// Records inside an `addr` message on the network.
    pub const fn gossip(version: u32) -> Self {
        AddressEncoding {
            have_time: true,
            persistent: false,
            version,
        }
    }

    /// Records embedded in a version handshake, which never carry time.
    pub const fn handshake(version: u32) -> Self {
        AddressEncoding {
            have_time: false,
            persistent: false,
            version,
        }
    }

    /// Whether the time field is present.
    pub fn includes_time(&self) -> bool {
        self.have_time && (self.persistent || self.version >= ADDRESS_TIME_VERSION)
    }
}

pub fn encode_address(buf: &mut Vec<u8>, address: &Address, encoding: AddressEncoding) {
    if encoding.includes_time() {
        buf.extend_from_slice(&address.time().unwrap_or(DEFAULT_ADDRESS_TIME).to_le_bytes());
    }
    buf.extend_from_slice(&address.services_or_none().to_u64().to_le_bytes());
    buf.extend_from_slice(address.raw());
    buf.extend_from_slice(&address.port().to_be_bytes());
}

pub fn decode_address(
    decoder: &mut Decoder<'_>,
    encoding: AddressEncoding,
) -> Result<Address, WireError> {
    let time = if encoding.includes_time() {
        Some(decoder.read_u32_le()?)
    } else {
        None
    };
    let services = ServiceFlags::from(decoder.read_u64_le()?);
    let raw = decoder.read_array::<16>()?;
    let port = decoder.read_u16_be()?;

    let address = Address::from_raw(raw, port).with_services(services);
    Ok(match time {
        Some(time) => address.with_time(time),
        None => address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn sample() -> Address {
        Address::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 8333)
            .with_services(ServiceFlags::NETWORK | ServiceFlags::WITNESS)
            .with_time(1_700_000_000)
    }

    #[test]
    fn test_time_gating() {
        assert!(AddressEncoding::gossip(ADDRESS_TIME_VERSION).includes_time());
        assert!(!AddressEncoding::gossip(ADDRESS_TIME_VERSION - 1).includes_time());
        assert!(!AddressEncoding::handshake(70015).includes_time());

        let persistent = AddressEncoding {
            have_time: true,
            persistent: true,
            version: 0,
        };
        assert!(persistent.includes_time());
    }

    #[test]
    fn test_layout_with_time() {
        let mut buf = Vec::new();
        encode_address(&mut buf, &sample(), AddressEncoding::gossip(70015));
        assert_eq!(buf.len(), 30);
        assert_eq!(&buf[0..4], &1_700_000_000u32.to_le_bytes());
        assert_eq!(&buf[4..12], &9u64.to_le_bytes());
        assert_eq!(&buf[12..24], &[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff]);
        assert_eq!(&buf[24..28], &[10, 0, 0, 1]);
        // Port is big-endian: 8333 = 0x208D.
        assert_eq!(&buf[28..30], &[0x20, 0x8d]);

        let decoded =
            decode_address(&mut Decoder::new(&buf), AddressEncoding::gossip(70015)).unwrap();
        assert_eq!(decoded, sample());
        assert_eq!(decoded.port(), 8333);
        assert_eq!(decoded.time(), Some(1_700_000_000));
        assert_eq!(
            decoded.services(),
            Some(ServiceFlags::NETWORK | ServiceFlags::WITNESS)
        );
    }

    #[test]
    fn test_layout_without_time() {
        let mut buf = Vec::new();
        encode_address(&mut buf, &sample(), AddressEncoding::handshake(70015));
        assert_eq!(buf.len(), 26);

        let decoded =
            decode_address(&mut Decoder::new(&buf), AddressEncoding::handshake(70015)).unwrap();
        assert_eq!(decoded.time(), None);
        assert_eq!(decoded.port(), 8333);
    }

    #[test]
    fn test_missing_time_uses_default() {
        let address = Address::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8333);
        let mut buf = Vec::new();
        encode_address(&mut buf, &address, AddressEncoding::gossip(70015));
        assert_eq!(&buf[0..4], &DEFAULT_ADDRESS_TIME.to_le_bytes());
        assert_eq!(&buf[4..12], &[0u8; 8]);
    }
}
