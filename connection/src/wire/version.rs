//! Version handshake payload.

use super::address::{decode_address, encode_address, AddressEncoding};
use super::{encode_var_str, Decoder, WireError};
use crate::address::Address;
use crate::peer::{EXTENDED_VERSION_MESSAGE_VERSION, RELAY_VERSION};
use bitcoin::p2p::ServiceFlags;

/// Payload of a `version` message.
///
/// Fields after `addr_me` only travel when the stream version is at least
/// 106, and `relay` only from 70001. When absent on decode they hold their
/// zero values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPayload {
    pub version: u32,
    pub services: ServiceFlags,
    pub timestamp: i64,
    pub addr_me: Address,
    pub addr_you: Address,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: u32,
    pub relay: bool,
}

/// Append a version payload serialized for `stream_version`.
pub fn encode_version(buf: &mut Vec<u8>, payload: &VersionPayload, stream_version: u32) {
    let encoding = AddressEncoding::handshake(stream_version);
    buf.extend_from_slice(&payload.version.to_le_bytes());
    buf.extend_from_slice(&payload.services.to_u64().to_le_bytes());
    buf.extend_from_slice(&payload.timestamp.to_le_bytes());
    encode_address(buf, &payload.addr_me, encoding);
    if stream_version >= EXTENDED_VERSION_MESSAGE_VERSION {
        encode_address(buf, &payload.addr_you, encoding);
        buf.extend_from_slice(&payload.nonce.to_le_bytes());
        encode_var_str(buf, &payload.user_agent);
        buf.extend_from_slice(&payload.start_height.to_le_bytes());
    }
    if stream_version >= RELAY_VERSION {
        buf.push(u8::from(payload.relay));
    }
}

/// Read only the leading version and services, which gate the rest of the payload.
pub fn peek_version(bytes: &[u8]) -> Result<(u32, ServiceFlags), WireError> {
    let mut decoder = Decoder::new(bytes);
    let version = decoder.read_u32_le()?;
    let services = ServiceFlags::from(decoder.read_u64_le()?);
    Ok((version, services))
}

/// Decode a version payload serialized for `stream_version`.
pub fn decode_version(bytes: &[u8], stream_version: u32) -> Result<VersionPayload, WireError> {
    let encoding = AddressEncoding::handshake(stream_version);
    let mut decoder = Decoder::new(bytes);

    let version = decoder.read_u32_le()?;
    let services = ServiceFlags::from(decoder.read_u64_le()?);
    let timestamp = decoder.read_i64_le()?;
    let addr_me = decode_address(&mut decoder, encoding)?;

    let mut payload = VersionPayload {
        version,
        services,
        timestamp,
        addr_me,
        addr_you: Address::from_raw([0; 16], 0),
        nonce: 0,
        user_agent: String::new(),
        start_height: 0,
        relay: false,
    };

    if stream_version >= EXTENDED_VERSION_MESSAGE_VERSION {
        payload.addr_you = decode_address(&mut decoder, encoding)?;
        payload.nonce = decoder.read_u64_le()?;
        payload.user_agent = decoder.read_var_str()?;
        payload.start_height = decoder.read_u32_le()?;
    }
    if stream_version >= RELAY_VERSION {
        payload.relay = decoder.read_bool()?;
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn payload(version: u32) -> VersionPayload {
        VersionPayload {
            version,
            services: ServiceFlags::NETWORK,
            timestamp: 1_700_000_000,
            addr_me: Address::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)), 50000),
            addr_you: Address::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 8333),
            nonce: 0x1122_3344_5566_7788,
            user_agent: "/Satoshi:0.14.2/".to_string(),
            start_height: 840_000,
            relay: true,
        }
    }

    #[test]
    fn test_version_105_stops_after_first_address() {
        let mut buf = Vec::new();
        encode_version(&mut buf, &payload(105), 105);
        // version + services + timestamp + address without time.
        assert_eq!(buf.len(), 4 + 8 + 8 + 26);

        // Decoding would fail with UnexpectedEnd if it tried to read further.
        let decoded = decode_version(&buf, 105).unwrap();
        assert_eq!(decoded.version, 105);
        assert_eq!(decoded.addr_me.port(), 50000);
        assert_eq!(decoded.nonce, 0);
        assert!(decoded.user_agent.is_empty());
        assert_eq!(decoded.start_height, 0);
        assert!(!decoded.relay);
    }

    #[test]
    fn test_version_70001_reads_relay() {
        let mut buf = Vec::new();
        encode_version(&mut buf, &payload(70001), 70001);
        assert_eq!(*buf.last().unwrap(), 1);

        let decoded = decode_version(&buf, 70001).unwrap();
        assert_eq!(decoded, payload(70001));
        assert_eq!(decoded.addr_you.port(), 8333);
        assert_eq!(decoded.nonce, 0x1122_3344_5566_7788);
        assert!(decoded.relay);

        // Dropping the relay byte makes the payload short for 70001.
        let truncated = &buf[..buf.len() - 1];
        assert!(matches!(
            decode_version(truncated, 70001),
            Err(WireError::UnexpectedEnd { .. })
        ));
    }

    #[test]
    fn test_version_between_gates_has_no_relay() {
        let mut buf = Vec::new();
        encode_version(&mut buf, &payload(60000), 60000);
        let decoded = decode_version(&buf, 60000).unwrap();
        assert_eq!(decoded.user_agent, "/Satoshi:0.14.2/");
        assert_eq!(decoded.start_height, 840_000);
        assert!(!decoded.relay);
        assert_eq!(buf.len(), 4 + 8 + 8 + 26 + 26 + 8 + 17 + 4);
    }

    #[test]
    fn test_peek_version() {
        let mut buf = Vec::new();
        encode_version(&mut buf, &payload(70016), 70016);
        assert_eq!(
            peek_version(&buf).unwrap(),
            (70016, ServiceFlags::NETWORK)
        );
    }
}
