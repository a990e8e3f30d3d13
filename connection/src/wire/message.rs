//! Framing and the small payloads the crawler handles directly.

use super::address::{decode_address, encode_address, AddressEncoding};
use super::header::{encode_header, Command, MessageHeader, HEADER_SIZE};
use super::{checksum, encode_var_int, Decoder, WireError};
use crate::address::Address;
use bitcoin::p2p::Magic;

pub const VERSION: Command = Command::literal("version");
pub const VERACK: Command = Command::literal("verack");
pub const PING: Command = Command::literal("ping");
pub const PONG: Command = Command::literal("pong");
pub const ADDR: Command = Command::literal("addr");

/// Largest payload accepted from a peer, matching Bitcoin Core's message limit.
pub const MAX_PAYLOAD_SIZE: u32 = 4_000_000;
/// Largest number of records accepted in one `addr` message.
pub const MAX_ADDRESSES: u64 = 1000;

/// Serialize header and payload into one contiguous frame.
pub fn frame(magic: Magic, command: Command, payload: &[u8]) -> Vec<u8> {
    let header = MessageHeader {
        magic,
        command,
        payload_length: payload.len() as u32,
        checksum: checksum(payload),
    };
    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&encode_header(&header));
    bytes.extend_from_slice(payload);
    bytes
}

/// Append an `addr` payload. Every record carries its time field.
pub fn encode_addr_payload(buf: &mut Vec<u8>, addresses: &[Address], version: u32) {
    encode_var_int(buf, addresses.len() as u64);
    for address in addresses {
        encode_address(buf, address, AddressEncoding::gossip(version));
    }
}

/// Decode an `addr` payload, gating the time field on `version`.
pub fn decode_addr_payload(bytes: &[u8], version: u32) -> Result<Vec<Address>, WireError> {
    let mut decoder = Decoder::new(bytes);
    let count = decoder.read_var_int()?;
    if count > MAX_ADDRESSES {
        return Err(WireError::TooManyAddresses(count));
    }

    let encoding = AddressEncoding::gossip(version);
    (0..count)
        .map(|_| decode_address(&mut decoder, encoding))
        .collect()
}

/// Decode the nonce of a `ping` (or `pong`) payload.
pub fn decode_ping_payload(bytes: &[u8]) -> Result<u64, WireError> {
    Decoder::new(bytes).read_u64_le()
}
