//! Bitcoin v1 wire format.
//!
//! Pure encoders and decoders for the pieces of the plaintext protocol the
//! crawler speaks: message headers, compact-size integers, address records,
//! the version handshake payload, and the `addr`/`ping` payloads.
//!
//! Multi-byte integers are little-endian, except the port of an address
//! record which is big-endian.
//!
//! Checksums are computed when framing but never verified on decode, the
//! caller decides whether to compare [`checksum`] against the header.

mod address;
mod header;
mod message;
mod version;

pub use address::{decode_address, encode_address, AddressEncoding, DEFAULT_ADDRESS_TIME};
pub use header::{decode_header, encode_header, Command, MessageHeader, COMMAND_SIZE, HEADER_SIZE};
pub use message::{
    decode_addr_payload, decode_ping_payload, encode_addr_payload, frame, ADDR, MAX_ADDRESSES,
    MAX_PAYLOAD_SIZE, PING, PONG, VERACK, VERSION,
};
pub use version::{decode_version, encode_version, peek_version, VersionPayload};

use bitcoin::hashes::{sha256d, Hash};
use std::fmt;

/// Errors raised while decoding or encoding wire data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Input ended before a field was complete.
    UnexpectedEnd { needed: usize, remaining: usize },
    /// Command field holds non-ASCII bytes or data after the NUL padding.
    MalformedCommand,
    /// Command name does not fit the fixed 12 byte field.
    CommandTooLong(usize),
    /// Compact-size integer used a longer encoding than required.
    NonCanonicalVarInt(u64),
    /// An `addr` payload declared more records than the protocol allows.
    TooManyAddresses(u64),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::UnexpectedEnd { needed, remaining } => {
                write!(f, "Unexpected end of data: needed {needed} bytes, {remaining} remaining")
            }
            WireError::MalformedCommand => write!(f, "Malformed command name in message header"),
            WireError::CommandTooLong(len) => {
                write!(f, "Command name of {len} bytes exceeds {COMMAND_SIZE} byte field")
            }
            WireError::NonCanonicalVarInt(n) => {
                write!(f, "Non-canonical compact size encoding of {n}")
            }
            WireError::TooManyAddresses(count) => {
                write!(f, "Address message with {count} records exceeds limit of {MAX_ADDRESSES}")
            }
        }
    }
}

impl std::error::Error for WireError {}

/// First four bytes of the double SHA-256 of a payload.
pub fn checksum(payload: &[u8]) -> [u8; 4] {
    let hash = sha256d::Hash::hash(payload).to_byte_array();
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Append a compact-size integer.
///
/// Values below `0xFD` take one byte, larger values are prefixed by `0xFD`,
/// `0xFE` or `0xFF` followed by a 2, 4 or 8 byte little-endian extension.
pub fn encode_var_int(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xFC => buf.push(n as u8),
        0xFD..=0xFFFF => {
            buf.push(0xFD);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.push(0xFE);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xFF);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

/// Read a compact-size integer, rejecting non-canonical encodings.
pub fn decode_var_int(decoder: &mut Decoder<'_>) -> Result<u64, WireError> {
    let (n, minimum) = match decoder.read_u8()? {
        0xFF => (decoder.read_u64_le()?, 0x1_0000_0000),
        0xFE => (u64::from(decoder.read_u32_le()?), 0x1_0000),
        0xFD => (u64::from(decoder.read_u16_le()?), 0xFD),
        n => return Ok(u64::from(n)),
    };
    if n < minimum {
        return Err(WireError::NonCanonicalVarInt(n));
    }
    Ok(n)
}

/// Append a length-prefixed string.
pub fn encode_var_str(buf: &mut Vec<u8>, s: &str) {
    encode_var_int(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Cursor over a byte slice with bounds-checked primitive reads.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Decoder { bytes, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, WireError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16_le(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16_be(&mut self) -> Result<u16, WireError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_le(&mut self) -> Result<i64, WireError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_var_int(&mut self) -> Result<u64, WireError> {
        decode_var_int(self)
    }

    /// Read a length-prefixed string, replacing invalid UTF-8.
    pub fn read_var_str(&mut self) -> Result<String, WireError> {
        let len = self.read_var_int()?;
        if len > self.remaining() as u64 {
            return Err(WireError::UnexpectedEnd {
                needed: usize::try_from(len).unwrap_or(usize::MAX),
                remaining: self.remaining(),
            });
        }
        Ok(String::from_utf8_lossy(self.take(len as usize)?).into_owned())
    }
}
