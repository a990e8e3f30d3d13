//! Fixed 24 byte message header.

use super::{Decoder, WireError};
use bitcoin::p2p::Magic;
use std::fmt;

/// Size of a bitcoin message header in bytes.
pub const HEADER_SIZE: usize = 24;
/// Width of the NUL-padded command field.
pub const COMMAND_SIZE: usize = 12;

/// A command name as carried in the fixed width header field.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command {
    bytes: [u8; COMMAND_SIZE],
    len: u8,
}

impl Command {
    /// Build a command from a name known at compile time.
    ///
    /// Panics (at compile time in const contexts) if the name is longer than the field.
    pub const fn literal(name: &str) -> Command {
        let name = name.as_bytes();
        assert!(name.len() <= COMMAND_SIZE, "command name too long");
        let mut bytes = [0u8; COMMAND_SIZE];
        let mut i = 0;
        while i < name.len() {
            bytes[i] = name[i];
            i += 1;
        }
        Command {
            bytes,
            len: name.len() as u8,
        }
    }

    /// Build a command from an arbitrary name.
    pub fn new(name: &str) -> Result<Command, WireError> {
        if name.len() > COMMAND_SIZE {
            return Err(WireError::CommandTooLong(name.len()));
        }
        if !name.bytes().all(is_command_byte) {
            return Err(WireError::MalformedCommand);
        }
        Ok(Command::literal(name))
    }

    /// Parse the raw header field.
    ///
    /// The name runs up to the first NUL, or fills the whole field if there is
    /// none. Everything after the first NUL must also be NUL.
    pub fn from_field(field: [u8; COMMAND_SIZE]) -> Result<Command, WireError> {
        let len = field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(COMMAND_SIZE);
        if !field[..len].iter().copied().all(is_command_byte) {
            return Err(WireError::MalformedCommand);
        }
        if field[len..].iter().any(|&b| b != 0) {
            return Err(WireError::MalformedCommand);
        }
        Ok(Command {
            bytes: field,
            len: len as u8,
        })
    }

    pub fn as_str(&self) -> &str {
        // Construction only admits printable ASCII.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    /// The NUL-padded header field.
    pub fn field(&self) -> [u8; COMMAND_SIZE] {
        self.bytes
    }
}

fn is_command_byte(b: u8) -> bool {
    (0x20..=0x7e).contains(&b)
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({:?})", self.as_str())
    }
}

/// Header preceding every payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Network the frame belongs to.
    pub magic: Magic,
    pub command: Command,
    pub payload_length: u32,
    /// First four bytes of the double SHA-256 of the payload.
    pub checksum: [u8; 4],
}

pub fn encode_header(header: &MessageHeader) -> [u8; HEADER_SIZE] {
    let mut bytes = [0u8; HEADER_SIZE];
    bytes[0..4].copy_from_slice(&header.magic.to_bytes());
    bytes[4..16].copy_from_slice(&header.command.field());
    bytes[16..20].copy_from_slice(&header.payload_length.to_le_bytes());
    bytes[20..24].copy_from_slice(&header.checksum);
    bytes
}

/// Decode a header from the first [`HEADER_SIZE`] bytes of `bytes`.
pub fn decode_header(bytes: &[u8]) -> Result<MessageHeader, WireError> {
    let mut decoder = Decoder::new(bytes);
    let magic = Magic::from_bytes(decoder.read_array()?);
    let command = Command::from_field(decoder.read_array()?)?;
    let payload_length = decoder.read_u32_le()?;
    let checksum = decoder.read_array()?;
    Ok(MessageHeader {
        magic,
        command,
        payload_length,
        checksum,
    })
}
