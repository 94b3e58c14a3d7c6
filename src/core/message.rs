//! Binary Message Codec
//!
//! Every message on the wire is a little-endian `u16` opcode followed by a
//! flat payload of bytes, shorts, longs and length-prefixed strings.

use thiserror::Error;

/// Size of the opcode header in bytes.
pub const HEADER_SIZE: usize = 2;

/// Errors produced while encoding or decoding messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload ended before the requested field.
    #[error("message too short: needed {needed} bytes at offset {offset}, have {len}")]
    TooShort {
        /// Bytes needed by the read
        needed: usize,
        /// Read cursor position
        offset: usize,
        /// Total message length
        len: usize,
    },

    /// Opcode has no registered handler.
    #[error("unknown message id 0x{0:04x}")]
    UnknownMessage(u16),

    /// String does not fit a u16 length prefix.
    #[error("string of {0} bytes exceeds the u16 length prefix")]
    StringTooLong(usize),

    /// String payload is not UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
}

// =============================================================================
// OUTGOING
// =============================================================================

/// Message under construction.
#[derive(Clone, PartialEq, Eq)]
pub struct MessageOut {
    data: Vec<u8>,
}

impl MessageOut {
    /// Start a message with the given opcode.
    pub fn new(id: u16) -> Self {
        let mut data = Vec::with_capacity(32);
        data.extend_from_slice(&id.to_le_bytes());
        Self { data }
    }

    /// Opcode of this message.
    pub fn id(&self) -> u16 {
        u16::from_le_bytes([self.data[0], self.data[1]])
    }

    /// Append a byte.
    #[inline]
    pub fn write_byte(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Append a little-endian u16.
    #[inline]
    pub fn write_short(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian u32.
    #[inline]
    pub fn write_long(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a pair of coordinates as two u16.
    #[inline]
    pub fn write_coordinates(&mut self, x: u16, y: u16) {
        self.write_short(x);
        self.write_short(y);
    }

    /// Append a u16-length-prefixed UTF-8 string.
    ///
    /// Leaves the message untouched on error.
    pub fn write_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        let len = u16::try_from(value.len())
            .map_err(|_| ProtocolError::StringTooLong(value.len()))?;
        self.write_short(len);
        self.data.extend_from_slice(value.as_bytes());
        Ok(())
    }

    /// Total length including the header.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing but the opcode has been written.
    pub fn is_empty(&self) -> bool {
        self.data.len() <= HEADER_SIZE
    }

    /// Raw bytes, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume into raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl std::fmt::Debug for MessageOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageOut")
            .field("id", &format_args!("0x{:04x}", self.id()))
            .field("payload", &hex::encode(&self.data[HEADER_SIZE..]))
            .finish()
    }
}

// =============================================================================
// INCOMING
// =============================================================================

/// Read cursor over a received message.
#[derive(Debug, Clone)]
pub struct MessageIn<'a> {
    id: u16,
    data: &'a [u8],
    pos: usize,
}

impl<'a> MessageIn<'a> {
    /// Parse the header of a received buffer.
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::TooShort {
                needed: HEADER_SIZE,
                offset: 0,
                len: data.len(),
            });
        }
        Ok(Self {
            id: u16::from_le_bytes([data[0], data[1]]),
            data,
            pos: HEADER_SIZE,
        })
    }

    /// Opcode of this message.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::TooShort {
                needed: n,
                offset: self.pos,
                len: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a byte.
    pub fn read_byte(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u16.
    pub fn read_short(&mut self) -> Result<u16, ProtocolError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32.
    pub fn read_long(&mut self) -> Result<u32, ProtocolError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a u16-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_short()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| ProtocolError::InvalidUtf8)
    }
}
