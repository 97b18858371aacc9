//! The Framing Protocol header: one byte carrying endpoint, frame id, and
//! payload length code, as described in spec.md §6.
//!
//! Layout (MSB first):
//! ```text
//! bit:    7   6 5   4 3   2 1 0
//!       rsvd | id  | ep  | len
//! ```
//! `len` is a 3-bit code over the fixed set of payload sizes `{1, 4, 32,
//! 128}`; any other code is a decode error, not a panic — the caller drops
//! one byte and resynchronizes (spec.md §4.3/§7).

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("reserved header bit set")]
    ReservedBitSet,
    #[error("unknown length code {0}")]
    BadLengthCode(u8),
    #[error("payload length {actual} does not match header length {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("frame too short: need at least 1 header byte")]
    Empty,
}

/// Destination of a frame. Only `Firmware` and `App` are meaningful to this
/// implementation; any other 2-bit value is preserved so the engine can
/// silently drop it (spec.md §4.3, Endpoint gate, §8 property 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Firmware,
    App,
    Unknown(u8),
}

impl Endpoint {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Endpoint::Firmware,
            1 => Endpoint::App,
            other => Endpoint::Unknown(other),
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            Endpoint::Firmware => 0,
            Endpoint::App => 1,
            Endpoint::Unknown(bits) => bits & 0b11,
        }
    }
}

/// One of the four fixed payload lengths the wire protocol allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLen {
    Len1,
    Len4,
    Len32,
    Len128,
}

impl FrameLen {
    pub fn bytes(self) -> usize {
        match self {
            FrameLen::Len1 => 1,
            FrameLen::Len4 => 4,
            FrameLen::Len32 => 32,
            FrameLen::Len128 => 128,
        }
    }

    fn from_code(code: u8) -> Result<Self, FrameError> {
        match code {
            0 => Ok(FrameLen::Len1),
            1 => Ok(FrameLen::Len4),
            2 => Ok(FrameLen::Len32),
            3 => Ok(FrameLen::Len128),
            other => Err(FrameError::BadLengthCode(other)),
        }
    }

    fn to_code(self) -> u8 {
        match self {
            FrameLen::Len1 => 0,
            FrameLen::Len4 => 1,
            FrameLen::Len32 => 2,
            FrameLen::Len128 => 3,
        }
    }

    pub fn for_len(n: usize) -> Option<Self> {
        match n {
            1 => Some(FrameLen::Len1),
            4 => Some(FrameLen::Len4),
            32 => Some(FrameLen::Len32),
            128 => Some(FrameLen::Len128),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub id: u8,
    pub endpoint: Endpoint,
    pub len: FrameLen,
}

impl FrameHeader {
    pub fn new(id: u8, endpoint: Endpoint, len: FrameLen) -> Self {
        Self { id: id & 0b11, endpoint, len }
    }

    pub fn encode(self) -> u8 {
        (self.id << 5) | (self.endpoint.to_bits() << 3) | self.len.to_code()
    }

    pub fn decode(byte: u8) -> Result<Self, FrameError> {
        if byte & 0b1000_0000 != 0 {
            return Err(FrameError::ReservedBitSet);
        }
        let id = (byte >> 5) & 0b11;
        let endpoint = Endpoint::from_bits((byte >> 3) & 0b11);
        let len = FrameLen::from_code(byte & 0b111)?;
        Ok(Self { id, endpoint, len })
    }
}

/// A full frame: header byte plus a payload of exactly `header.len.bytes()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(header: FrameHeader, payload: Vec<u8>) -> Result<Self, FrameError> {
        if payload.len() != header.len.bytes() {
            return Err(FrameError::LengthMismatch {
                expected: header.len.bytes(),
                actual: payload.len(),
            });
        }
        Ok(Self { header, payload })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.header.encode());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a single frame from the front of `buf`, returning the frame
    /// and the number of bytes consumed. Never panics on malformed input.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        let header_byte = *buf.first().ok_or(FrameError::Empty)?;
        let header = FrameHeader::decode(header_byte)?;
        let need = header.len.bytes();
        if buf.len() < 1 + need {
            return Err(FrameError::LengthMismatch {
                expected: need,
                actual: buf.len().saturating_sub(1),
            });
        }
        let payload = buf[1..1 + need].to_vec();
        Ok((Self { header, payload }, 1 + need))
    }
}
