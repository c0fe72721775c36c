//! Wire codec for the Locksmith protocol.
//!
//! Every message travels as a single frame of 3..=257 bytes:
//!
//! ```text
//! offset 0              type    (1 byte)
//! offset 1              tag_len (1 byte, 1..=255)
//! offset 2..2+tag_len   tag     (UTF-8)
//! ```
//!
//! Client-bound and server-bound frames share the layout and differ only in
//! the set of valid type bytes. A frame is decoded from exactly the bytes
//! returned by one socket read; partial frames are a decode error and
//! terminate the connection.

use bytes::Bytes;
use thiserror::Error;

/// Smallest possible frame: type + tag_len + one tag byte.
pub const MIN_FRAME_LEN: usize = 3;
/// Largest possible frame: type + tag_len + 255 tag bytes.
pub const MAX_FRAME_LEN: usize = 257;

/// Errors produced while decoding a frame. Any of these is grounds for
/// dropping the client connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame length {0} outside the valid range {MIN_FRAME_LEN}..={MAX_FRAME_LEN}")]
    MessageDecode(usize),
    #[error("lock tag size field does not match the actual lock tag size")]
    TagSize,
    #[error("message type {0:#04x} not recognized")]
    UnknownType(u8),
    #[error("lock tag is not valid UTF-8")]
    TagEncoding,
}

/// Server-bound message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Acquire,
    Release,
}

const TYPE_ACQUIRE: u8 = 0x00;
const TYPE_RELEASE: u8 = 0x01;
const TYPE_ACQUIRED: u8 = 0x00;

/// A decoded server-bound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub kind: RequestKind,
    pub tag: String,
}

impl Request {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (type_byte, tag) = decode_frame(bytes)?;
        let kind = match type_byte {
            TYPE_ACQUIRE => RequestKind::Acquire,
            TYPE_RELEASE => RequestKind::Release,
            other => return Err(DecodeError::UnknownType(other)),
        };
        Ok(Self { kind, tag })
    }

    pub fn encode(&self) -> Bytes {
        let type_byte = match self.kind {
            RequestKind::Acquire => TYPE_ACQUIRE,
            RequestKind::Release => TYPE_RELEASE,
        };
        encode_frame(type_byte, &self.tag)
    }
}

/// The single client-bound message: the named lock now belongs to the
/// receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub tag: String,
}

impl Acquired {
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (type_byte, tag) = decode_frame(bytes)?;
        if type_byte != TYPE_ACQUIRED {
            return Err(DecodeError::UnknownType(type_byte));
        }
        Ok(Self { tag })
    }

    pub fn encode(&self) -> Bytes {
        encode_frame(TYPE_ACQUIRED, &self.tag)
    }
}

/// Shared layout checks: length bounds, tag size field, tag encoding.
/// Type byte interpretation is left to the caller.
fn decode_frame(bytes: &[u8]) -> Result<(u8, String), DecodeError> {
    if bytes.len() < MIN_FRAME_LEN || bytes.len() > MAX_FRAME_LEN {
        return Err(DecodeError::MessageDecode(bytes.len()));
    }
    if bytes.len() - 2 != bytes[1] as usize {
        return Err(DecodeError::TagSize);
    }
    let tag = std::str::from_utf8(&bytes[2..]).map_err(|_| DecodeError::TagEncoding)?;
    Ok((bytes[0], tag.to_string()))
}

fn encode_frame(type_byte: u8, tag: &str) -> Bytes {
    debug_assert!(!tag.is_empty() && tag.len() <= 255);
    let mut bytes = Vec::with_capacity(2 + tag.len());
    bytes.push(type_byte);
    bytes.push(tag.len() as u8);
    bytes.extend_from_slice(tag.as_bytes());
    Bytes::from(bytes)
}
