//! The federation wire codec.
//!
//! Frame layout, all integers little-endian:
//!
//! ```text
//! "WEFT"  magic, 4 bytes
//! mode    1 byte, 0 = request, 1 = response
//! id      u32 message id
//! mlen    u32 metadata length
//! meta    mlen bytes of JSON metadata
//! tag     1 byte payload tag
//! ...     tagged payload body
//! ```
//!
//! Payload tags: 0 absent, 1 bool (one byte), 2 bytes, 3 text, 4 JSON;
//! tags 2..=4 carry a u32 length prefix.

use serde_json::Value;

/// Frame magic.
pub const MAGIC: [u8; 4] = *b"WEFT";

/// Errors raised while decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame does not start with the magic tag.
    #[error("bad frame magic")]
    BadMagic,

    /// The input ended before the frame was complete.
    #[error("truncated frame")]
    Truncated,

    /// The mode byte is neither request nor response.
    #[error("unknown mode byte {0:#04x}")]
    BadMode(u8),

    /// The payload tag byte is out of range.
    #[error("unknown payload tag {0:#04x}")]
    BadTag(u8),

    /// The metadata blob is not valid JSON.
    #[error("malformed metadata: {0}")]
    BadMetadata(String),

    /// The payload body is malformed for its tag.
    #[error("malformed payload: {0}")]
    BadPayload(String),
}

/// Whether a frame asks or answers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mode {
    /// A request.
    Request,
    /// A response.
    Response,
}

/// The tagged payload of a frame.
#[derive(Clone, PartialEq, Debug)]
pub enum Payload {
    /// No payload.
    Absent,
    /// A boolean.
    Bool(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// A JSON value.
    Json(Value),
}

/// One wire frame.
#[derive(Clone, PartialEq, Debug)]
pub struct Message {
    /// Request or response.
    pub mode: Mode,
    /// Correlates a response with its request.
    pub id: u32,
    /// JSON metadata (service kind, operation, checksums).
    pub metadata: Value,
    /// The payload.
    pub payload: Payload,
}

impl Message {
    /// Builds a request frame.
    pub fn request(id: u32, metadata: Value, payload: Payload) -> Self {
        Self {
            mode: Mode::Request,
            id,
            metadata,
            payload,
        }
    }

    /// Builds a response frame.
    pub fn response(id: u32, metadata: Value, payload: Payload) -> Self {
        Self {
            mode: Mode::Response,
            id,
            metadata,
            payload,
        }
    }
}

/// Encodes a frame.
pub fn encode(message: &Message) -> Vec<u8> {
    let meta = serde_json::to_vec(&message.metadata).unwrap_or_else(|_| b"null".to_vec());
    let mut out = Vec::with_capacity(14 + meta.len());
    out.extend_from_slice(&MAGIC);
    out.push(match message.mode {
        Mode::Request => 0,
        Mode::Response => 1,
    });
    out.extend_from_slice(&message.id.to_le_bytes());
    out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta);
    match &message.payload {
        Payload::Absent => out.push(0),
        Payload::Bool(b) => {
            out.push(1);
            out.push(u8::from(*b));
        }
        Payload::Bytes(bytes) => {
            out.push(2);
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(bytes);
        }
        Payload::Text(text) => {
            out.push(3);
            out.extend_from_slice(&(text.len() as u32).to_le_bytes());
            out.extend_from_slice(text.as_bytes());
        }
        Payload::Json(value) => {
            let body = serde_json::to_vec(value).unwrap_or_else(|_| b"null".to_vec());
            out.push(4);
            out.extend_from_slice(&(body.len() as u32).to_le_bytes());
            out.extend_from_slice(&body);
        }
    }
    out
}

/// Decodes one frame, returning it and the number of bytes consumed.
pub fn decode(input: &[u8]) -> Result<(Message, usize), ProtocolError> {
    let mut cursor = Cursor { input, pos: 0 };
    let magic = cursor.take(4)?;
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic);
    }
    let mode = match cursor.byte()? {
        0 => Mode::Request,
        1 => Mode::Response,
        other => return Err(ProtocolError::BadMode(other)),
    };
    let id = cursor.u32()?;
    let mlen = cursor.u32()? as usize;
    let meta = cursor.take(mlen)?;
    let metadata: Value = serde_json::from_slice(meta)
        .map_err(|e| ProtocolError::BadMetadata(e.to_string()))?;
    let payload = match cursor.byte()? {
        0 => Payload::Absent,
        1 => Payload::Bool(cursor.byte()? != 0),
        2 => {
            let len = cursor.u32()? as usize;
            Payload::Bytes(cursor.take(len)?.to_vec())
        }
        3 => {
            let len = cursor.u32()? as usize;
            let text = std::str::from_utf8(cursor.take(len)?)
                .map_err(|e| ProtocolError::BadPayload(e.to_string()))?;
            Payload::Text(text.to_string())
        }
        4 => {
            let len = cursor.u32()? as usize;
            let value = serde_json::from_slice(cursor.take(len)?)
                .map_err(|e| ProtocolError::BadPayload(e.to_string()))?;
            Payload::Json(value)
        }
        other => return Err(ProtocolError::BadTag(other)),
    };
    Ok((
        Message {
            mode,
            id,
            metadata,
            payload,
        },
        cursor.pos,
    ))
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.input.len() - self.pos < n {
            return Err(ProtocolError::Truncated);
        }
        let out = &self.input[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn byte(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
