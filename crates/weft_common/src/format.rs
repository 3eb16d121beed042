//! Binary buffer formats: the native numeric-array encoding and the
//! mixed-container magic.
//!
//! A binary buffer is a magic-tagged, self-describing numeric array:
//! magic, dtype tag, rank, shape (u64 little-endian per dimension), then
//! the packed little-endian payload. A rank-0 array is a scalar. The
//! mixed-container magic tags hybrid buffers that are neither plain JSON
//! nor a single array; weft treats their interior as opaque.

use std::fmt;

/// Magic prefix of a native numeric-array buffer (version 1).
pub const MAGIC_ARRAY: &[u8] = b"\x93WEFTARR\x01";

/// Magic prefix of a mixed-container buffer (version 1).
pub const MAGIC_MIXED: &[u8] = b"\x93WEFTMIX\x01";

/// Element type of a native numeric array.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Dtype {
    /// Unsigned 8-bit integers.
    U8,
    /// Signed 64-bit integers.
    I64,
    /// 64-bit floats.
    F64,
    /// Booleans, one byte per element.
    Bool,
    /// Fixed-width byte strings of the given width.
    S(u32),
}

impl Dtype {
    /// Size in bytes of one element.
    pub fn elem_size(self) -> usize {
        match self {
            Dtype::U8 | Dtype::Bool => 1,
            Dtype::I64 | Dtype::F64 => 8,
            Dtype::S(width) => width as usize,
        }
    }

    /// Returns `true` for numeric element types (not S).
    pub fn is_numeric(self) -> bool {
        !matches!(self, Dtype::S(_))
    }

    fn tag(self) -> u8 {
        match self {
            Dtype::U8 => 0,
            Dtype::I64 => 1,
            Dtype::F64 => 2,
            Dtype::Bool => 3,
            Dtype::S(_) => 4,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::U8 => write!(f, "u8"),
            Dtype::I64 => write!(f, "i64"),
            Dtype::F64 => write!(f, "f64"),
            Dtype::Bool => write!(f, "bool"),
            Dtype::S(w) => write!(f, "S{w}"),
        }
    }
}

/// Error decoding a native array buffer.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The buffer does not start with the array magic.
    #[error("not a native array buffer (missing magic)")]
    NotAnArray,
    /// The header is truncated or malformed.
    #[error("malformed array header: {reason}")]
    BadHeader {
        /// What was wrong.
        reason: &'static str,
    },
    /// The input is too long to wrap as a fixed-width byte string.
    #[error("byte string of {len} bytes exceeds the fixed-width limit")]
    OversizedString {
        /// Length of the rejected input.
        len: usize,
    },
    /// The payload length does not match dtype and shape.
    #[error("array payload length {actual} does not match expected {expected}")]
    BadPayload {
        /// Expected payload length.
        expected: usize,
        /// Actual payload length.
        actual: usize,
    },
}

/// A decoded native numeric array: dtype, shape, and packed payload.
#[derive(Clone, PartialEq, Debug)]
pub struct ArrayBuf {
    /// Element type.
    pub dtype: Dtype,
    /// Dimensions; empty for a scalar.
    pub shape: Vec<u64>,
    /// Packed little-endian element data.
    pub data: Vec<u8>,
}

impl ArrayBuf {
    /// Number of elements (product of shape; 1 for a scalar), or `None`
    /// when the product overflows.
    pub fn elem_count(&self) -> Option<u64> {
        self.shape.iter().try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
    }

    /// Returns `true` for a rank-0 (scalar) array.
    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Wraps raw bytes as a rank-0 byte-string array, the canonical
    /// bytes-to-binary reformat. Fails for inputs whose length does not
    /// fit the u32 element width.
    pub fn from_raw_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let width = u32::try_from(bytes.len())
            .map_err(|_| FormatError::OversizedString { len: bytes.len() })?;
        Ok(Self {
            dtype: Dtype::S(width),
            shape: Vec::new(),
            data: bytes.to_vec(),
        })
    }

    /// Builds a 1-D i64 array.
    pub fn from_i64s(values: &[i64]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 8);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            dtype: Dtype::I64,
            shape: vec![values.len() as u64],
            data,
        }
    }

    /// Builds a 1-D f64 array.
    pub fn from_f64s(values: &[f64]) -> Self {
        let mut data = Vec::with_capacity(values.len() * 8);
        for v in values {
            data.extend_from_slice(&v.to_le_bytes());
        }
        Self {
            dtype: Dtype::F64,
            shape: vec![values.len() as u64],
            data,
        }
    }

    /// Builds an i64 scalar.
    pub fn scalar_i64(value: i64) -> Self {
        Self {
            dtype: Dtype::I64,
            shape: Vec::new(),
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Builds an f64 scalar.
    pub fn scalar_f64(value: f64) -> Self {
        Self {
            dtype: Dtype::F64,
            shape: Vec::new(),
            data: value.to_le_bytes().to_vec(),
        }
    }

    /// Reads the i64 elements, if the dtype is i64.
    pub fn as_i64s(&self) -> Option<Vec<i64>> {
        if self.dtype != Dtype::I64 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(8)
                .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        )
    }

    /// Reads the f64 elements, if the dtype is f64.
    pub fn as_f64s(&self) -> Option<Vec<f64>> {
        if self.dtype != Dtype::F64 {
            return None;
        }
        Some(
            self.data
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
                .collect(),
        )
    }

    /// For a rank-0 byte-string array, the raw bytes it wraps.
    pub fn as_raw_bytes(&self) -> Option<&[u8]> {
        match (self.dtype, self.is_scalar()) {
            (Dtype::S(_), true) => Some(&self.data),
            _ => None,
        }
    }

    /// Encodes the array into its buffer form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAGIC_ARRAY.len() + 16 + self.data.len());
        out.extend_from_slice(MAGIC_ARRAY);
        out.push(self.dtype.tag());
        if let Dtype::S(width) = self.dtype {
            out.extend_from_slice(&width.to_le_bytes());
        }
        out.push(self.shape.len() as u8);
        for dim in &self.shape {
            out.extend_from_slice(&dim.to_le_bytes());
        }
        out.extend_from_slice(&self.data);
        out
    }

    /// Decodes a buffer as a native array.
    pub fn decode(buf: &[u8]) -> Result<Self, FormatError> {
        let rest = buf.strip_prefix(MAGIC_ARRAY).ok_or(FormatError::NotAnArray)?;
        let mut pos = 0usize;
        let take = |pos: &mut usize, n: usize| -> Result<&[u8], FormatError> {
            let slice = rest.get(*pos..*pos + n).ok_or(FormatError::BadHeader {
                reason: "truncated header",
            })?;
            *pos += n;
            Ok(slice)
        };
        let tag = take(&mut pos, 1)?[0];
        let dtype = match tag {
            0 => Dtype::U8,
            1 => Dtype::I64,
            2 => Dtype::F64,
            3 => Dtype::Bool,
            4 => {
                let width = u32::from_le_bytes(take(&mut pos, 4)?.try_into().unwrap());
                Dtype::S(width)
            }
            _ => {
                return Err(FormatError::BadHeader {
                    reason: "unknown dtype tag",
                })
            }
        };
        let rank = take(&mut pos, 1)?[0] as usize;
        let mut shape = Vec::with_capacity(rank);
        for _ in 0..rank {
            shape.push(u64::from_le_bytes(take(&mut pos, 8)?.try_into().unwrap()));
        }
        let data = rest[pos..].to_vec();
        let count = shape
            .iter()
            .try_fold(1u64, |acc, &dim| acc.checked_mul(dim))
            .ok_or(FormatError::BadHeader {
                reason: "shape element count overflows",
            })?;
        let expected = usize::try_from(count)
            .ok()
            .and_then(|n| n.checked_mul(dtype.elem_size()))
            .ok_or(FormatError::BadHeader {
                reason: "payload size overflows",
            })?;
        if data.len() != expected {
            return Err(FormatError::BadPayload {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dtype, shape, data })
    }
}

/// Returns `true` if the buffer carries the native-array magic.
pub fn is_array_buffer(buf: &[u8]) -> bool {
    buf.starts_with(MAGIC_ARRAY)
}

/// Returns `true` if the buffer carries the mixed-container magic.
pub fn is_mixed_container(buf: &[u8]) -> bool {
    buf.starts_with(MAGIC_MIXED)
}
