//! Lazily built, per-checksum classification metadata.
//!
//! `BufferInfo` caches facts about a buffer that conversions consult to
//! decide outcomes without fetching the buffer itself. Fields are
//! write-once-monotonic: once set they are never retracted, only filled
//! in. Conflicting updates are a consistency violation.

use serde::{Deserialize, Serialize};
use weft_common::{ArrayBuf, CellType, Checksum, InternalError, WeftResult};

/// The JSON shape of a parseable plain buffer.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    /// A JSON object.
    Object,
    /// A JSON array.
    List,
    /// A JSON string.
    Str,
    /// A JSON integer.
    Int,
    /// A JSON non-integer number.
    Float,
    /// A JSON boolean.
    Bool,
    /// JSON null.
    Null,
}

/// Classification facts and memoized one-step conversion results for one
/// checksum.
///
/// All fields are optional; `None` means "not yet known", never "false".
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
pub struct BufferInfo {
    /// Byte length of the buffer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Whether the buffer is valid UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_utf8: Option<bool>,
    /// Whether the buffer parses as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_json: Option<bool>,
    /// The JSON shape, when `is_json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_type: Option<JsonType>,
    /// Whether the buffer is a homogeneous numeric JSON array.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_json_numeric_array: Option<bool>,
    /// Whether the JSON value narrows to a number (numeric scalar, or a
    /// string spelling one).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_json_numeric_scalar: Option<bool>,
    /// Whether the buffer is a native numeric array.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_array: Option<bool>,
    /// Array dtype name, when `is_array`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    /// Array shape, when `is_array`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<u64>>,
    /// Whether the buffer is an opaque mixed container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_mixed_container: Option<bool>,

    /// Memoized checksum of the str-to-text conversion result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub str2text: Option<Checksum>,
    /// Memoized checksum of the text-to-str conversion result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text2str: Option<Checksum>,
    /// Memoized checksum of the bytes-to-binary conversion result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes2binary: Option<Checksum>,
    /// Memoized checksum of the binary-to-bytes conversion result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary2bytes: Option<Checksum>,
    /// Memoized checksum of the plain-to-binary conversion result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json2binary: Option<Checksum>,
    /// Memoized checksum of the binary-to-plain conversion result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary2json: Option<Checksum>,
}

fn fill<T: PartialEq + Clone + std::fmt::Debug>(
    field: &mut Option<T>,
    name: &str,
    incoming: &Option<T>,
) -> WeftResult<()> {
    if let Some(new) = incoming {
        match field {
            Some(old) if old != new => {
                return Err(InternalError::new(format!(
                    "buffer info field {name} changed from {old:?} to {new:?}"
                )))
            }
            Some(_) => {}
            None => *field = Some(new.clone()),
        }
    }
    Ok(())
}

impl BufferInfo {
    /// Classifies a buffer from its content, filling every derivable fact.
    pub fn classify(buf: &[u8]) -> Self {
        let mut info = BufferInfo {
            length: Some(buf.len() as u64),
            ..Default::default()
        };
        if weft_common::is_array_buffer(buf) {
            info.is_utf8 = Some(false);
            info.is_json = Some(false);
            info.is_mixed_container = Some(false);
            match ArrayBuf::decode(buf) {
                Ok(arr) => {
                    info.is_array = Some(true);
                    info.dtype = Some(arr.dtype.to_string());
                    info.shape = Some(arr.shape);
                }
                Err(_) => {
                    info.is_array = Some(false);
                }
            }
            return info;
        }
        info.is_array = Some(false);
        if weft_common::is_mixed_container(buf) {
            info.is_mixed_container = Some(true);
            info.is_utf8 = Some(false);
            info.is_json = Some(false);
            return info;
        }
        info.is_mixed_container = Some(false);
        let text = match std::str::from_utf8(buf) {
            Ok(text) => {
                info.is_utf8 = Some(true);
                text
            }
            Err(_) => {
                info.is_utf8 = Some(false);
                info.is_json = Some(false);
                return info;
            }
        };
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => {
                info.is_json = Some(true);
                info.fill_json_facts(&value);
            }
            Err(_) => {
                info.is_json = Some(false);
            }
        }
        info
    }

    fn fill_json_facts(&mut self, value: &serde_json::Value) {
        use serde_json::Value;
        let (json_type, numeric_scalar) = match value {
            Value::Object(_) => (JsonType::Object, false),
            Value::Array(items) => {
                let numeric = !items.is_empty() && items.iter().all(Value::is_number);
                self.is_json_numeric_array = Some(numeric);
                (JsonType::List, false)
            }
            Value::String(s) => (JsonType::Str, s.trim().parse::<f64>().is_ok()),
            Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    (JsonType::Int, true)
                } else {
                    (JsonType::Float, true)
                }
            }
            Value::Bool(_) => (JsonType::Bool, true),
            Value::Null => (JsonType::Null, false),
        };
        self.json_type = Some(json_type);
        self.is_json_numeric_scalar = Some(numeric_scalar);
        if !matches!(json_type, JsonType::List) {
            self.is_json_numeric_array = Some(false);
        }
    }

    /// Monotonically merges another info into this one.
    ///
    /// Filling an unset field is always allowed; changing a set field to a
    /// different value is a consistency violation.
    pub fn update(&mut self, other: &BufferInfo) -> WeftResult<()> {
        fill(&mut self.length, "length", &other.length)?;
        fill(&mut self.is_utf8, "is_utf8", &other.is_utf8)?;
        fill(&mut self.is_json, "is_json", &other.is_json)?;
        fill(&mut self.json_type, "json_type", &other.json_type)?;
        fill(
            &mut self.is_json_numeric_array,
            "is_json_numeric_array",
            &other.is_json_numeric_array,
        )?;
        fill(
            &mut self.is_json_numeric_scalar,
            "is_json_numeric_scalar",
            &other.is_json_numeric_scalar,
        )?;
        fill(&mut self.is_array, "is_array", &other.is_array)?;
        fill(&mut self.dtype, "dtype", &other.dtype)?;
        fill(&mut self.shape, "shape", &other.shape)?;
        fill(
            &mut self.is_mixed_container,
            "is_mixed_container",
            &other.is_mixed_container,
        )?;
        fill(&mut self.str2text, "str2text", &other.str2text)?;
        fill(&mut self.text2str, "text2str", &other.text2str)?;
        fill(&mut self.bytes2binary, "bytes2binary", &other.bytes2binary)?;
        fill(&mut self.binary2bytes, "binary2bytes", &other.binary2bytes)?;
        fill(&mut self.json2binary, "json2binary", &other.json2binary)?;
        fill(&mut self.binary2json, "binary2json", &other.binary2json)?;
        Ok(())
    }

    /// Looks up the memoized result checksum for a one-step conversion.
    pub fn conversion_memo(&self, from: CellType, to: CellType) -> Option<Checksum> {
        match (from, to) {
            (CellType::Str, CellType::Text) => self.str2text,
            (CellType::Text, CellType::Str) => self.text2str,
            (CellType::Bytes, CellType::Binary) => self.bytes2binary,
            (CellType::Binary, CellType::Bytes) => self.binary2bytes,
            (CellType::Plain, CellType::Binary) => self.json2binary,
            (CellType::Binary, CellType::Plain) => self.binary2json,
            _ => None,
        }
    }

    /// Records the memoized result checksum for a one-step conversion.
    /// Pairs without a memo slot are ignored.
    pub fn set_conversion_memo(&mut self, from: CellType, to: CellType, result: Checksum) {
        let slot = match (from, to) {
            (CellType::Str, CellType::Text) => &mut self.str2text,
            (CellType::Text, CellType::Str) => &mut self.text2str,
            (CellType::Bytes, CellType::Binary) => &mut self.bytes2binary,
            (CellType::Binary, CellType::Bytes) => &mut self.binary2bytes,
            (CellType::Plain, CellType::Binary) => &mut self.json2binary,
            (CellType::Binary, CellType::Plain) => &mut self.binary2json,
            _ => return,
        };
        *slot = Some(result);
    }

    /// Returns `false` if the facts known so far make the celltype
    /// impossible for this buffer; `true` when it is not excluded.
    pub fn admits(&self, celltype: CellType) -> bool {
        match celltype {
            CellType::Bytes | CellType::Checksum => true,
            CellType::Mixed => {
                !(self.is_json == Some(false)
                    && self.is_array == Some(false)
                    && self.is_mixed_container == Some(false))
            }
            CellType::Binary => {
                self.is_json != Some(true) && self.is_mixed_container != Some(true)
            }
            CellType::Text | CellType::Code => self.is_utf8 != Some(false),
            CellType::Plain => {
                self.is_utf8 != Some(false)
                    && self.is_array != Some(true)
                    && self.is_mixed_container != Some(true)
            }
            CellType::Str | CellType::Int | CellType::Float | CellType::Bool => {
                if self.is_utf8 == Some(false)
                    || self.is_array == Some(true)
                    || self.is_mixed_container == Some(true)
                {
                    return false;
                }
                if matches!(self.json_type, Some(JsonType::Object | JsonType::List)) {
                    return false;
                }
                if celltype != CellType::Str && self.is_json_numeric_scalar == Some(false) {
                    return false;
                }
                true
            }
        }
    }

    /// Returns `true` only when the facts known so far prove the buffer is
    /// a valid instance of the celltype.
    pub fn proves(&self, celltype: CellType) -> bool {
        if !self.admits(celltype) {
            return false;
        }
        match celltype {
            CellType::Bytes => true,
            CellType::Checksum => false,
            CellType::Mixed => {
                self.is_json == Some(true)
                    || self.is_array == Some(true)
                    || self.is_mixed_container == Some(true)
            }
            CellType::Binary => self.is_array == Some(true),
            CellType::Text => self.is_utf8 == Some(true),
            CellType::Code => false,
            CellType::Plain => self.is_json == Some(true),
            CellType::Str => self.json_type == Some(JsonType::Str),
            CellType::Int => self.json_type == Some(JsonType::Int),
            CellType::Float => {
                matches!(self.json_type, Some(JsonType::Float | JsonType::Int))
            }
            CellType::Bool => self.json_type == Some(JsonType::Bool),
        }
    }
}
