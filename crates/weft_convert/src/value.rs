//! Concrete single-hop conversion implementations.
//!
//! These functions operate on buffer content alone; the engine decides
//! which to call and handles caching and BufferInfo back-fill. Checksum
//! preservation follows the classification table: reinterpretations only
//! validate, reformats and possibles may produce a new buffer, value
//! conversions always decode and recode.

use serde_json::Value;
use weft_common::{ArrayBuf, CellType};

/// The outcome of a single-hop conversion step.
#[derive(Clone, PartialEq, Debug)]
pub enum StepOutcome {
    /// The buffer is already valid for the target; the checksum is
    /// preserved.
    Same,
    /// A new buffer was produced.
    New(Vec<u8>),
}

/// Serializes a JSON value into its canonical buffer form: compact, with
/// object keys sorted (serde_json's default map ordering).
pub fn canonical_json(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("JSON value serialization cannot fail")
}

fn parse_json(buf: &[u8]) -> Result<Value, String> {
    serde_json::from_slice(buf).map_err(|e| format!("not a plain literal: {e}"))
}

fn parse_utf8(buf: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(buf).map_err(|e| format!("not UTF-8 text: {e}"))
}

/// Validates a checksum-preserving reinterpretation. `Ok(())` means the
/// buffer is a valid instance of the target celltype as-is.
pub fn reinterpret(buf: &[u8], from: CellType, to: CellType) -> Result<(), String> {
    use CellType::*;
    match (from, to) {
        (Bytes, Text) => parse_utf8(buf).map(|_| ()),
        (Text, Code) => parse_utf8(buf).map(|_| ()),
        (Bytes, Plain) => parse_json(buf).map(|_| ()),
        (Mixed, Plain) => {
            if weft_common::is_array_buffer(buf) || weft_common::is_mixed_container(buf) {
                return Err("mixed buffer is not a plain literal".to_string());
            }
            parse_json(buf).map(|_| ())
        }
        (Mixed, Binary) => {
            if weft_common::is_array_buffer(buf) {
                Ok(())
            } else {
                Err("mixed buffer is not a native array".to_string())
            }
        }
        (Plain, Str) => match parse_json(buf)? {
            Value::String(_) => Ok(()),
            other => Err(format!("expected a string literal, found {}", kind_of(&other))),
        },
        (Plain, Int) => match parse_json(buf)? {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
            other => Err(format!("expected an integer literal, found {}", kind_of(&other))),
        },
        (Plain, Float) => match parse_json(buf)? {
            Value::Number(_) => Ok(()),
            other => Err(format!("expected a number literal, found {}", kind_of(&other))),
        },
        (Plain, Bool) => match parse_json(buf)? {
            Value::Bool(_) => Ok(()),
            other => Err(format!("expected a boolean literal, found {}", kind_of(&other))),
        },
        _ => unreachable!("({from}, {to}) is not a reinterpretation"),
    }
}

/// Performs a reformat conversion (guaranteed to succeed for valid
/// input; sometimes the checksum changes).
pub fn reformat(buf: &[u8], from: CellType, to: CellType) -> Result<StepOutcome, String> {
    use CellType::*;
    match (from, to) {
        (Bytes, Binary) => {
            if weft_common::is_array_buffer(buf) {
                Ok(StepOutcome::Same)
            } else {
                let arr = ArrayBuf::from_raw_bytes(buf).map_err(|e| e.to_string())?;
                Ok(StepOutcome::New(arr.encode()))
            }
        }
        (Bytes, Mixed) => {
            if weft_common::is_array_buffer(buf) || weft_common::is_mixed_container(buf) {
                Ok(StepOutcome::Same)
            } else {
                let arr = ArrayBuf::from_raw_bytes(buf).map_err(|e| e.to_string())?;
                Ok(StepOutcome::New(arr.encode()))
            }
        }
        (Binary, Bytes) => {
            let arr = ArrayBuf::decode(buf).map_err(|e| e.to_string())?;
            match arr.as_raw_bytes() {
                Some(raw) => Ok(StepOutcome::New(raw.to_vec())),
                None => Ok(StepOutcome::Same),
            }
        }
        (Mixed, Bytes) => {
            if weft_common::is_array_buffer(buf) {
                reformat(buf, Binary, Bytes)
            } else {
                Ok(StepOutcome::Same)
            }
        }
        (Plain, Text) => match parse_json(buf)? {
            // a string literal unquotes; anything else already is text
            Value::String(s) => Ok(StepOutcome::New(s.into_bytes())),
            _ => Ok(StepOutcome::Same),
        },
        (Text, Plain) => {
            let text = parse_utf8(buf)?;
            if serde_json::from_str::<Value>(text).is_ok() {
                Ok(StepOutcome::Same)
            } else {
                Ok(StepOutcome::New(canonical_json(&Value::String(
                    text.to_string(),
                ))))
            }
        }
        (Text, Str) => {
            let text = parse_utf8(buf)?;
            Ok(StepOutcome::New(canonical_json(&Value::String(
                text.to_string(),
            ))))
        }
        (Str, Text) => match parse_json(buf)? {
            Value::String(s) => Ok(StepOutcome::New(s.into_bytes())),
            other => Err(format!("expected a string literal, found {}", kind_of(&other))),
        },
        (Int, Str) | (Float, Str) | (Bool, Str) => {
            let rendered = match parse_json(buf)? {
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => return Err(format!("expected a scalar, found {}", kind_of(&other))),
            };
            Ok(StepOutcome::New(canonical_json(&Value::String(rendered))))
        }
        (Int, Float) => {
            let n = scalar_f64(buf)?;
            Ok(render_number(n))
        }
        (Float, Int) => {
            let n = scalar_f64(buf)?;
            Ok(StepOutcome::New(canonical_json(&Value::from(n as i64))))
        }
        (Int, Bool) | (Float, Bool) => {
            let n = scalar_f64(buf)?;
            Ok(StepOutcome::New(canonical_json(&Value::Bool(n != 0.0))))
        }
        (Bool, Int) => {
            let b = scalar_bool(buf)?;
            Ok(StepOutcome::New(canonical_json(&Value::from(b as i64))))
        }
        (Bool, Float) => {
            let b = scalar_bool(buf)?;
            Ok(render_number(if b { 1.0 } else { 0.0 }))
        }
        _ => unreachable!("({from}, {to}) is not a reformat"),
    }
}

/// Performs a `possible` conversion: admissible only for some content,
/// and the checksum may change.
pub fn possible(buf: &[u8], from: CellType, to: CellType) -> Result<StepOutcome, String> {
    use CellType::*;
    match (from, to) {
        (Str, Int) => {
            let s = string_content(buf)?;
            let n: i64 = s.trim().parse().map_err(|_| {
                format!("string {s:?} does not spell an integer")
            })?;
            Ok(StepOutcome::New(canonical_json(&Value::from(n))))
        }
        (Str, Float) => {
            let s = string_content(buf)?;
            let n: f64 = s.trim().parse().map_err(|_| {
                format!("string {s:?} does not spell a number")
            })?;
            Ok(render_number(n))
        }
        (Str, Bool) => {
            let s = string_content(buf)?;
            let b = match s.trim().to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                other => match other.parse::<f64>() {
                    Ok(n) => n != 0.0,
                    Err(_) => {
                        return Err(format!("string {s:?} does not spell a boolean"))
                    }
                },
            };
            Ok(StepOutcome::New(canonical_json(&Value::Bool(b))))
        }
        (Binary, Int) | (Binary, Float) | (Binary, Bool) => {
            let arr = ArrayBuf::decode(buf).map_err(|e| e.to_string())?;
            let n = array_scalar(&arr)?;
            narrow_number(n, to)
        }
        (Mixed, Str) | (Mixed, Int) | (Mixed, Float) | (Mixed, Bool) => {
            if weft_common::is_array_buffer(buf) {
                if to == Str {
                    return Err("native array does not narrow to a string".to_string());
                }
                return possible(buf, Binary, to);
            }
            if weft_common::is_mixed_container(buf) {
                return Err("mixed container does not narrow to a scalar".to_string());
            }
            // a plain mixed buffer narrows by validity check
            match (parse_json(buf)?, to) {
                (Value::String(_), Str) => Ok(StepOutcome::Same),
                (Value::Number(n), Int) if n.is_i64() || n.is_u64() => Ok(StepOutcome::Same),
                (Value::Number(_), Float) => Ok(StepOutcome::Same),
                (Value::Bool(_), Bool) => Ok(StepOutcome::Same),
                (other, _) => Err(format!(
                    "mixed value of kind {} does not narrow to {to}",
                    kind_of(&other)
                )),
            }
        }
        _ => unreachable!("({from}, {to}) is not a possible conversion"),
    }
}

/// Decodes a plain literal into a native numeric array (the plain→binary
/// value conversion).
pub fn plain_to_binary(buf: &[u8]) -> Result<Vec<u8>, String> {
    match parse_json(buf)? {
        Value::Array(items) => {
            if items.is_empty() {
                return Err("empty list has no element type".to_string());
            }
            if items.iter().all(|v| v.as_i64().is_some()) {
                let ints: Vec<i64> = items.iter().map(|v| v.as_i64().unwrap()).collect();
                Ok(ArrayBuf::from_i64s(&ints).encode())
            } else if items.iter().all(Value::is_number) {
                let floats: Vec<f64> = items.iter().map(|v| v.as_f64().unwrap()).collect();
                Ok(ArrayBuf::from_f64s(&floats).encode())
            } else {
                Err("list is not homogeneously numeric".to_string())
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ArrayBuf::scalar_i64(i).encode())
            } else {
                Ok(ArrayBuf::scalar_f64(n.as_f64().unwrap()).encode())
            }
        }
        other => Err(format!(
            "value of kind {} is not a numeric array or scalar",
            kind_of(&other)
        )),
    }
}

/// Recodes a native numeric array as a plain literal (the binary→plain
/// value conversion).
pub fn binary_to_plain(buf: &[u8]) -> Result<Vec<u8>, String> {
    let arr = ArrayBuf::decode(buf).map_err(|e| e.to_string())?;
    let value = if arr.is_scalar() {
        number_value(array_scalar(&arr)?)
    } else if arr.shape.len() == 1 {
        if let Some(ints) = arr.as_i64s() {
            Value::Array(ints.into_iter().map(Value::from).collect())
        } else if let Some(floats) = arr.as_f64s() {
            Value::Array(floats.into_iter().map(number_value).collect())
        } else {
            return Err(format!("array dtype {} has no plain form", arr.dtype));
        }
    } else {
        return Err("multi-dimensional arrays have no plain form".to_string());
    };
    Ok(canonical_json(&value))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "list",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

fn scalar_f64(buf: &[u8]) -> Result<f64, String> {
    match parse_json(buf)? {
        Value::Number(n) => Ok(n.as_f64().unwrap()),
        other => Err(format!("expected a number literal, found {}", kind_of(&other))),
    }
}

fn scalar_bool(buf: &[u8]) -> Result<bool, String> {
    match parse_json(buf)? {
        Value::Bool(b) => Ok(b),
        other => Err(format!("expected a boolean literal, found {}", kind_of(&other))),
    }
}

fn string_content(buf: &[u8]) -> Result<String, String> {
    match parse_json(buf)? {
        Value::String(s) => Ok(s),
        other => Err(format!("expected a string literal, found {}", kind_of(&other))),
    }
}

fn array_scalar(arr: &ArrayBuf) -> Result<f64, String> {
    if !arr.is_scalar() {
        return Err(format!("array of shape {:?} is not a scalar", arr.shape));
    }
    if let Some(ints) = arr.as_i64s() {
        Ok(ints[0] as f64)
    } else if let Some(floats) = arr.as_f64s() {
        Ok(floats[0])
    } else {
        Err(format!("array dtype {} is not numeric", arr.dtype))
    }
}

fn narrow_number(n: f64, to: CellType) -> Result<StepOutcome, String> {
    match to {
        CellType::Int => Ok(StepOutcome::New(canonical_json(&Value::from(n as i64)))),
        CellType::Float => Ok(render_number(n)),
        CellType::Bool => Ok(StepOutcome::New(canonical_json(&Value::Bool(n != 0.0)))),
        _ => unreachable!(),
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn render_number(n: f64) -> StepOutcome {
    match serde_json::Number::from_f64(n) {
        Some(num) => StepOutcome::New(canonical_json(&Value::Number(num))),
        None => StepOutcome::New(canonical_json(&Value::Null)),
    }
}
