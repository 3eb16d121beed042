//! Expressions: the unit of evaluation and deduplication.
//!
//! An expression names a derivation from an origin checksum: optionally
//! descend a path, optionally dereference a hash pattern, then convert
//! to a target celltype. Two accessors demanding the same derivation
//! compare equal structurally and share one evaluation.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_cache::BufferCache;
use weft_common::{Buffer, CellType, Checksum};
use weft_convert::Converter;

use crate::error::GraphError;

/// A supported hash pattern over a mixed cell.
///
/// `DeepValue` (`"#"`) stores the checksum of the whole value;
/// `DeepMembers` (`{"*": "#"}`) stores an object whose member values are
/// checksums.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashPattern {
    /// The buffer holds the checksum of the deep value.
    DeepValue,
    /// The buffer holds an object of per-member checksums.
    DeepMembers,
}

impl HashPattern {
    /// Parses the JSON spelling of a hash pattern. Only `"#"` and
    /// `{"*": "#"}` are supported.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if s == "#" => Some(HashPattern::DeepValue),
            Value::Object(map) => {
                if map.len() == 1 && map.get("*").and_then(Value::as_str) == Some("#") {
                    Some(HashPattern::DeepMembers)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// The JSON spelling of this pattern.
    pub fn to_value(self) -> Value {
        match self {
            HashPattern::DeepValue => Value::String("#".to_string()),
            HashPattern::DeepMembers => serde_json::json!({"*": "#"}),
        }
    }
}

/// An immutable derivation from an origin checksum.
///
/// Structural equality and `Hash` give expression identity: the live
/// graph keys its deduplication map on the whole tuple.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Expression {
    /// Origin checksum the derivation starts from.
    pub checksum: Checksum,
    /// Path into the origin value; empty for the whole value.
    pub path: Vec<String>,
    /// Celltype of the origin buffer.
    pub celltype: CellType,
    /// Hash pattern under which the origin buffer stores its value.
    pub hash_pattern: Option<HashPattern>,
    /// Celltype the result must have.
    pub target_celltype: CellType,
    /// Hash pattern under which the result must be stored.
    pub target_hash_pattern: Option<HashPattern>,
}

impl Expression {
    /// Builds a validated expression.
    ///
    /// Paths are only meaningful on mixed, plain and binary origins;
    /// hash patterns only on mixed endpoints.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        checksum: Checksum,
        path: Vec<String>,
        celltype: CellType,
        hash_pattern: Option<HashPattern>,
        target_celltype: CellType,
        target_hash_pattern: Option<HashPattern>,
    ) -> Result<Self, GraphError> {
        if !path.is_empty()
            && !matches!(celltype, CellType::Mixed | CellType::Plain | CellType::Binary)
        {
            return Err(GraphError::InvalidExpression(format!(
                "a path cannot descend into a {celltype} buffer"
            )));
        }
        if hash_pattern.is_some() && celltype != CellType::Mixed {
            return Err(GraphError::InvalidExpression(format!(
                "hash patterns apply to mixed cells, not {celltype}"
            )));
        }
        if target_hash_pattern.is_some() && target_celltype != CellType::Mixed {
            return Err(GraphError::InvalidExpression(format!(
                "hash patterns apply to mixed cells, not {target_celltype}"
            )));
        }
        Ok(Self {
            checksum,
            path,
            celltype,
            hash_pattern,
            target_celltype,
            target_hash_pattern,
        })
    }

    /// A whole-value, pattern-free conversion expression.
    pub fn conversion(
        checksum: Checksum,
        celltype: CellType,
        target_celltype: CellType,
    ) -> Self {
        Self {
            checksum,
            path: Vec::new(),
            celltype,
            hash_pattern: None,
            target_celltype,
            target_hash_pattern: None,
        }
    }

    /// `true` if the expression resolves to its own origin checksum
    /// without any work.
    pub fn is_trivial(&self) -> bool {
        self.path.is_empty()
            && self.hash_pattern.is_none()
            && self.target_hash_pattern.is_none()
            && self.celltype == self.target_celltype
    }

    /// Content digest of the expression itself, used as a provenance and
    /// elision key.
    pub fn digest(&self) -> Checksum {
        // canonical JSON of the structural tuple
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        Checksum::from_bytes(&encoded)
    }
}

/// Evaluates an expression against the cache, returning the checksum of
/// the result buffer.
pub fn evaluate_expression(
    cache: &mut BufferCache,
    converter: &mut Converter,
    expr: &Expression,
) -> Result<Checksum, GraphError> {
    if expr.is_trivial() {
        return Ok(expr.checksum);
    }
    let mut cur = expr.checksum;
    let mut cur_type = expr.celltype;
    let mut path: &[String] = &expr.path;

    match expr.hash_pattern {
        Some(HashPattern::DeepValue) => {
            cur = converter.convert(cache, cur, CellType::Checksum, CellType::Mixed)?;
            cur_type = CellType::Mixed;
        }
        Some(HashPattern::DeepMembers) => {
            if let Some((head, rest)) = path.split_first() {
                let buf = cache.get_buffer(cur)?;
                let members = parse_object(&buf)?;
                let member = members.get(head).ok_or_else(|| {
                    GraphError::InvalidExpression(format!("no member {head:?}"))
                })?;
                let hex = member.as_str().ok_or_else(|| {
                    GraphError::InvalidExpression(format!(
                        "member {head:?} does not hold a checksum"
                    ))
                })?;
                cur = Checksum::from_str(hex).map_err(|e| {
                    GraphError::InvalidExpression(format!("member {head:?}: {e}"))
                })?;
                cur_type = CellType::Mixed;
                path = rest;
            } else if expr.target_hash_pattern == Some(HashPattern::DeepMembers) {
                // the stored member-checksum object is the value itself
                return Ok(converter.convert(
                    cache,
                    cur,
                    CellType::Mixed,
                    expr.target_celltype,
                )?);
            } else {
                return Err(GraphError::InvalidExpression(
                    "a deep-members source needs a path or a deep-members target".to_string(),
                ));
            }
        }
        None => {}
    }

    if !path.is_empty() {
        cur = descend(cache, converter, cur, cur_type, path)?;
        cur_type = CellType::Mixed;
    }

    match expr.target_hash_pattern {
        Some(HashPattern::DeepValue) => {
            Ok(converter.convert(cache, cur, cur_type, CellType::Checksum)?)
        }
        Some(HashPattern::DeepMembers) => {
            let buf = cache.get_buffer(cur)?;
            let members = parse_object(&buf)?;
            let mut out = serde_json::Map::new();
            for (key, value) in members {
                let member_buf = Buffer::new(serde_json::to_vec(&value).unwrap_or_default());
                let member_cs = member_buf.checksum();
                cache.cache_buffer(member_cs, member_buf)?;
                out.insert(key, Value::String(member_cs.hex()));
            }
            let buf = Buffer::new(serde_json::to_vec(&Value::Object(out)).unwrap_or_default());
            let cs = buf.checksum();
            cache.cache_buffer(cs, buf)?;
            Ok(cs)
        }
        None => Ok(converter.convert(cache, cur, cur_type, expr.target_celltype)?),
    }
}

/// Walks a path into a plain/mixed/binary value and caches the
/// sub-value's canonical buffer.
fn descend(
    cache: &mut BufferCache,
    converter: &mut Converter,
    checksum: Checksum,
    celltype: CellType,
    path: &[String],
) -> Result<Checksum, GraphError> {
    // binary arrays descend through their plain form
    let plain = converter.convert(cache, checksum, celltype, CellType::Plain)?;
    let buf = cache.get_buffer(plain)?;
    let root: Value = serde_json::from_slice(&buf)
        .map_err(|e| GraphError::InvalidExpression(format!("not a structured value: {e}")))?;
    let mut cur = &root;
    for segment in path {
        cur = match cur {
            Value::Object(map) => map.get(segment).ok_or_else(|| {
                GraphError::InvalidExpression(format!("no member {segment:?}"))
            })?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| {
                    GraphError::InvalidExpression(format!(
                        "list index {segment:?} is not a number"
                    ))
                })?;
                items.get(index).ok_or_else(|| {
                    GraphError::InvalidExpression(format!("list index {index} out of range"))
                })?
            }
            _ => {
                return Err(GraphError::InvalidExpression(format!(
                    "cannot descend {segment:?} into a scalar"
                )))
            }
        };
    }
    let sub = Buffer::new(serde_json::to_vec(cur).unwrap_or_default());
    let cs = sub.checksum();
    cache.cache_buffer(cs, sub)?;
    Ok(cs)
}

fn parse_object(buf: &Buffer) -> Result<serde_json::Map<String, Value>, GraphError> {
    match serde_json::from_slice(buf.as_bytes()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GraphError::InvalidExpression(
            "expected an object buffer".to_string(),
        )),
        Err(e) => Err(GraphError::InvalidExpression(format!(
            "expected an object buffer: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_cache::NoRemote;

    fn cache() -> BufferCache {
        BufferCache::new(Box::new(NoRemote))
    }

    fn seed(cache: &mut BufferCache, bytes: &[u8]) -> Checksum {
        let buf = Buffer::new(bytes.to_vec());
        let cs = buf.checksum();
        cache.incref_buffer(cs, buf).unwrap();
        cs
    }

    #[test]
    fn trivial_expression_resolves_to_origin() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"[1,2]");
        let expr = Expression::conversion(cs, CellType::Plain, CellType::Plain);
        assert!(expr.is_trivial());
        assert_eq!(evaluate_expression(&mut cache, &mut conv, &expr).unwrap(), cs);
    }

    #[test]
    fn path_descends_objects_and_lists() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"{\"a\":{\"b\":[10,20,30]}}");
        let expr = Expression::new(
            cs,
            vec!["a".into(), "b".into(), "1".into()],
            CellType::Plain,
            None,
            CellType::Int,
            None,
        )
        .unwrap();
        let out = evaluate_expression(&mut cache, &mut conv, &expr).unwrap();
        assert_eq!(cache.get_buffer(out).unwrap().as_bytes(), b"20");
    }

    #[test]
    fn missing_member_is_an_error() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"{\"a\":1}");
        let expr = Expression::new(
            cs,
            vec!["b".into()],
            CellType::Plain,
            None,
            CellType::Mixed,
            None,
        )
        .unwrap();
        let err = evaluate_expression(&mut cache, &mut conv, &expr).unwrap_err();
        assert!(matches!(err, GraphError::InvalidExpression(_)));
    }

    #[test]
    fn deep_value_pattern_dereferences() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let value_cs = seed(&mut cache, b"[1,2,3]");
        let ref_cs = seed(&mut cache, value_cs.hex().as_bytes());
        let expr = Expression::new(
            ref_cs,
            Vec::new(),
            CellType::Mixed,
            Some(HashPattern::DeepValue),
            CellType::Plain,
            None,
        )
        .unwrap();
        let out = evaluate_expression(&mut cache, &mut conv, &expr).unwrap();
        assert_eq!(out, value_cs);
    }

    #[test]
    fn deep_members_pattern_selects_member() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let member_cs = seed(&mut cache, b"42");
        let obj = format!("{{\"x\":\"{}\"}}", member_cs.hex());
        let obj_cs = seed(&mut cache, obj.as_bytes());
        let expr = Expression::new(
            obj_cs,
            vec!["x".into()],
            CellType::Mixed,
            Some(HashPattern::DeepMembers),
            CellType::Int,
            None,
        )
        .unwrap();
        let out = evaluate_expression(&mut cache, &mut conv, &expr).unwrap();
        assert_eq!(out, member_cs);
    }

    #[test]
    fn target_deep_members_splits_an_object() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"{\"a\":1,\"b\":[2]}");
        let expr = Expression::new(
            cs,
            Vec::new(),
            CellType::Plain,
            None,
            CellType::Mixed,
            Some(HashPattern::DeepMembers),
        )
        .unwrap();
        let out = evaluate_expression(&mut cache, &mut conv, &expr).unwrap();
        let buf = cache.get_buffer(out).unwrap();
        let map: serde_json::Map<String, Value> =
            serde_json::from_slice(buf.as_bytes()).unwrap();
        assert_eq!(map.len(), 2);
        let a_hex = map["a"].as_str().unwrap();
        let a_cs = Checksum::from_str(a_hex).unwrap();
        assert_eq!(cache.get_buffer(a_cs).unwrap().as_bytes(), b"1");
    }

    #[test]
    fn path_rejected_on_scalar_origin() {
        let err = Expression::new(
            Checksum::NIL,
            vec!["a".into()],
            CellType::Int,
            None,
            CellType::Int,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::InvalidExpression(_)));
    }

    #[test]
    fn hash_pattern_spellings() {
        assert_eq!(
            HashPattern::from_value(&Value::String("#".into())),
            Some(HashPattern::DeepValue)
        );
        assert_eq!(
            HashPattern::from_value(&serde_json::json!({"*": "#"})),
            Some(HashPattern::DeepMembers)
        );
        assert_eq!(HashPattern::from_value(&serde_json::json!({"*": "##"})), None);
        assert_eq!(HashPattern::from_value(&Value::Bool(true)), None);
    }

    #[test]
    fn digest_is_structural() {
        let a = Expression::conversion(Checksum::NIL, CellType::Plain, CellType::Text);
        let b = Expression::conversion(Checksum::NIL, CellType::Plain, CellType::Text);
        let c = Expression::conversion(Checksum::NIL, CellType::Plain, CellType::Str);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }
}
