//! Channel path validation and JSON overlay helpers.

use serde_json::Value;

use crate::error::StructuredError;

/// Renders a path for diagnostics.
pub fn render(path: &[String]) -> String {
    if path.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", path.join("/"))
    }
}

/// `true` when one path is a prefix of the other (equality included).
/// Writes at such a pair would shadow each other.
pub fn overlaps(a: &[String], b: &[String]) -> bool {
    let n = a.len().min(b.len());
    a[..n] == b[..n]
}

/// Validates that no two inchannel paths overlap.
pub fn validate_inchannels(paths: &[Vec<String>]) -> Result<(), StructuredError> {
    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            if overlaps(a, b) {
                return Err(StructuredError::Overlap {
                    a: render(a),
                    b: render(b),
                });
            }
        }
    }
    Ok(())
}

/// Writes `value` into `root` at `path`, creating objects along the way.
/// Descending through an existing scalar fails.
pub fn set_at_path(
    root: &mut Value,
    path: &[String],
    value: Value,
) -> Result<(), StructuredError> {
    let mut cur = root;
    for (depth, segment) in path.iter().enumerate() {
        if cur.is_null() {
            *cur = Value::Object(serde_json::Map::new());
        }
        let map = cur.as_object_mut().ok_or_else(|| StructuredError::PathBlocked {
            path: render(&path[..depth]),
        })?;
        cur = map.entry(segment.clone()).or_insert(Value::Null);
    }
    *cur = value;
    Ok(())
}

/// Removes the value at `path`, pruning nothing else.
pub fn remove_at_path(root: &mut Value, path: &[String]) {
    if path.is_empty() {
        *root = Value::Null;
        return;
    }
    let mut cur = root;
    for segment in &path[..path.len() - 1] {
        cur = match cur.get_mut(segment) {
            Some(next) => next,
            None => return,
        };
    }
    if let Some(map) = cur.as_object_mut() {
        map.remove(&path[path.len() - 1]);
    }
}

/// Reads the value at `path`, if present.
pub fn get_at_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut cur = root;
    for segment in path {
        cur = cur.get(segment)?;
    }
    Some(cur)
}
