//! JSON Patch engine for the add/replace/remove subset of RFC 6902.
//!
//! Application is non-destructive: [`apply`] works on a clone of the input
//! document and either returns the fully patched result or an error, so a
//! caller never observes a partially applied op list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while applying a patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The pointer string is not a valid JSON Pointer.
    #[error("malformed pointer {0:?}")]
    MalformedPointer(String),

    /// The operation requires a value but none was supplied.
    #[error("missing value for {0} at {1:?}")]
    MissingValue(&'static str, String),

    /// The pointer references a location that does not exist.
    #[error("path not found {0:?}")]
    PathNotFound(String),

    /// An array was indexed with something other than a valid index.
    #[error("bad array index in {0:?}")]
    BadArrayIndex(String),

    /// An array index is outside the addressable range.
    #[error("index out of bounds in {0:?}")]
    IndexOutOfBounds(String),

    /// The pointer descends into a scalar.
    #[error("cannot index into non-container at {0:?}")]
    NotAContainer(String),

    /// The whole-document target cannot be removed.
    #[error("cannot remove the document root")]
    RemoveRoot,
}

/// Kind of a single patch operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Insert or create at the path; overwrites existing object keys,
    /// shifts array elements at and after the index.
    Add,
    /// Overwrite an existing location.
    Replace,
    /// Delete an existing location.
    Remove,
}

impl OpKind {
    /// Wire name of the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
        }
    }
}

/// One add/replace/remove instruction targeting a path within a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    /// Operation kind.
    pub op: OpKind,
    /// JSON Pointer to the target location.
    pub path: String,
    /// Payload for add/replace; absent for remove.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Apply `ops` in order to a copy of `doc`.
///
/// The input document is never mutated. The first failing op aborts the
/// whole application and the partial result is discarded.
///
/// # Errors
/// Returns a [`PatchError`] describing the first op that could not be
/// applied.
pub fn apply(doc: &Value, ops: &[PatchOp]) -> Result<Value, PatchError> {
    let mut updated = doc.clone();
    for op in ops {
        apply_op(&mut updated, op)?;
    }
    Ok(updated)
}

fn apply_op(doc: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    let tokens = parse_pointer(&op.path)?;
    match op.op {
        OpKind::Add => {
            let value = required_value(op)?;
            add(doc, &tokens, value, &op.path)
        }
        OpKind::Replace => {
            let value = required_value(op)?;
            replace(doc, &tokens, value, &op.path)
        }
        OpKind::Remove => remove(doc, &tokens, &op.path),
    }
}

fn required_value(op: &PatchOp) -> Result<Value, PatchError> {
    op.value
        .clone()
        .ok_or_else(|| PatchError::MissingValue(op.op.as_str(), op.path.clone()))
}

/// Split a JSON Pointer into unescaped reference tokens.
///
/// The empty pointer addresses the document root and yields no tokens.
fn parse_pointer(path: &str) -> Result<Vec<String>, PatchError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(PatchError::MalformedPointer(path.to_string()));
    };
    rest.split('/').map(|raw| unescape_token(raw, path)).collect()
}

fn unescape_token(raw: &str, path: &str) -> Result<String, PatchError> {
    let mut token = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '~' {
            token.push(ch);
            continue;
        }
        match chars.next() {
            Some('0') => token.push('~'),
            Some('1') => token.push('/'),
            _ => return Err(PatchError::MalformedPointer(path.to_string())),
        }
    }
    Ok(token)
}

/// Parse an array index token. Leading zeros and signs are rejected.
fn parse_index(token: &str, path: &str) -> Result<usize, PatchError> {
    if token.is_empty() || (token.len() > 1 && token.starts_with('0')) {
        return Err(PatchError::BadArrayIndex(path.to_string()));
    }
    token
        .parse::<usize>()
        .map_err(|_| PatchError::BadArrayIndex(path.to_string()))
}

/// Walk to the container holding the final token.
fn resolve_parent<'a>(
    doc: &'a mut Value,
    tokens: &[String],
    path: &str,
) -> Result<&'a mut Value, PatchError> {
    let mut current = doc;
    for token in tokens {
        current = match current {
            Value::Object(map) => map
                .get_mut(token.as_str())
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?,
            Value::Array(items) => {
                let index = parse_index(token, path)?;
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::IndexOutOfBounds(path.to_string()))?
            }
            _ => return Err(PatchError::NotAContainer(path.to_string())),
        };
    }
    Ok(current)
}

fn add(doc: &mut Value, tokens: &[String], value: Value, path: &str) -> Result<(), PatchError> {
    let Some((leaf, parents)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = resolve_parent(doc, parents, path)?;
    match parent {
        Value::Object(map) => {
            map.insert(leaf.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if leaf == "-" {
                items.push(value);
                return Ok(());
            }
            let index = parse_index(leaf, path)?;
            if index > items.len() {
                return Err(PatchError::IndexOutOfBounds(path.to_string()));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer(path.to_string())),
    }
}

fn replace(doc: &mut Value, tokens: &[String], value: Value, path: &str) -> Result<(), PatchError> {
    let Some((leaf, parents)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent = resolve_parent(doc, parents, path)?;
    match parent {
        Value::Object(map) => {
            let slot = map
                .get_mut(leaf.as_str())
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            *slot = value;
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(leaf, path)?;
            let slot = items
                .get_mut(index)
                .ok_or_else(|| PatchError::IndexOutOfBounds(path.to_string()))?;
            *slot = value;
            Ok(())
        }
        _ => Err(PatchError::NotAContainer(path.to_string())),
    }
}

fn remove(doc: &mut Value, tokens: &[String], path: &str) -> Result<(), PatchError> {
    let Some((leaf, parents)) = tokens.split_last() else {
        return Err(PatchError::RemoveRoot);
    };
    let parent = resolve_parent(doc, parents, path)?;
    match parent {
        Value::Object(map) => {
            map.remove(leaf.as_str())
                .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(leaf, path)?;
            if index >= items.len() {
                return Err(PatchError::IndexOutOfBounds(path.to_string()));
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer(path.to_string())),
    }
}
