//! Dotted source paths and output insertion.

use std::borrow::Cow;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::schema::escape_pointer;
use crate::types::ROOT_SEGMENT;

/// One step of a [`SourcePath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `$root`: continue from the top-level input document.
    Root,
    /// Object key, array index (if numeric), or a field collected from every
    /// element when applied to an array.
    Field(String),
}

/// A parsed `map` path such as `"employees.0.name"` or `"$root.meta.id"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    raw: String,
    segments: Vec<Segment>,
}

impl SourcePath {
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s == ROOT_SEGMENT {
                    Segment::Root
                } else {
                    Segment::Field(s.to_string())
                }
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The last field name, used as the key of a composite part.
    pub fn last_field(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| match s {
            Segment::Field(f) => Some(f.as_str()),
            Segment::Root => None,
        })
    }

    /// Read this path from `subject`.
    ///
    /// `pointer` is the JSON Pointer of `subject` within the input; the
    /// returned pointer names where the value was (or would have been) found.
    /// Nulls count as absent.
    pub fn lookup<'v>(
        &self,
        subject: &'v Value,
        root: &'v Value,
        pointer: &str,
    ) -> (Option<Cow<'v, Value>>, String) {
        let mut current = Some(Cow::Borrowed(subject));
        let mut at = pointer.to_string();

        for segment in &self.segments {
            match segment {
                Segment::Root => {
                    current = Some(Cow::Borrowed(root));
                    at.clear();
                }
                Segment::Field(name) => {
                    at.push('/');
                    at.push_str(&escape_pointer(name));
                    current = current.and_then(|value| step(value, name));
                }
            }
        }

        (current.filter(|v| !v.is_null()), at)
    }
}

impl fmt::Display for SourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for SourcePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

fn step<'v>(value: Cow<'v, Value>, name: &str) -> Option<Cow<'v, Value>> {
    match value {
        Cow::Borrowed(v) => step_borrowed(v, name),
        Cow::Owned(v) => step_borrowed(&v, name).map(|c| Cow::Owned(c.into_owned())),
    }
}

fn step_borrowed<'v>(value: &'v Value, name: &str) -> Option<Cow<'v, Value>> {
    match value {
        Value::Object(map) => map.get(name).map(Cow::Borrowed),
        Value::Array(items) => match name.parse::<usize>() {
            Ok(index) => items.get(index).map(Cow::Borrowed),
            // Not an index: collect the field from every element
            Err(_) => {
                let collected: Vec<Value> = items
                    .iter()
                    .filter_map(|item| item.get(name))
                    .filter(|v| !v.is_null())
                    .cloned()
                    .collect();
                Some(Cow::Owned(Value::Array(collected)))
            }
        },
        _ => None,
    }
}

/// Write `value` at `target` inside `output`, creating intermediate objects.
/// An empty target replaces `output` entirely.
pub fn insert_at(output: &mut Value, target: &[String], value: Value) {
    let Some((last, parents)) = target.split_last() else {
        *output = value;
        return;
    };

    let mut current = output;
    for key in parents {
        current = ensure_object(current)
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert(last.clone(), value);
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}
