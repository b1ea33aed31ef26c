//! Decomposition strategies for composite `map` targets.
//!
//! A node such as `{"type": "string", "map": ["firstname", "lastname"]}` can be
//! fed a single scalar (`"Jane Doe"`) instead of separate parts. The executor
//! then looks up a strategy by the node's semantic type (its `format`, or its
//! `type` when no format is declared) and asks it for exactly as many parts as
//! the composite names.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Splits one scalar into `parts` values, or returns `None` if it cannot.
pub type DecomposeFn = dyn Fn(&Value, usize) -> Option<Vec<Value>> + Send + Sync;

/// Table of decomposition strategies keyed by semantic type name.
#[derive(Clone, Default)]
pub struct Decomposers {
    strategies: HashMap<String, Arc<DecomposeFn>>,
}

impl Decomposers {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the built-in `full-name` strategy registered.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table.register("full-name", whitespace_split);
        table
    }

    /// Register (or replace) the strategy for `semantic_type`.
    pub fn register<F>(&mut self, semantic_type: impl Into<String>, strategy: F) -> &mut Self
    where
        F: Fn(&Value, usize) -> Option<Vec<Value>> + Send + Sync + 'static,
    {
        self.strategies
            .insert(semantic_type.into(), Arc::new(strategy));
        self
    }

    pub fn get(&self, semantic_type: &str) -> Option<&DecomposeFn> {
        self.strategies.get(semantic_type).map(|s| s.as_ref())
    }

    pub fn contains(&self, semantic_type: &str) -> bool {
        self.strategies.contains_key(semantic_type)
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl fmt::Debug for Decomposers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.strategies.keys().collect();
        names.sort();
        f.debug_struct("Decomposers")
            .field("strategies", &names)
            .finish()
    }
}

/// Split a string on whitespace into exactly `parts` pieces.
///
/// The first `parts - 1` words become one part each and the remainder is kept
/// whole as the last part, so `"Mary Ann Smith"` into 2 gives
/// `["Mary", "Ann Smith"]`. Fails when there are fewer words than parts.
pub fn whitespace_split(value: &Value, parts: usize) -> Option<Vec<Value>> {
    let text = value.as_str()?.trim();
    if parts == 0 || text.is_empty() {
        return None;
    }

    let mut out = Vec::with_capacity(parts);
    let mut rest = text;
    for _ in 1..parts {
        let (head, tail) = rest.split_once(char::is_whitespace)?;
        out.push(Value::String(head.to_string()));
        rest = tail.trim_start();
    }
    if rest.is_empty() {
        return None;
    }
    out.push(Value::String(rest.to_string()));
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitespace_split_two_parts() {
        let parts = whitespace_split(&json!("Jane Doe"), 2).unwrap();
        assert_eq!(parts, vec![json!("Jane"), json!("Doe")]);
    }

    #[test]
    fn whitespace_split_keeps_remainder() {
        let parts = whitespace_split(&json!("Mary  Ann Smith"), 2).unwrap();
        assert_eq!(parts, vec![json!("Mary"), json!("Ann Smith")]);
    }

    #[test]
    fn whitespace_split_too_few_words() {
        assert!(whitespace_split(&json!("Cher"), 2).is_none());
        assert!(whitespace_split(&json!(42), 1).is_none());
        assert!(whitespace_split(&json!("   "), 1).is_none());
    }

    #[test]
    fn register_and_lookup() {
        let mut table = Decomposers::new();
        assert!(table.is_empty());
        table.register("csv", |v, n| {
            let parts: Vec<Value> = v
                .as_str()?
                .splitn(n, ',')
                .map(|p| Value::String(p.trim().to_string()))
                .collect();
            (parts.len() == n).then_some(parts)
        });

        let csv = table.get("csv").unwrap();
        assert_eq!(csv(&json!("a, b"), 2), Some(vec![json!("a"), json!("b")]));
        assert!(table.get("full-name").is_none());
        assert!(Decomposers::with_builtins().contains("full-name"));
    }
}
