//! Mapping schema model and structural parsing.
//!
//! Parsing only checks shape: `$ref` pointers are kept as [`NodeKind::Reference`]
//! and option values are not interpreted beyond their JSON type. See
//! [`crate::resolve`] and [`crate::compile`] for the semantic passes.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::types::{
    json_type_name, ValueType, DEFAULT_VERSION, GET_ONE, JOIN, KEY_MAP, PRIORITY,
    SUPPORTED_VERSIONS,
};

/// Where a node reads its value from in the input document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapTarget {
    /// Dotted path, e.g. `"company.name"` or `"$root.meta.id"`.
    Path(String),
    /// Ordered list of paths whose values are combined, e.g.
    /// `["firstname", "lastname"]`.
    Composite(Vec<String>),
}

/// Comparison used by array `conditions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    #[serde(rename = "$eq")]
    Eq,
    #[serde(rename = "$ne")]
    Ne,
    #[serde(rename = "$gt")]
    Gt,
    #[serde(rename = "$gte")]
    Gte,
    #[serde(rename = "$lt")]
    Lt,
    #[serde(rename = "$lte")]
    Lte,
}

impl Operator {
    /// Parse an operator key such as `$gte`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "$eq" => Some(Operator::Eq),
            "$ne" => Some(Operator::Ne),
            "$gt" => Some(Operator::Gt),
            "$gte" => Some(Operator::Gte),
            "$lt" => Some(Operator::Lt),
            "$lte" => Some(Operator::Lte),
            _ => None,
        }
    }

    /// Apply the operator. A missing left-hand side only satisfies `$ne`.
    pub fn apply(&self, lhs: Option<&Value>, rhs: &Value) -> bool {
        let Some(lhs) = lhs else {
            return *self == Operator::Ne;
        };
        match self {
            Operator::Eq => lhs == rhs,
            Operator::Ne => lhs != rhs,
            Operator::Gt => compare(lhs, rhs).is_some_and(|o| o.is_gt()),
            Operator::Gte => compare(lhs, rhs).is_some_and(|o| o.is_ge()),
            Operator::Lt => compare(lhs, rhs).is_some_and(|o| o.is_lt()),
            Operator::Lte => compare(lhs, rhs).is_some_and(|o| o.is_le()),
        }
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// A single test against an array element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    /// Element field to test; `None` tests the element itself.
    pub field: Option<String>,
    pub op: Operator,
    pub operand: Value,
}

impl Condition {
    pub fn matches(&self, element: &Value) -> bool {
        let lhs = match &self.field {
            Some(field) => element.get(field),
            None => Some(element),
        };
        self.op.apply(lhs, &self.operand)
    }
}

/// Array element filter: every condition in `all` must pass, and when `any`
/// is non-empty at least one of its groups must pass as a whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Conditions {
    pub all: Vec<Condition>,
    pub any: Vec<Vec<Condition>>,
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.any.is_empty()
    }

    pub fn matches(&self, element: &Value) -> bool {
        let all = self.all.iter().all(|c| c.matches(element));
        let any = self.any.is_empty()
            || self
                .any
                .iter()
                .any(|group| group.iter().all(|c| c.matches(element)));
        all && any
    }
}

/// Structural variant of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// `properties` in declaration order.
    Object { properties: Vec<(String, SchemaNode)> },
    Array { items: Option<Box<SchemaNode>> },
    Scalar,
    /// Unresolved `$ref`. Only present before resolution.
    Reference { pointer: String },
    /// Self-referential definition kept as an index into
    /// [`ResolvedSchema::recursive`](crate::ResolvedSchema). Only produced by
    /// the resolver when recursion is allowed.
    Recursive { name: String, slot: usize },
}

/// One node of a mapping schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub value_type: ValueType,
    pub kind: NodeKind,
    pub map: Option<MapTarget>,
    pub options: Map<String, Value>,
    /// Names of object properties that strict mode insists on.
    pub required: Vec<String>,
    /// Constant written instead of anything read from the input.
    pub value: Option<Value>,
    pub conditions: Option<Conditions>,
    pub format: Option<String>,
    pub description: Option<String>,
}

impl SchemaNode {
    /// `options.KEY_MAP`, when set.
    pub fn key_map(&self) -> Option<&str> {
        self.options.get(KEY_MAP).and_then(Value::as_str)
    }

    pub fn get_one(&self) -> bool {
        self.options
            .get(GET_ONE)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn join(&self) -> Option<&str> {
        self.options.get(JOIN).and_then(Value::as_str)
    }

    /// `options.PRIORITY`: composite parts preferred over the rest.
    pub fn priority(&self) -> Vec<String> {
        self.options
            .get(PRIORITY)
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Name used to look up a decomposition strategy.
    pub fn semantic_type(&self) -> &str {
        self.format
            .as_deref()
            .unwrap_or_else(|| self.value_type.name())
    }

    /// True if this node or any node below it reads from the input or emits
    /// a constant.
    pub fn has_mapping(&self) -> bool {
        if self.map.is_some() || self.value.is_some() {
            return true;
        }
        match &self.kind {
            NodeKind::Object { properties } => properties.iter().any(|(_, p)| p.has_mapping()),
            NodeKind::Array { items } => items.as_ref().is_some_and(|i| i.has_mapping()),
            NodeKind::Scalar => false,
            NodeKind::Reference { .. } | NodeKind::Recursive { .. } => true,
        }
    }

    /// True if any `$ref` remains in this subtree.
    pub fn contains_references(&self) -> bool {
        match &self.kind {
            NodeKind::Reference { .. } => true,
            NodeKind::Object { properties } => {
                properties.iter().any(|(_, p)| p.contains_references())
            }
            NodeKind::Array { items } => items.as_ref().is_some_and(|i| i.contains_references()),
            NodeKind::Scalar | NodeKind::Recursive { .. } => false,
        }
    }
}

/// A parsed mapping schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    pub id: Option<String>,
    pub title: Option<String>,
    /// The `$schema` dialect URI, if declared.
    pub dialect: Option<String>,
    pub version: u64,
    pub definitions: BTreeMap<String, SchemaNode>,
    pub root: SchemaNode,
}

impl SchemaDocument {
    pub fn definition(&self, name: &str) -> Option<&SchemaNode> {
        self.definitions.get(name)
    }
}

/// Parse mapping schema text.
///
/// # Errors
///
/// Returns `ParseError::InvalidJson` if the text is not JSON, and the errors
/// of [`parse_value`] otherwise.
pub fn parse(raw: &str) -> Result<SchemaDocument, ParseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|source| ParseError::InvalidJson { source })?;
    parse_value(&value)
}

/// Parse an already-deserialized mapping schema.
///
/// The `$version` check runs before anything else so unsupported dialects
/// fail without further work.
///
/// # Errors
///
/// Returns `ParseError::UnsupportedSchemaVersion`, `ParseError::MissingField`
/// when the root lacks `type` (or `properties` for an object root), and
/// `ParseError::InvalidField` for wrongly-typed directives.
pub fn parse_value(schema: &Value) -> Result<SchemaDocument, ParseError> {
    let Value::Object(map) = schema else {
        return Err(invalid("#", format!("expected object, got {}", json_type_name(schema))));
    };

    let version = parse_version(map)?;

    let root_map = merge_all_of(map, "#")?;
    if !root_map.contains_key("type") {
        return Err(ParseError::MissingField {
            path: "#".into(),
            field: "type".into(),
        });
    }
    if root_map.get("type").and_then(Value::as_str) == Some("object")
        && !root_map.contains_key("properties")
    {
        return Err(ParseError::MissingField {
            path: "#".into(),
            field: "properties".into(),
        });
    }

    let mut definitions = BTreeMap::new();
    if let Some(defs) = root_map.get("definitions") {
        let Value::Object(defs) = defs else {
            return Err(invalid(
                "#/definitions",
                format!("expected object, got {}", json_type_name(defs)),
            ));
        };
        for (name, def) in defs {
            let def_path = format!("#/definitions/{}", escape_pointer(name));
            definitions.insert(name.clone(), parse_node(def, &def_path)?);
        }
    }

    let root = parse_node_map(&root_map, "#")?;

    Ok(SchemaDocument {
        id: optional_string(&root_map, "$id", "#")?,
        title: optional_string(&root_map, "title", "#")?,
        dialect: optional_string(&root_map, "$schema", "#")?,
        version,
        definitions,
        root,
    })
}

fn parse_version(map: &Map<String, Value>) -> Result<u64, ParseError> {
    // `schema_version` is the older spelling of `$version`
    let (key, raw) = match (map.get("$version"), map.get("schema_version")) {
        (Some(raw), _) => ("$version", raw),
        (None, Some(raw)) => ("schema_version", raw),
        (None, None) => return Ok(DEFAULT_VERSION),
    };

    match raw.as_u64() {
        Some(v) if SUPPORTED_VERSIONS.contains(&v) => Ok(v),
        _ => Err(ParseError::UnsupportedSchemaVersion {
            path: format!("#/{}", key),
            found: raw.to_string(),
            supported: SUPPORTED_VERSIONS.to_vec(),
        }),
    }
}

fn parse_node(value: &Value, path: &str) -> Result<SchemaNode, ParseError> {
    match value {
        Value::Object(map) => {
            let merged = merge_all_of(map, path)?;
            parse_node_map(&merged, path)
        }
        other => Err(invalid(
            path,
            format!("expected schema object, got {}", json_type_name(other)),
        )),
    }
}

/// Fold `allOf` branches into the node. Branch keys override the node's own
/// keys, and later branches override earlier ones.
fn merge_all_of<'a>(
    map: &'a Map<String, Value>,
    path: &str,
) -> Result<Cow<'a, Map<String, Value>>, ParseError> {
    let Some(all_of) = map.get("allOf") else {
        return Ok(Cow::Borrowed(map));
    };
    let Value::Array(branches) = all_of else {
        return Err(invalid(
            &format!("{}/allOf", path),
            format!("expected array, got {}", json_type_name(all_of)),
        ));
    };

    let mut merged = Map::new();
    for (k, v) in map {
        if k != "allOf" {
            merged.insert(k.clone(), v.clone());
        }
    }
    for (i, branch) in branches.iter().enumerate() {
        let Value::Object(branch) = branch else {
            return Err(invalid(
                &format!("{}/allOf/{}", path, i),
                format!("expected object, got {}", json_type_name(branch)),
            ));
        };
        for (k, v) in branch {
            merged.insert(k.clone(), v.clone());
        }
    }
    Ok(Cow::Owned(merged))
}

fn parse_node_map(map: &Map<String, Value>, path: &str) -> Result<SchemaNode, ParseError> {
    let value_type = match map.get("type") {
        None => ValueType::Object,
        Some(Value::String(s)) => ValueType::parse(s)
            .ok_or_else(|| invalid(&format!("{}/type", path), format!("unknown type \"{}\"", s)))?,
        Some(other) => {
            return Err(invalid(
                &format!("{}/type", path),
                format!("expected string, got {}", json_type_name(other)),
            ))
        }
    };

    let kind = match map.get("$ref") {
        Some(Value::String(pointer)) => NodeKind::Reference {
            pointer: pointer.clone(),
        },
        Some(other) => {
            return Err(invalid(
                &format!("{}/$ref", path),
                format!("expected string, got {}", json_type_name(other)),
            ))
        }
        None => match value_type {
            ValueType::Object => NodeKind::Object {
                properties: parse_properties(map, path)?,
            },
            ValueType::Array => NodeKind::Array {
                items: parse_items(map, path)?,
            },
            ValueType::Scalar(_) => NodeKind::Scalar,
        },
    };

    Ok(SchemaNode {
        value_type,
        kind,
        map: parse_map_target(map, path)?,
        options: parse_options(map, path)?,
        required: parse_required(map, path)?,
        value: map.get("value").cloned(),
        conditions: match map.get("conditions") {
            Some(c) => Some(parse_conditions(c, &format!("{}/conditions", path))?),
            None => None,
        },
        format: optional_string(map, "format", path)?,
        description: optional_string(map, "description", path)?,
    })
}

fn parse_properties(
    map: &Map<String, Value>,
    path: &str,
) -> Result<Vec<(String, SchemaNode)>, ParseError> {
    let Some(props) = map.get("properties") else {
        return Ok(Vec::new());
    };
    let Value::Object(props) = props else {
        return Err(invalid(
            &format!("{}/properties", path),
            format!("expected object, got {}", json_type_name(props)),
        ));
    };

    props
        .iter()
        .map(|(name, prop)| {
            let prop_path = format!("{}/properties/{}", path, escape_pointer(name));
            Ok((name.clone(), parse_node(prop, &prop_path)?))
        })
        .collect()
}

fn parse_items(
    map: &Map<String, Value>,
    path: &str,
) -> Result<Option<Box<SchemaNode>>, ParseError> {
    match map.get("items") {
        None => Ok(None),
        Some(items @ Value::Object(_)) => {
            Ok(Some(Box::new(parse_node(items, &format!("{}/items", path))?)))
        }
        Some(other) => Err(invalid(
            &format!("{}/items", path),
            format!("expected a single schema object, got {}", json_type_name(other)),
        )),
    }
}

fn parse_map_target(map: &Map<String, Value>, path: &str) -> Result<Option<MapTarget>, ParseError> {
    let map_path = format!("{}/map", path);
    match map.get("map") {
        None => Ok(None),
        // An empty map string means "no map", as in older schemas
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(MapTarget::Path(s.clone()))),
        Some(Value::Array(parts)) => {
            if parts.is_empty() {
                return Err(invalid(&map_path, "composite map must not be empty"));
            }
            let parts = parts
                .iter()
                .enumerate()
                .map(|(i, part)| match part {
                    Value::String(s) if !s.is_empty() => Ok(s.clone()),
                    other => Err(invalid(
                        &format!("{}/{}", map_path, i),
                        format!("expected non-empty string, got {}", json_type_name(other)),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(MapTarget::Composite(parts)))
        }
        Some(other) => Err(invalid(
            &map_path,
            format!("expected string or array of strings, got {}", json_type_name(other)),
        )),
    }
}

fn parse_options(map: &Map<String, Value>, path: &str) -> Result<Map<String, Value>, ParseError> {
    let Some(options) = map.get("options") else {
        return Ok(Map::new());
    };
    let options_path = format!("{}/options", path);
    let Value::Object(options) = options else {
        return Err(invalid(
            &options_path,
            format!("expected object, got {}", json_type_name(options)),
        ));
    };

    for (key, value) in options {
        let ok = match key.as_str() {
            KEY_MAP => value.as_str().is_some_and(|s| !s.is_empty()),
            GET_ONE => value.is_boolean(),
            JOIN => value.is_string(),
            PRIORITY => value
                .as_array()
                .is_some_and(|parts| parts.iter().all(|p| p.as_str().is_some_and(|s| !s.is_empty()))),
            other => {
                tracing::debug!(path = %options_path, option = other, "ignoring unknown option");
                true
            }
        };
        if !ok {
            return Err(invalid(
                &format!("{}/{}", options_path, key),
                format!("unexpected {} value", json_type_name(value)),
            ));
        }
    }
    Ok(options.clone())
}

fn parse_required(map: &Map<String, Value>, path: &str) -> Result<Vec<String>, ParseError> {
    match map.get("required") {
        None => Ok(Vec::new()),
        Some(Value::Array(names)) => names
            .iter()
            .map(|n| {
                n.as_str().map(String::from).ok_or_else(|| {
                    invalid(
                        &format!("{}/required", path),
                        format!("expected string entries, got {}", json_type_name(n)),
                    )
                })
            })
            .collect(),
        Some(other) => Err(invalid(
            &format!("{}/required", path),
            format!("expected array, got {}", json_type_name(other)),
        )),
    }
}

fn parse_conditions(value: &Value, path: &str) -> Result<Conditions, ParseError> {
    let Value::Object(map) = value else {
        return Err(invalid(
            path,
            format!("expected object, got {}", json_type_name(value)),
        ));
    };

    let mut conditions = Conditions::default();
    for (key, operand) in map {
        if key == "OR" {
            let Value::Array(groups) = operand else {
                return Err(invalid(
                    &format!("{}/OR", path),
                    format!("expected array, got {}", json_type_name(operand)),
                ));
            };
            for (i, group) in groups.iter().enumerate() {
                let group = parse_conditions(group, &format!("{}/OR/{}", path, i))?;
                // Nested OR inside an OR group is flattened into its own group
                conditions.any.push(group.all);
                conditions.any.extend(group.any);
            }
        } else {
            parse_condition(key, operand, path, &mut conditions.all)?;
        }
    }
    Ok(conditions)
}

fn parse_condition(
    key: &str,
    operand: &Value,
    path: &str,
    out: &mut Vec<Condition>,
) -> Result<(), ParseError> {
    let key_path = format!("{}/{}", path, escape_pointer(key));

    // {"$ne": "x"} tests the element itself
    if key.starts_with('$') {
        let op = Operator::parse(key)
            .ok_or_else(|| invalid(&key_path, format!("unknown operator \"{}\"", key)))?;
        out.push(Condition {
            field: None,
            op,
            operand: operand.clone(),
        });
        return Ok(());
    }

    // {"age": {"$gt": 2, "$lt": 4}} applies every operator to the field
    if let Value::Object(ops) = operand {
        if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) {
            for (op_key, op_operand) in ops {
                let op = Operator::parse(op_key).ok_or_else(|| {
                    invalid(
                        &format!("{}/{}", key_path, op_key),
                        format!("unknown operator \"{}\"", op_key),
                    )
                })?;
                out.push(Condition {
                    field: Some(key.to_string()),
                    op,
                    operand: op_operand.clone(),
                });
            }
            return Ok(());
        }
    }

    out.push(Condition {
        field: Some(key.to_string()),
        op: Operator::Eq,
        operand: operand.clone(),
    });
    Ok(())
}

fn optional_string(
    map: &Map<String, Value>,
    key: &str,
    path: &str,
) -> Result<Option<String>, ParseError> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(
            &format!("{}/{}", path, key),
            format!("expected string, got {}", json_type_name(other)),
        )),
    }
}

fn invalid(path: &str, message: impl Into<String>) -> ParseError {
    ParseError::InvalidField {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Escape a key for use inside a JSON Pointer (`~` → `~0`, `/` → `~1`).
pub(crate) fn escape_pointer(key: &str) -> Cow<'_, str> {
    if key.contains(['~', '/']) {
        Cow::Owned(key.replace('~', "~0").replace('/', "~1"))
    } else {
        Cow::Borrowed(key)
    }
}
