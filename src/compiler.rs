//! Mapping compiler - turns a resolved schema into executable rules.

use serde::Serialize;
use serde_json::Value;

use crate::error::{CompileError, Error};
use crate::path::SourcePath;
use crate::resolver::{resolve, ResolvedSchema};
use crate::schema::{
    escape_pointer, parse, parse_value, Conditions, MapTarget, NodeKind, SchemaDocument,
    SchemaNode,
};
use crate::types::{ResolveOptions, ValueType, KEY_MAP};

/// Where a rule takes its value from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Path(SourcePath),
    /// Parts combined into one value. `whole` is the field a single
    /// undivided scalar is read from when none of the parts are present.
    /// If any part listed in `priority` is present, only those parts are used.
    Composite {
        parts: Vec<SourcePath>,
        #[serde(skip_serializing_if = "Option::is_none")]
        whole: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        priority: Vec<String>,
    },
    /// The current subject itself (array elements, unmapped structural nodes).
    Inherit,
    Constant(Value),
}

/// What a rule does with the value it reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Coerce and copy.
    Scalar,
    /// Build an object from nested rules read against the value.
    Object { rules: Vec<MappingRule> },
    /// Map each element through `item`.
    Array {
        #[serde(skip_serializing_if = "Option::is_none")]
        item: Option<Box<MappingRule>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        conditions: Option<Conditions>,
        get_one: bool,
    },
    /// Turn each key of an input object into one element, storing the key
    /// under `key_field` and filling the rest through `value`.
    KeyedObject {
        key_field: String,
        value: Box<MappingRule>,
    },
    /// Apply the recursive definition stored at `slot`.
    Recursive { slot: usize },
}

/// A compiled mapping instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingRule {
    /// Location of the originating node in the schema (`#/properties/...`).
    pub schema_path: String,
    pub source: Source,
    /// Output path relative to the enclosing object; empty for array elements.
    pub target: Vec<String>,
    pub value_type: ValueType,
    pub required: bool,
    /// Key for decomposition strategies (the node's `format` or `type`).
    pub semantic_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
    #[serde(flatten)]
    pub kind: RuleKind,
}

/// An immutable, shareable rule set ready for [`crate::transform`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    version: u64,
    rules: Vec<MappingRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recursive: Vec<MappingRule>,
}

impl CompiledSchema {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Top-level rules in schema property order.
    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    /// Element rule for a recursive definition slot.
    pub fn recursive_rule(&self, slot: usize) -> Option<&MappingRule> {
        self.recursive.get(slot)
    }
}

/// Compile a resolved schema.
///
/// # Errors
///
/// Returns `CompileError::MissingMapTarget` for object or array nodes that
/// neither map nor contain anything mapped, `CompileError::AmbiguousKeyMap`
/// when a `KEY_MAP` node has no value schema, and
/// `CompileError::KeyMapRequiresObject` when it is not an object.
pub fn compile(resolved: &ResolvedSchema) -> Result<CompiledSchema, CompileError> {
    let rules = compile_root(&resolved.root)?;

    let recursive = resolved
        .recursive
        .iter()
        .map(|def| {
            let def_path = format!("#/definitions/{}", escape_pointer(&def.name));
            compile_element(&table_entry(&def.node), &def_path)
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(
        id = resolved.id.as_deref().unwrap_or("-"),
        rules = rules.len(),
        recursive = recursive.len(),
        "compiled mapping schema"
    );

    Ok(CompiledSchema {
        id: resolved.id.clone(),
        version: resolved.version,
        rules,
        recursive,
    })
}

/// Resolve and compile a parsed schema.
pub fn compile_document(
    doc: &SchemaDocument,
    options: &ResolveOptions,
) -> Result<CompiledSchema, Error> {
    let resolved = resolve(doc, options)?;
    Ok(compile(&resolved)?)
}

/// Parse, resolve and compile schema text.
pub fn compile_str(raw: &str, options: &ResolveOptions) -> Result<CompiledSchema, Error> {
    compile_document(&parse(raw)?, options)
}

/// Parse, resolve and compile a deserialized schema.
pub fn compile_value(schema: &Value, options: &ResolveOptions) -> Result<CompiledSchema, Error> {
    compile_document(&parse_value(schema)?, options)
}

// --- Internal implementation ---

/// The body of a recursive definition. The marker that points at it already
/// carries the definition's `map` and `KEY_MAP`, so they must not be applied
/// a second time here.
fn table_entry(node: &SchemaNode) -> SchemaNode {
    let mut entry = node.clone();
    entry.map = None;
    entry.options.remove(KEY_MAP);
    entry
}

fn compile_root(root: &SchemaNode) -> Result<Vec<MappingRule>, CompileError> {
    match &root.kind {
        // An unmapped object root is the output document itself
        NodeKind::Object { properties } if root.map.is_none() && root.key_map().is_none() => {
            compile_properties(properties, &root.required, &[], "#")
        }
        _ => Ok(vec![compile_element(root, "#")?]),
    }
}

fn compile_properties(
    properties: &[(String, SchemaNode)],
    required: &[String],
    prefix: &[String],
    path: &str,
) -> Result<Vec<MappingRule>, CompileError> {
    let mut rules = Vec::new();
    for (name, node) in properties {
        let prop_path = format!("{}/properties/{}", path, escape_pointer(name));
        let is_required = required.contains(name);
        rules.extend(compile_field(name, node, prefix, is_required, &prop_path)?);
    }
    Ok(rules)
}

/// Compile an object property. Structural (unmapped) objects are flattened
/// into their children with the property name prefixed onto their targets.
fn compile_field(
    name: &str,
    node: &SchemaNode,
    prefix: &[String],
    required: bool,
    path: &str,
) -> Result<Vec<MappingRule>, CompileError> {
    let mut target = prefix.to_vec();
    target.push(name.to_string());

    let unmapped = node.map.is_none() && node.value.is_none() && node.key_map().is_none();
    if unmapped {
        match &node.kind {
            NodeKind::Scalar => {
                tracing::debug!(path, "skipping scalar without map");
                return Ok(Vec::new());
            }
            NodeKind::Object { properties } => {
                if !node.has_mapping() {
                    return Err(CompileError::MissingMapTarget {
                        path: path.to_string(),
                        kind: "object",
                    });
                }
                return compile_properties(properties, &node.required, &target, path);
            }
            NodeKind::Array { items } => {
                // Without a map the array is read from the subject itself,
                // which only makes sense if its items pick something out
                if !items.as_ref().is_some_and(|i| i.has_mapping()) {
                    return Err(CompileError::MissingMapTarget {
                        path: path.to_string(),
                        kind: "array",
                    });
                }
            }
            // Reading the same subject again would recurse forever
            NodeKind::Recursive { name, .. } => {
                return Err(CompileError::NonAdvancingRecursion {
                    path: path.to_string(),
                    definition: name.clone(),
                });
            }
            NodeKind::Reference { .. } => {}
        }
    }

    let source = source_for(node, Some(name));
    Ok(vec![compile_rule(node, path, target, required, source)?])
}

/// Compile a node that produces one value per subject: array items, recursive
/// definitions, and mapped roots.
fn compile_element(node: &SchemaNode, path: &str) -> Result<MappingRule, CompileError> {
    if let NodeKind::Object { properties } = &node.kind {
        if !properties.is_empty() && !node.has_mapping() {
            return Err(CompileError::MissingMapTarget {
                path: path.to_string(),
                kind: "object",
            });
        }
    }
    let source = source_for(node, None);
    compile_rule(node, path, Vec::new(), false, source)
}

fn source_for(node: &SchemaNode, field: Option<&str>) -> Source {
    if let Some(value) = &node.value {
        return Source::Constant(value.clone());
    }
    match &node.map {
        None => Source::Inherit,
        Some(MapTarget::Path(p)) => Source::Path(SourcePath::parse(p)),
        Some(MapTarget::Composite(parts)) => Source::Composite {
            parts: parts.iter().map(|p| SourcePath::parse(p)).collect(),
            whole: field.map(String::from),
            priority: node.priority(),
        },
    }
}

fn compile_rule(
    node: &SchemaNode,
    path: &str,
    target: Vec<String>,
    required: bool,
    source: Source,
) -> Result<MappingRule, CompileError> {
    let kind = if matches!(source, Source::Constant(_)) {
        RuleKind::Scalar
    } else if let Some(key_field) = node.key_map() {
        compile_key_map(node, key_field, path)?
    } else {
        match &node.kind {
            NodeKind::Scalar => RuleKind::Scalar,
            // No shape given: copy the object through
            NodeKind::Object { properties } if properties.is_empty() => RuleKind::Scalar,
            NodeKind::Object { properties } => RuleKind::Object {
                rules: compile_properties(properties, &node.required, &[], path)?,
            },
            NodeKind::Array { items } => RuleKind::Array {
                item: match items {
                    Some(items) => Some(Box::new(compile_element(
                        items,
                        &format!("{}/items", path),
                    )?)),
                    None => None,
                },
                conditions: node.conditions.clone().filter(|c| !c.is_empty()),
                get_one: node.get_one(),
            },
            NodeKind::Recursive { slot, .. } => RuleKind::Recursive { slot: *slot },
            NodeKind::Reference { pointer } => {
                return Err(CompileError::UnresolvedReference {
                    path: path.to_string(),
                    reference: pointer.clone(),
                })
            }
        }
    };

    Ok(MappingRule {
        schema_path: path.to_string(),
        source,
        target,
        value_type: node.value_type,
        required,
        semantic_type: node.semantic_type().to_string(),
        join: node.join().map(String::from),
        kind,
    })
}

fn compile_key_map(
    node: &SchemaNode,
    key_field: &str,
    path: &str,
) -> Result<RuleKind, CompileError> {
    if node.value_type != ValueType::Object {
        return Err(CompileError::KeyMapRequiresObject {
            path: path.to_string(),
            actual: node.value_type.name().to_string(),
        });
    }

    let value_kind = match &node.kind {
        NodeKind::Object { properties } if !properties.is_empty() => RuleKind::Object {
            rules: compile_properties(properties, &node.required, &[], path)?,
        },
        NodeKind::Recursive { slot, .. } => RuleKind::Recursive { slot: *slot },
        _ => {
            return Err(CompileError::AmbiguousKeyMap {
                path: path.to_string(),
            })
        }
    };

    Ok(RuleKind::KeyedObject {
        key_field: key_field.to_string(),
        value: Box::new(MappingRule {
            schema_path: path.to_string(),
            source: Source::Inherit,
            target: Vec::new(),
            value_type: ValueType::Object,
            required: false,
            semantic_type: node.semantic_type().to_string(),
            join: None,
            kind: value_kind,
        }),
    })
}
