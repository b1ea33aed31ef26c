//! Reference resolution - expands `$ref` pointers against `definitions`.

use std::collections::HashMap;

use crate::error::ResolutionError;
use crate::schema::{escape_pointer, NodeKind, SchemaDocument, SchemaNode};
use crate::types::ResolveOptions;

const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// A schema with every `$ref` expanded.
///
/// When recursion is allowed, self-referential definitions appear in the tree
/// as [`NodeKind::Recursive`] markers whose `slot` indexes `recursive`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    pub id: Option<String>,
    pub title: Option<String>,
    pub version: u64,
    pub root: SchemaNode,
    pub recursive: Vec<RecursiveDefinition>,
}

/// A definition reached through a reference cycle, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct RecursiveDefinition {
    pub name: String,
    pub node: SchemaNode,
}

/// Resolve every `$ref` in a parsed schema.
///
/// Each reference is replaced by a resolved copy of its definition. The
/// referencing node's `map`, `options`, `value`, `conditions`, `format` and
/// `description` are laid over the copy; the definition supplies the type
/// and the `properties`/`items` structure.
///
/// # Errors
///
/// Returns `ResolutionError::UnsupportedReference` for pointers outside
/// `#/definitions/`, `ResolutionError::UnknownDefinition` for names not in
/// `definitions` (checked for unused definitions too), and
/// `ResolutionError::CyclicReference` when a definition reaches itself and
/// `options.allow_recursion` is false.
pub fn resolve(
    doc: &SchemaDocument,
    options: &ResolveOptions,
) -> Result<ResolvedSchema, ResolutionError> {
    // Broken refs in definitions are errors even if nothing references them
    for (name, def) in &doc.definitions {
        let def_path = format!("{}{}", DEFINITIONS_PREFIX, escape_pointer(name));
        check_references(doc, def, &def_path)?;
    }

    let mut resolver = Resolver {
        doc,
        options,
        stack: Vec::new(),
        slots: HashMap::new(),
        table: Vec::new(),
        pending: Vec::new(),
    };

    let root = resolver.resolve_node(&doc.root, "#")?;

    // Fill the recursion table. Resolving one entry may discover more cycles.
    while let Some(name) = resolver.pending.pop() {
        let Some(def) = doc.definition(&name) else {
            continue;
        };
        let def_path = format!("{}{}", DEFINITIONS_PREFIX, escape_pointer(&name));
        resolver.stack = vec![name.clone()];
        let node = resolver.resolve_node(def, &def_path)?;
        let slot = resolver.slots[&name];
        resolver.table[slot] = Some(RecursiveDefinition { name, node });
    }

    Ok(ResolvedSchema {
        id: doc.id.clone(),
        title: doc.title.clone(),
        version: doc.version,
        root,
        recursive: resolver.table.into_iter().flatten().collect(),
    })
}

struct Resolver<'a> {
    doc: &'a SchemaDocument,
    options: &'a ResolveOptions,
    /// Definition names being expanded on the current path.
    stack: Vec<String>,
    slots: HashMap<String, usize>,
    table: Vec<Option<RecursiveDefinition>>,
    pending: Vec<String>,
}

impl Resolver<'_> {
    fn resolve_node(&mut self, node: &SchemaNode, path: &str) -> Result<SchemaNode, ResolutionError> {
        match &node.kind {
            NodeKind::Reference { pointer } => self.resolve_reference(node, pointer, path),
            NodeKind::Object { properties } => {
                let mut resolved = Vec::with_capacity(properties.len());
                for (name, prop) in properties {
                    let prop_path = format!("{}/properties/{}", path, escape_pointer(name));
                    resolved.push((name.clone(), self.resolve_node(prop, &prop_path)?));
                }
                Ok(SchemaNode {
                    kind: NodeKind::Object {
                        properties: resolved,
                    },
                    ..node.clone_shallow()
                })
            }
            NodeKind::Array { items } => {
                let items = match items {
                    Some(items) => Some(Box::new(
                        self.resolve_node(items, &format!("{}/items", path))?,
                    )),
                    None => None,
                };
                Ok(SchemaNode {
                    kind: NodeKind::Array { items },
                    ..node.clone_shallow()
                })
            }
            NodeKind::Scalar | NodeKind::Recursive { .. } => Ok(node.clone()),
        }
    }

    fn resolve_reference(
        &mut self,
        node: &SchemaNode,
        pointer: &str,
        path: &str,
    ) -> Result<SchemaNode, ResolutionError> {
        let doc = self.doc;
        let name = definition_name(pointer, path)?;
        let def = doc
            .definition(&name)
            .ok_or_else(|| ResolutionError::UnknownDefinition {
                path: path.to_string(),
                name: name.clone(),
            })?;

        if let Some(pos) = self.stack.iter().position(|n| *n == name) {
            if !self.options.allow_recursion {
                let mut chain = self.stack[pos..].to_vec();
                chain.push(name);
                return Err(ResolutionError::CyclicReference {
                    path: path.to_string(),
                    chain,
                });
            }
            let slot = self.slot_for(&name);
            let marker = SchemaNode {
                kind: NodeKind::Recursive { name, slot },
                ..def.clone_shallow()
            };
            return Ok(overlay(node, marker));
        }

        tracing::trace!(path, definition = %name, "expanding reference");
        let def_path = format!("{}{}", DEFINITIONS_PREFIX, escape_pointer(&name));
        self.stack.push(name);
        let expanded = self.resolve_node(def, &def_path);
        self.stack.pop();
        Ok(overlay(node, expanded?))
    }

    fn slot_for(&mut self, name: &str) -> usize {
        if let Some(slot) = self.slots.get(name) {
            return *slot;
        }
        let slot = self.table.len();
        self.table.push(None);
        self.slots.insert(name.to_string(), slot);
        self.pending.push(name.to_string());
        slot
    }
}

impl SchemaNode {
    /// Copy of the node's own attributes with a placeholder kind, used with
    /// struct update syntax when rebuilding children.
    fn clone_shallow(&self) -> SchemaNode {
        SchemaNode {
            value_type: self.value_type,
            kind: NodeKind::Scalar,
            map: self.map.clone(),
            options: self.options.clone(),
            required: self.required.clone(),
            value: self.value.clone(),
            conditions: self.conditions.clone(),
            format: self.format.clone(),
            description: self.description.clone(),
        }
    }
}

/// Lay the referencing node's contextual attributes over a resolved definition.
fn overlay(referencing: &SchemaNode, mut resolved: SchemaNode) -> SchemaNode {
    if referencing.map.is_some() {
        resolved.map = referencing.map.clone();
    }
    for (key, value) in &referencing.options {
        resolved.options.insert(key.clone(), value.clone());
    }
    if referencing.value.is_some() {
        resolved.value = referencing.value.clone();
    }
    if referencing.conditions.is_some() {
        resolved.conditions = referencing.conditions.clone();
    }
    if referencing.format.is_some() {
        resolved.format = referencing.format.clone();
    }
    if referencing.description.is_some() {
        resolved.description = referencing.description.clone();
    }
    resolved
}

/// Extract the definition name from a `#/definitions/<name>` pointer.
fn definition_name(pointer: &str, path: &str) -> Result<String, ResolutionError> {
    let unsupported = || ResolutionError::UnsupportedReference {
        path: path.to_string(),
        reference: pointer.to_string(),
    };

    let raw = pointer.strip_prefix(DEFINITIONS_PREFIX).ok_or_else(unsupported)?;
    if raw.is_empty() || raw.contains('/') {
        return Err(unsupported());
    }
    // Unescape JSON Pointer encoding (~1 = /, ~0 = ~)
    Ok(raw.replace("~1", "/").replace("~0", "~"))
}

fn check_references(
    doc: &SchemaDocument,
    node: &SchemaNode,
    path: &str,
) -> Result<(), ResolutionError> {
    match &node.kind {
        NodeKind::Reference { pointer } => {
            let name = definition_name(pointer, path)?;
            if doc.definition(&name).is_none() {
                return Err(ResolutionError::UnknownDefinition {
                    path: path.to_string(),
                    name,
                });
            }
            Ok(())
        }
        NodeKind::Object { properties } => {
            for (name, prop) in properties {
                let prop_path = format!("{}/properties/{}", path, escape_pointer(name));
                check_references(doc, prop, &prop_path)?;
            }
            Ok(())
        }
        NodeKind::Array { items: Some(items) } => {
            check_references(doc, items, &format!("{}/items", path))
        }
        _ => Ok(()),
    }
}
