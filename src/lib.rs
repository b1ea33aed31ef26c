//! JSON mapping schemas
//!
//! Compiles annotated JSON Schemas into mapping rules and applies them to
//! input documents.
//!
//! Each property of a mapping schema names an output field; its `map` names
//! where in the input the value comes from. A schema is parsed, its `$ref`
//! pointers are expanded, and the result is compiled once into an immutable
//! [`CompiledSchema`] that can transform any number of documents.
//!
//! # Example
//!
//! ```
//! use jsonmap::{compile_value, transform, ResolveOptions, TransformOptions};
//! use serde_json::json;
//!
//! let schema = json!({
//!     "$id": "company",
//!     "$version": 2,
//!     "type": "object",
//!     "properties": {
//!         "name": { "type": "string", "map": "company_name" },
//!         "employees": {
//!             "type": "object",
//!             "map": "employees",
//!             "options": { "KEY_MAP": "role" },
//!             "$ref": "#/definitions/employee"
//!         }
//!     },
//!     "definitions": {
//!         "employee": {
//!             "type": "object",
//!             "properties": {
//!                 "age": { "type": "int", "map": "age" }
//!             }
//!         }
//!     }
//! });
//!
//! let compiled = compile_value(&schema, &ResolveOptions::new()).unwrap();
//! let input = json!({
//!     "company_name": "Acme",
//!     "employees": { "ceo": { "age": "40" } }
//! });
//!
//! let output = transform(&compiled, &input, &TransformOptions::new()).unwrap();
//! assert_eq!(
//!     output,
//!     json!({ "name": "Acme", "employees": [{ "role": "ceo", "age": 40 }] })
//! );
//! ```
//!
//! # Mapping Directives
//!
//! | Directive | Effect |
//! |-----------|--------|
//! | `map: "a.b"` | Read the value at `a.b` (`$root.` restarts at the document root) |
//! | `map: ["first", "last"]` | Gather several fields, or decompose one undivided value |
//! | `options.KEY_MAP` | Turn each key of an input object into one output element |
//! | `options.GET_ONE` | Keep only the first matching array element |
//! | `options.JOIN` | Join composite parts into a string |
//! | `options.PRIORITY` | Use only the listed composite parts when any of them is present |
//! | `value` | Emit a constant |
//! | `conditions` | Filter array elements |
//!
//! # Stages
//!
//! [`parse`] → [`resolve`] → [`compile`] → [`transform`]. [`compile_str`] and
//! [`compile_value`] run the first three; [`SchemaCache`] compiles each
//! `$id`/`$version` pair once.

mod cache;
mod compiler;
mod decompose;
mod error;
mod executor;
mod loader;
mod path;
mod resolver;
mod schema;
mod types;

pub use cache::{CacheKey, SchemaCache};
pub use compiler::{
    compile, compile_document, compile_str, compile_value, CompiledSchema, MappingRule, RuleKind,
    Source,
};
pub use decompose::{whitespace_split, DecomposeFn, Decomposers};
pub use error::{CompileError, Error, ParseError, ResolutionError, TransformError};
pub use executor::transform;
pub use loader::{load_document, load_document_auto, load_schema, load_schema_str, load_stdin};
pub use path::{Segment, SourcePath};
pub use resolver::{resolve, RecursiveDefinition, ResolvedSchema};
pub use schema::{
    parse, parse_value, Condition, Conditions, MapTarget, NodeKind, Operator, SchemaDocument,
    SchemaNode,
};
pub use types::{
    ErrorMode, KeyMapOutput, ResolveOptions, ScalarType, Strictness, TransformOptions, ValueType,
    DEFAULT_VERSION, SUPPORTED_VERSIONS,
};
