//! Core types shared by the resolver, compiler and executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::decompose::Decomposers;

/// Schema dialect versions this engine implements.
pub const SUPPORTED_VERSIONS: &[u64] = &[2];

/// Version assumed when a schema declares none.
pub const DEFAULT_VERSION: u64 = 2;

/// Option key naming the element field that receives each dynamic object key.
pub const KEY_MAP: &str = "KEY_MAP";

/// Option key that reduces an array to its first element.
pub const GET_ONE: &str = "GET_ONE";

/// Option key holding the separator for joining composite targets into a string.
pub const JOIN: &str = "JOIN";

/// Option key listing composite parts that, when present, replace all others.
pub const PRIORITY: &str = "PRIORITY";

/// Path segment that restarts a lookup at the top-level input document.
pub const ROOT_SEGMENT: &str = "$root";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Scalar value types a schema node may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Int,
    Float,
    Number,
    Boolean,
    Date,
}

impl ScalarType {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Int => "int",
            ScalarType::Float => "float",
            ScalarType::Number => "number",
            ScalarType::Boolean => "boolean",
            ScalarType::Date => "date",
        }
    }
}

/// The declared `type` of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Object,
    Array,
    #[serde(untagged)]
    Scalar(ScalarType),
}

impl ValueType {
    /// Parse a `type` keyword value.
    ///
    /// Returns `None` for unknown names (caller should error).
    /// `integer` is accepted as the JSON Schema spelling of `int`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(ValueType::Object),
            "array" => Some(ValueType::Array),
            "string" => Some(ValueType::Scalar(ScalarType::String)),
            "int" | "integer" => Some(ValueType::Scalar(ScalarType::Int)),
            "float" => Some(ValueType::Scalar(ScalarType::Float)),
            "number" => Some(ValueType::Scalar(ScalarType::Number)),
            "boolean" => Some(ValueType::Scalar(ScalarType::Boolean)),
            "date" => Some(ValueType::Scalar(ScalarType::Date)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Object => "object",
            ValueType::Array => "array",
            ValueType::Scalar(s) => s.name(),
        }
    }
}

/// Options for reference resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// When true, a definition that references itself (directly or through
    /// other definitions) is kept as a lazy marker into an indexed table
    /// instead of failing with `CyclicReference`.
    pub allow_recursion: bool,
}

impl ResolveOptions {
    /// Create resolve options with recursion disabled (default).
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow self-referential definitions.
    pub fn allow_recursion(mut self, allow: bool) -> Self {
        self.allow_recursion = allow;
        self
    }
}

/// How missing fields and failed coercions are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Skip missing fields, coerce on a best-effort basis.
    #[default]
    Lenient,
    /// Fail on missing required fields and failed coercions.
    Strict,
}

/// Whether the executor stops at the first error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    #[default]
    FailFast,
    /// Skip failing fields and report every error at the end.
    CollectAll,
}

/// Output shape of `KEY_MAP` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyMapOutput {
    /// One array element per input key, the key stored under the key field.
    #[default]
    Elements,
    /// An object keyed by the input key; each value still carries the key field.
    Keyed,
}

/// Options for document transformation.
#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    pub strictness: Strictness,
    pub error_mode: ErrorMode,
    pub key_map_output: KeyMapOutput,
    pub decomposers: Decomposers,
}

impl TransformOptions {
    /// Create lenient, fail-fast options with no decomposers registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set strict mode (fail on missing required fields and bad coercions).
    pub fn strict(mut self, strict: bool) -> Self {
        self.strictness = if strict {
            Strictness::Strict
        } else {
            Strictness::Lenient
        };
        self
    }

    pub fn error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    pub fn key_map_output(mut self, output: KeyMapOutput) -> Self {
        self.key_map_output = output;
        self
    }

    pub fn decomposers(mut self, decomposers: Decomposers) -> Self {
        self.decomposers = decomposers;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strictness == Strictness::Strict
    }
}
