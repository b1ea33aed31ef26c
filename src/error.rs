//! Error types for mapping schema parsing, resolution, compilation and transformation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while turning schema text into a [`SchemaDocument`](crate::SchemaDocument).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported schema version {found} at {path} (supported: {})", join_versions(supported))]
    UnsupportedSchemaVersion {
        path: String,
        found: String,
        supported: Vec<u64>,
    },

    #[error("missing required field \"{field}\" at {path}")]
    MissingField { path: String, field: String },

    #[error("invalid field at {path}: {message}")]
    InvalidField { path: String, message: String },
}

fn join_versions(versions: &[u64]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors while expanding `$ref` pointers against `definitions`.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("cyclic reference at {path}: {}", chain.join(" -> "))]
    CyclicReference { path: String, chain: Vec<String> },

    #[error("unsupported reference \"{reference}\" at {path}: only #/definitions/<name> is allowed")]
    UnsupportedReference { path: String, reference: String },

    #[error("unknown definition \"{name}\" referenced at {path}")]
    UnknownDefinition { path: String, name: String },
}

/// Errors while compiling a resolved schema into mapping rules.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{kind} node at {path} has no map target and no mapped children")]
    MissingMapTarget { path: String, kind: &'static str },

    #[error("KEY_MAP at {path} has no value schema (expected a $ref to an object definition)")]
    AmbiguousKeyMap { path: String },

    #[error("KEY_MAP at {path} requires type object, got {actual}")]
    KeyMapRequiresObject { path: String, actual: String },

    #[error("unresolved reference \"{reference}\" at {path}")]
    UnresolvedReference { path: String, reference: String },

    #[error("recursive reference to \"{definition}\" at {path} has no map and would never advance into the input")]
    NonAdvancingRecursion { path: String, definition: String },
}

/// Errors while applying compiled rules to an input document.
///
/// Every variant names the schema location of the failing rule and the
/// input location it was reading from.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    #[error("missing required field {source_path} (schema {schema_path})")]
    MissingRequiredField {
        schema_path: String,
        source_path: String,
    },

    #[error("type mismatch at {source_path} (schema {schema_path}): expected {expected}, got {actual}")]
    TypeMismatch {
        schema_path: String,
        source_path: String,
        expected: String,
        actual: String,
    },

    #[error("no decomposer registered for \"{semantic_type}\" at {source_path} (schema {schema_path})")]
    NoDecomposer {
        schema_path: String,
        source_path: String,
        semantic_type: String,
    },

    #[error("decomposer for \"{semantic_type}\" at {source_path} (schema {schema_path}) did not produce {expected} parts")]
    DecompositionFailed {
        schema_path: String,
        source_path: String,
        semantic_type: String,
        expected: usize,
    },

    #[error("recursive rule at {schema_path} re-entered at {source_path} without advancing")]
    RecursionLoop {
        schema_path: String,
        source_path: String,
    },

    #[error("transformation failed with {} error(s)", errors.len())]
    Multiple { errors: Vec<TransformError> },
}

impl TransformError {
    /// Flatten into the list of individual field errors.
    pub fn into_errors(self) -> Vec<TransformError> {
        match self {
            TransformError::Multiple { errors } => errors,
            other => vec![other],
        }
    }
}

/// Any error the crate can produce, including loader I/O.
#[derive(Debug, Error)]
pub enum Error {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    InvalidDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // Schema errors (exit code 2)
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    // Document errors (exit code 1)
    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl Error {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::FileNotFound { .. } | Error::ReadError { .. } => 3,
            Error::Transform(_) => 1,
            _ => 2,
        }
    }
}
