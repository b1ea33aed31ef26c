//! Document loading from files, strings and standard input.

use std::io::Read;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, ParseError};
use crate::schema::{parse_value, SchemaDocument};

/// Path argument that stands for standard input.
pub const STDIN: &str = "-";

/// Load a JSON document from a file path.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the file doesn't exist, `Error::ReadError`
/// if it can't be read, or `Error::InvalidDocument` if it isn't valid JSON.
pub fn load_document(path: &Path) -> Result<Value, Error> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| Error::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| Error::InvalidDocument {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a JSON document from standard input.
pub fn load_stdin() -> Result<Value, Error> {
    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .map_err(|source| Error::ReadError {
            path: STDIN.into(),
            source,
        })?;

    serde_json::from_str(&content).map_err(|source| Error::InvalidDocument {
        path: STDIN.into(),
        source,
    })
}

/// Load from `-` (standard input) or a file path.
pub fn load_document_auto(source: &str) -> Result<Value, Error> {
    if source == STDIN {
        load_stdin()
    } else {
        load_document(Path::new(source))
    }
}

/// Load and parse a mapping schema file.
///
/// # Errors
///
/// I/O errors as for [`load_document`], or `Error::Parse` if the document is
/// not a valid mapping schema.
pub fn load_schema(path: &Path) -> Result<SchemaDocument, Error> {
    let value = load_document(path)?;
    tracing::debug!(path = %path.display(), "loaded schema document");
    Ok(parse_value(&value)?)
}

/// Parse a mapping schema from a JSON string.
pub fn load_schema_str(content: &str) -> Result<SchemaDocument, ParseError> {
    crate::schema::parse(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_document_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"company_name": "Acme"}}"#).unwrap();

        let doc = load_document(file.path()).unwrap();
        assert_eq!(doc["company_name"], "Acme");
    }

    #[test]
    fn load_document_file_not_found() {
        let result = load_document(Path::new("/nonexistent/input.json"));
        let err = result.unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn load_document_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{ not json").unwrap();

        let err = load_document(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidDocument { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn load_schema_parses() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"$id": "employees", "type": "object", "properties": {{"name": {{"type": "string", "map": "company_name"}}}}}}"#
        )
        .unwrap();

        let doc = load_schema(file.path()).unwrap();
        assert_eq!(doc.id.as_deref(), Some("employees"));
    }

    #[test]
    fn load_schema_rejects_bad_schema() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"properties": {{}}}}"#).unwrap();

        let err = load_schema(file.path()).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::MissingField { .. })));
    }

    #[test]
    fn load_schema_str_invalid() {
        let result = load_schema_str("not json");
        assert!(matches!(result, Err(ParseError::InvalidJson { .. })));
    }

    #[test]
    fn load_document_auto_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[1, 2]").unwrap();

        let doc = load_document_auto(file.path().to_str().unwrap()).unwrap();
        assert_eq!(doc, serde_json::json!([1, 2]));
    }
}
