//! CLI integration tests for the jsonmap binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("jsonmap"))
}

// Helper to create a temp file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const COMPANY_SCHEMA: &str = r##"{
    "$id": "company",
    "$version": 2,
    "type": "object",
    "required": ["name"],
    "properties": {
        "name": { "type": "string", "map": "company_name" },
        "employees": {
            "type": "object",
            "map": "employees",
            "options": { "KEY_MAP": "role" },
            "$ref": "#/definitions/employee"
        }
    },
    "definitions": {
        "employee": {
            "type": "object",
            "properties": {
                "name": { "type": "string", "format": "full-name", "map": ["firstname", "lastname"] },
                "age": { "type": "int", "map": "age" }
            }
        }
    }
}"##;

mod transform_command {
    use super::*;

    #[test]
    fn basic_transform() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);
        let input = write_temp_file(
            &dir,
            "input.json",
            r#"{"company_name": "Acme", "employees": {"ceo": {"age": 40}}}"#,
        );

        cmd()
            .args(["transform", schema.to_str().unwrap(), input.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#"{"name":"Acme","employees":[{"role":"ceo","age":40}]}"#,
            ));
    }

    #[test]
    fn transform_from_stdin() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);

        cmd()
            .args(["transform", schema.to_str().unwrap(), "-"])
            .write_stdin(r#"{"company_name": "Acme"}"#)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"name":"Acme"}"#));
    }

    #[test]
    fn transform_keyed() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);
        let input = write_temp_file(
            &dir,
            "input.json",
            r#"{"company_name": "Acme", "employees": {"ceo": {"age": 40}}}"#,
        );

        cmd()
            .args([
                "transform",
                schema.to_str().unwrap(),
                input.to_str().unwrap(),
                "--keyed",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#""employees":{"ceo":{"role":"ceo","age":40}}"#,
            ));
    }

    #[test]
    fn transform_decomposes_full_names() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);
        let input = write_temp_file(
            &dir,
            "input.json",
            r#"{"company_name": "Acme", "employees": {"ceo": {"name": "Jane Doe"}}}"#,
        );

        cmd()
            .args(["transform", schema.to_str().unwrap(), input.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                r#""name":{"firstname":"Jane","lastname":"Doe"}"#,
            ));
    }

    #[test]
    fn transform_registers_decomposer_flag() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"type": "object", "properties": {
                "name": { "type": "string", "map": ["first", "last"] }
            }}"#,
        );
        let input = write_temp_file(&dir, "input.json", r#"{"name": "Jane Doe"}"#);

        cmd()
            .args(["transform", schema.to_str().unwrap(), input.to_str().unwrap()])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("no decomposer registered"));

        cmd()
            .args([
                "transform",
                schema.to_str().unwrap(),
                input.to_str().unwrap(),
                "--decompose",
                "string",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#"{"first":"Jane","last":"Doe"}"#));
    }

    #[test]
    fn transform_to_output_file() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);
        let input = write_temp_file(&dir, "input.json", r#"{"company_name": "Acme"}"#);
        let output = dir.path().join("out.json");

        cmd()
            .args([
                "transform",
                schema.to_str().unwrap(),
                input.to_str().unwrap(),
                "--output",
                output.to_str().unwrap(),
                "--pretty",
            ])
            .assert()
            .success();

        let content = fs::read_to_string(&output).unwrap();
        assert!(content.contains("\"name\": \"Acme\""));
    }

    #[test]
    fn strict_missing_required_exits_1() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);
        let input = write_temp_file(&dir, "input.json", r#"{}"#);

        cmd()
            .args([
                "transform",
                schema.to_str().unwrap(),
                input.to_str().unwrap(),
                "--strict",
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("missing required field /company_name"));
    }

    #[test]
    fn lenient_missing_required_succeeds() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);
        let input = write_temp_file(&dir, "input.json", r#"{}"#);

        cmd()
            .args(["transform", schema.to_str().unwrap(), input.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("{}"));
    }

    #[test]
    fn collect_errors_lists_every_failure() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"type": "object", "required": ["a", "b"], "properties": {
                "a": { "type": "string", "map": "a" },
                "b": { "type": "int", "map": "b" }
            }}"#,
        );
        let input = write_temp_file(&dir, "input.json", r#"{"b": "x"}"#);

        cmd()
            .args([
                "transform",
                schema.to_str().unwrap(),
                input.to_str().unwrap(),
                "--strict",
                "--collect-errors",
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("2 errors"))
            .stderr(predicate::str::contains("missing required field /a"))
            .stderr(predicate::str::contains("type mismatch at /b"));
    }

    #[test]
    fn invalid_input_json_exits_2() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);
        let input = write_temp_file(&dir, "input.json", "{ nope");

        cmd()
            .args(["transform", schema.to_str().unwrap(), input.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("invalid JSON"));
    }

    #[test]
    fn missing_input_exits_3() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);

        cmd()
            .args(["transform", schema.to_str().unwrap(), "/nonexistent/input.json"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("file not found"));
    }
}

mod compile_command {
    use super::*;

    #[test]
    fn prints_rules() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(&dir, "schema.json", COMPANY_SCHEMA);

        cmd()
            .args(["compile", schema.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""kind":"keyed_object""#))
            .stdout(predicate::str::contains(r#""key_field":"role""#));
    }

    #[test]
    fn recursion_needs_flag() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r##"{"type": "object",
                "properties": { "tree": { "map": "root", "$ref": "#/definitions/node" } },
                "definitions": { "node": { "type": "object", "properties": {
                    "label": { "type": "string", "map": "name" },
                    "children": { "type": "array", "map": "kids", "items": { "$ref": "#/definitions/node" } }
                } } }
            }"##,
        );

        cmd()
            .args(["compile", schema.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("cyclic reference"));

        cmd()
            .args(["compile", schema.to_str().unwrap(), "--allow-recursion"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""kind":"recursive""#));
    }

    #[test]
    fn unsupported_version_exits_2() {
        let dir = TempDir::new().unwrap();
        let schema = write_temp_file(
            &dir,
            "schema.json",
            r#"{"$version": 9, "type": "object", "properties": {}}"#,
        );

        cmd()
            .args(["compile", schema.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("unsupported schema version 9"));
    }
}

mod check_command {
    use super::*;

    #[test]
    fn all_valid() {
        let dir = TempDir::new().unwrap();
        let a = write_temp_file(&dir, "a.json", COMPANY_SCHEMA);
        let b = write_temp_file(
            &dir,
            "b.json",
            r#"{"type": "object", "properties": {"x": {"type": "string", "map": "y"}}}"#,
        );

        cmd()
            .args(["check", a.to_str().unwrap(), b.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("ok:").count(2));
    }

    #[test]
    fn reports_broken_schema() {
        let dir = TempDir::new().unwrap();
        let good = write_temp_file(&dir, "good.json", COMPANY_SCHEMA);
        let bad = write_temp_file(
            &dir,
            "bad.json",
            r##"{"type": "object", "properties": {"x": {"$ref": "#/definitions/ghost"}}}"##,
        );

        cmd()
            .args(["check", good.to_str().unwrap(), bad.to_str().unwrap()])
            .assert()
            .code(2)
            .stdout(predicate::str::contains("ok:"))
            .stderr(predicate::str::contains("unknown definition \"ghost\""));
    }

    #[test]
    fn missing_file_exits_3() {
        cmd()
            .args(["check", "/nonexistent/schema.json"])
            .assert()
            .code(3);
    }

    #[test]
    fn requires_a_path() {
        cmd().arg("check").assert().failure();
    }
}
