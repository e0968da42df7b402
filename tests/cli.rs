mod common;

use std::fs;

use assert_cmd::Command;
use common::{TestWorkspace, fixture_path};
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;

fn bin() -> Command {
    Command::cargo_bin("sheet-mapper").expect("binary exists")
}

#[test]
fn columns_lists_resolved_columns() {
    let schema = fixture_path("people.yaml");
    bin()
        .args(["columns", "--schema", schema.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Joined"))
        .stdout(contains("yyyy-mm-dd"))
        .stdout(contains("trim"))
        .stdout(contains("(other columns, ignoring 1)"));
}

#[test]
fn read_decodes_csv_into_json() {
    let workspace = TestWorkspace::new();
    let output = workspace.path().join("people.json");
    bin()
        .args([
            "read",
            "--schema",
            fixture_path("people.yaml").to_str().unwrap(),
            "--input",
            fixture_path("people.csv").to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    let contents = fs::read_to_string(&output).expect("read output");
    let records: Vec<serde_json::Value> = serde_json::from_str(&contents).expect("parse json");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["name"], "Ann");
    assert_eq!(records[0]["extra"]["City"], "Berlin");
    assert!(records[1].get("extra").is_none());
}

#[test]
fn read_applies_filter_expressions() {
    bin()
        .args([
            "read",
            "--schema",
            fixture_path("people.yaml").to_str().unwrap(),
            "--input",
            fixture_path("people.csv").to_str().unwrap(),
            "--filter-expr",
            "active",
            "--filter-expr",
            "id >= 3",
        ])
        .assert()
        .success()
        .stdout(contains("\"Cy\""))
        .stdout(contains("\"Ann\"").not());
}

#[test]
fn write_encodes_json_records_as_csv() {
    let workspace = TestWorkspace::new();
    let output = workspace.path().join("people.csv");
    bin()
        .args([
            "write",
            "--schema",
            fixture_path("people.yaml").to_str().unwrap(),
            "--input",
            fixture_path("people.json").to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();
    let contents = fs::read_to_string(&output).expect("read output");
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some("Id,Name,Active,Joined,City"));
    assert_eq!(lines.next(), Some("1,Ann,TRUE,2024-01-15 00:00:00,Berlin"));
}

#[test]
fn write_without_header_reads_from_stdin() {
    let payload = r#"[{"id": 8, "name": "Eve", "active": true}]"#;
    bin()
        .args([
            "write",
            "--schema",
            fixture_path("people.yaml").to_str().unwrap(),
            "--input",
            "-",
            "--no-header",
            "--delimiter",
            ";",
        ])
        .write_stdin(payload)
        .assert()
        .success()
        .stdout("8;Eve;TRUE\n");
}

#[test]
fn schema_errors_fail_with_context() {
    let workspace = TestWorkspace::new();
    let schema = workspace.write(
        "dup.yaml",
        "columns:\n  - field: id\n    name: Id\n    datatype: int\n  - field: name\n    name: Id\n    datatype: string\n",
    );
    bin()
        .args([
            "read",
            "--schema",
            schema.to_str().unwrap(),
            "--input",
            fixture_path("people.csv").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("error:"))
        .stderr(contains("declared more than once"));
}

#[test]
fn conversion_errors_name_the_column() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("bad.csv", "Id,Name\nseven,Ann\n");
    bin()
        .args([
            "read",
            "--schema",
            fixture_path("people.yaml").to_str().unwrap(),
            "--input",
            input.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(contains("column 'Id'"));
}
