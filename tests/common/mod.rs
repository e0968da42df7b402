#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use sheet_mapper::record::{FieldTable, OverflowMap, Record};
use sheet_mapper::schema::{ColumnSpec, OverflowSpec, RecordSchema};
use sheet_mapper::sheet::{Cell, MemorySheet, Sheet};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// Builds a sheet from CSV text with inferred cell kinds.
pub fn sheet_from_csv(csv: &str) -> MemorySheet {
    MemorySheet::from_csv_reader("test", csv.as_bytes(), b',').expect("parse csv sheet")
}

/// Text of every row, blank cells as empty strings.
pub fn sheet_text<S: Sheet>(sheet: &S) -> Vec<Vec<String>> {
    (0..sheet.row_count())
        .map(|row| {
            (0..sheet.row_width(row))
                .map(|column| {
                    sheet
                        .cell(row, column)
                        .map(Cell::display_text)
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect()
}

/// Record with a declared column for every scalar kind and an overflow
/// field that ignores `Legacy`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Employee {
    pub id: i32,
    pub name: Option<String>,
    pub salary: Option<f64>,
    pub active: bool,
    pub joined: Option<NaiveDateTime>,
    pub code: Option<String>,
    pub extra: Option<OverflowMap>,
}

impl Record for Employee {
    fn schema() -> RecordSchema {
        RecordSchema::new()
            .column(ColumnSpec::new("id").named("Id"))
            .column(ColumnSpec::new("name").named("Name"))
            .column(ColumnSpec::new("salary").named("Salary").data_format("0.00"))
            .column(ColumnSpec::new("active").named("Active"))
            .column(ColumnSpec::new("joined").named("Joined"))
            .column(ColumnSpec::new("code").named("Code").force_string())
            .overflow(OverflowSpec::new("extra").ignore(["Legacy"]))
    }

    fn fields() -> FieldTable<Self> {
        FieldTable::new()
            .field("id", |e: &Employee| &e.id, |e: &mut Employee| &mut e.id)
            .field("name", |e: &Employee| &e.name, |e: &mut Employee| &mut e.name)
            .field("salary", |e: &Employee| &e.salary, |e: &mut Employee| &mut e.salary)
            .field("active", |e: &Employee| &e.active, |e: &mut Employee| &mut e.active)
            .field("joined", |e: &Employee| &e.joined, |e: &mut Employee| &mut e.joined)
            .field("code", |e: &Employee| &e.code, |e: &mut Employee| &mut e.code)
            .overflow("extra", |e: &Employee| &e.extra, |e: &mut Employee| &mut e.extra)
    }
}

/// Record without an overflow field, covering the remaining scalar kinds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measurement {
    pub station: String,
    pub initial: Option<char>,
    pub level: i16,
    pub samples: i64,
    pub ratio: f32,
    pub reading: f64,
    pub valid: bool,
    pub taken: Option<NaiveDateTime>,
}

impl Record for Measurement {
    fn schema() -> RecordSchema {
        RecordSchema::new()
            .column(ColumnSpec::new("station").named("Station"))
            .column(ColumnSpec::new("initial").named("Initial"))
            .column(ColumnSpec::new("level").named("Level"))
            .column(ColumnSpec::new("samples").named("Samples"))
            .column(ColumnSpec::new("ratio").named("Ratio"))
            .column(ColumnSpec::new("reading").named("Reading"))
            .column(ColumnSpec::new("valid").named("Valid"))
            .column(ColumnSpec::new("taken").named("Taken").data_format("yyyy-mm-dd hh:mm:ss"))
    }

    fn fields() -> FieldTable<Self> {
        FieldTable::new()
            .field("station", |m: &Measurement| &m.station, |m: &mut Measurement| &mut m.station)
            .field("initial", |m: &Measurement| &m.initial, |m: &mut Measurement| &mut m.initial)
            .field("level", |m: &Measurement| &m.level, |m: &mut Measurement| &mut m.level)
            .field("samples", |m: &Measurement| &m.samples, |m: &mut Measurement| &mut m.samples)
            .field("ratio", |m: &Measurement| &m.ratio, |m: &mut Measurement| &mut m.ratio)
            .field("reading", |m: &Measurement| &m.reading, |m: &mut Measurement| &mut m.reading)
            .field("valid", |m: &Measurement| &m.valid, |m: &mut Measurement| &mut m.valid)
            .field("taken", |m: &Measurement| &m.taken, |m: &mut Measurement| &mut m.taken)
    }
}
