//! The tabular cell store the mapping engine reads from and writes to.
//!
//! [`Sheet`] is the narrow capability the engine needs from a physical
//! spreadsheet: positional cell access, cell writing and column sizing.
//! [`MemorySheet`] is the in-memory implementation, with CSV import and
//! export for the command-line front end.

use std::{
    collections::BTreeMap,
    io::{Read, Write},
};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use crate::value::{datetime_to_serial, format_number, serial_to_datetime};

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Boolean(bool),
    Text(String),
    /// A formula with its last computed result, if any. Formulas are never
    /// evaluated here.
    Formula {
        expression: String,
        cached: Option<Box<CellValue>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    /// Display/data format pattern, e.g. `0.00` or `yyyy-mm-dd`.
    pub format: Option<String>,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            format: None,
        }
    }

    pub fn number(value: f64) -> Self {
        Self::new(CellValue::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(CellValue::Boolean(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(CellValue::Text(value.into()))
    }

    pub fn date(value: &NaiveDateTime, format: &str) -> Self {
        Self::number(datetime_to_serial(value)).with_format(format)
    }

    pub fn formula(expression: impl Into<String>, cached: Option<CellValue>) -> Self {
        Self::new(CellValue::Formula {
            expression: expression.into(),
            cached: cached.map(Box::new),
        })
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Re-reads the cell as text. Numbers use the general format and ignore
    /// any display format; formulas yield their cached result.
    pub fn text_value(&self) -> String {
        value_text(&self.value)
    }

    /// Text suitable for export: date-formatted numbers become timestamps.
    pub fn display_text(&self) -> String {
        if let CellValue::Number(serial) = self.value
            && self
                .format
                .as_deref()
                .is_some_and(crate::classify::is_date_format)
            && let Some(dt) = serial_to_datetime(serial)
        {
            return dt.format("%Y-%m-%d %H:%M:%S").to_string();
        }
        self.text_value()
    }
}

fn value_text(value: &CellValue) -> String {
    match value {
        CellValue::Number(n) => format_number(*n),
        CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        CellValue::Text(s) => s.clone(),
        CellValue::Formula { cached, .. } => cached.as_deref().map(value_text).unwrap_or_default(),
    }
}

pub trait Sheet {
    /// Number of rows, counting up to the last row that holds any cell.
    fn row_count(&self) -> usize;

    /// Number of cell positions in `row`, up to its last present cell.
    fn row_width(&self, row: usize) -> usize;

    /// Cell at a zero-based position; `None` means blank.
    fn cell(&self, row: usize, column: usize) -> Option<&Cell>;

    fn set_cell(&mut self, row: usize, column: usize, cell: Cell);

    fn clear_cell(&mut self, row: usize, column: usize);

    /// Fits the width of `column` to its content.
    fn autosize_column(&mut self, column: usize);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySheet {
    name: String,
    rows: Vec<Vec<Option<Cell>>>,
    column_widths: BTreeMap<usize, usize>,
}

impl MemorySheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builds a sheet from rows of optional cells.
    pub fn from_rows<I, R>(name: impl Into<String>, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = Option<Cell>>,
    {
        let mut sheet = Self::new(name);
        for row in rows {
            sheet.push_row(row);
        }
        sheet
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push_row<R>(&mut self, row: R)
    where
        R: IntoIterator<Item = Option<Cell>>,
    {
        let mut cells = row.into_iter().collect::<Vec<_>>();
        trim_trailing_blanks(&mut cells);
        self.rows.push(cells);
    }

    pub fn column_width(&self, column: usize) -> Option<usize> {
        self.column_widths.get(&column).copied()
    }

    /// Textual rendering of one row, blank cells as empty strings.
    pub fn row_text(&self, row: usize) -> Vec<String> {
        (0..self.row_width(row))
            .map(|column| {
                self.cell(row, column)
                    .map(Cell::display_text)
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Imports CSV text. Every record becomes a row of text cells; empty
    /// fields become blank cells. Typed columns parse the text on read.
    pub fn from_csv_reader<R: Read>(name: impl Into<String>, reader: R, delimiter: u8) -> Result<Self> {
        let mut csv_reader = crate::io_utils::open_csv_reader(reader, delimiter);
        let mut sheet = Self::new(name);
        for (idx, record) in csv_reader.records().enumerate() {
            let record = record.with_context(|| format!("Reading CSV row {}", idx + 1))?;
            sheet.push_row(record.iter().map(text_cell));
        }
        Ok(sheet)
    }

    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut csv_writer = crate::io_utils::open_csv_writer(writer, delimiter);
        let width = (0..self.row_count())
            .map(|row| self.row_width(row))
            .max()
            .unwrap_or(0);
        for row in 0..self.row_count() {
            let mut fields = self.row_text(row);
            fields.resize(width, String::new());
            csv_writer
                .write_record(&fields)
                .with_context(|| format!("Writing CSV row {}", row + 1))?;
        }
        csv_writer.flush().context("Flushing CSV output")?;
        Ok(())
    }
}

fn trim_trailing_blanks(cells: &mut Vec<Option<Cell>>) {
    while matches!(cells.last(), Some(None)) {
        cells.pop();
    }
}

fn text_cell(field: &str) -> Option<Cell> {
    (!field.is_empty()).then(|| Cell::text(field))
}

impl Sheet for MemorySheet {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn row_width(&self, row: usize) -> usize {
        self.rows.get(row).map_or(0, Vec::len)
    }

    fn cell(&self, row: usize, column: usize) -> Option<&Cell> {
        self.rows.get(row)?.get(column)?.as_ref()
    }

    fn set_cell(&mut self, row: usize, column: usize, cell: Cell) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= column {
            cells.resize_with(column + 1, || None);
        }
        cells[column] = Some(cell);
    }

    fn clear_cell(&mut self, row: usize, column: usize) {
        if let Some(cells) = self.rows.get_mut(row) {
            if let Some(slot) = cells.get_mut(column) {
                *slot = None;
            }
            trim_trailing_blanks(cells);
        }
    }

    fn autosize_column(&mut self, column: usize) {
        let width = (0..self.rows.len())
            .filter_map(|row| self.cell(row, column))
            .map(|cell| cell.display_text().chars().count())
            .max()
            .unwrap_or(0);
        self.column_widths.insert(column, width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_value_uses_general_number_format() {
        assert_eq!(Cell::number(12.0).text_value(), "12");
        assert_eq!(Cell::number(12.5).with_format("0.00").text_value(), "12.5");
        assert_eq!(Cell::boolean(true).text_value(), "TRUE");
        assert_eq!(
            Cell::formula("A1*2", Some(CellValue::Number(4.0))).text_value(),
            "4"
        );
        assert_eq!(Cell::formula("A1*2", None).text_value(), "");
    }

    #[test]
    fn set_cell_grows_rows_and_columns() {
        let mut sheet = MemorySheet::new("data");
        sheet.set_cell(2, 3, Cell::text("x"));
        assert_eq!(sheet.row_count(), 3);
        assert_eq!(sheet.row_width(0), 0);
        assert_eq!(sheet.row_width(2), 4);
        assert!(sheet.cell(2, 2).is_none());
        assert_eq!(sheet.cell(2, 3), Some(&Cell::text("x")));

        sheet.clear_cell(2, 3);
        assert_eq!(sheet.row_width(2), 0);
    }

    #[test]
    fn empty_text_is_distinct_from_blank() {
        let sheet = MemorySheet::from_rows("s", [vec![Some(Cell::text("")), None]]);
        assert_eq!(sheet.row_width(0), 1);
        assert_eq!(sheet.cell(0, 0), Some(&Cell::text("")));
        assert!(sheet.cell(0, 1).is_none());
    }

    #[test]
    fn csv_import_keeps_fields_as_text() {
        let csv = "Id,Name,Active,Joined,Score\n007,Ann,true,2024-05-06,\n";
        let sheet = MemorySheet::from_csv_reader("people", csv.as_bytes(), b',').unwrap();
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(sheet.cell(1, 0), Some(&Cell::text("007")));
        assert_eq!(sheet.cell(1, 1), Some(&Cell::text("Ann")));
        assert_eq!(sheet.cell(1, 2), Some(&Cell::text("true")));
        assert_eq!(sheet.cell(1, 3), Some(&Cell::text("2024-05-06")));
        assert!(sheet.cell(1, 4).is_none());
    }

    #[test]
    fn csv_export_then_import_preserves_text() {
        let mut sheet = MemorySheet::new("codes");
        sheet.set_cell(0, 0, Cell::text("007"));
        sheet.set_cell(0, 1, Cell::text("2024-05-06"));
        sheet.set_cell(0, 2, Cell::text("01234"));
        let mut buffer = Vec::new();
        sheet.write_csv(&mut buffer, b',').unwrap();
        let imported = MemorySheet::from_csv_reader("codes", buffer.as_slice(), b',').unwrap();
        assert_eq!(imported.row_text(0), vec!["007", "2024-05-06", "01234"]);
        assert_eq!(imported.cell(0, 0), Some(&Cell::text("007")));
    }

    #[test]
    fn csv_export_pads_short_rows() {
        let mut sheet = MemorySheet::new("out");
        sheet.set_cell(0, 0, Cell::text("A"));
        sheet.set_cell(0, 1, Cell::text("B"));
        sheet.set_cell(1, 0, Cell::number(2.0));
        let mut buffer = Vec::new();
        sheet.write_csv(&mut buffer, b',').unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "A,B\n2,\n");
    }

    #[test]
    fn autosize_measures_widest_cell() {
        let mut sheet = MemorySheet::from_rows(
            "s",
            [vec![Some(Cell::text("Name"))], vec![Some(Cell::text("Alexandra"))]],
        );
        sheet.autosize_column(0);
        assert_eq!(sheet.column_width(0), Some(9));
        assert_eq!(sheet.column_width(1), None);
    }
}
