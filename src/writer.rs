//! Row encoding: records into sheet rows.

use std::collections::BTreeMap;

use log::debug;

use crate::{
    classify::{is_boolean, is_date, is_numeric},
    column::{Column, ColumnSet},
    error::{MappingError, Result},
    extract::{ColumnsExtractor, Extraction},
    record::{Record, RecordType},
    sheet::{Cell, Sheet},
    value::{Value, ValueType, parse_bool_token, parse_naive_datetime},
};

/// Display format of date columns that declare none.
pub const DEFAULT_DATE_FORMAT: &str = "ddd mmm dd hh:mm:ss yyy";

/// Builds the cell for `value` as a column of `value_type`.
pub(crate) fn write_to_cell(value: &Value, value_type: ValueType, format: Option<&str>) -> Result<Cell> {
    let cell = if is_date(value_type) {
        let date = match value {
            Value::Date(dt) => Some(*dt),
            Value::String(text) => parse_naive_datetime(text),
            _ => None,
        }
        .ok_or_else(|| MappingError::conversion("", format!("'{value}' is not a date")))?;
        Cell::date(&date, format.unwrap_or(DEFAULT_DATE_FORMAT))
    } else if is_boolean(value_type) {
        let flag = match value {
            Value::Boolean(b) => Some(*b),
            other => parse_bool_token(&other.as_display()),
        }
        .ok_or_else(|| MappingError::conversion("", format!("'{value}' is not a boolean")))?;
        Cell::boolean(flag)
    } else if is_numeric(value_type) {
        let number = value
            .as_f64()
            .ok_or_else(|| MappingError::conversion("", format!("'{value}' is not a number")))?;
        Cell::number(number)
    } else {
        Cell::text(value.as_display())
    };
    Ok(match format {
        Some(format) if !is_date(value_type) => cell.with_format(format),
        _ => cell,
    })
}

/// Type a converter's output is written as: the column's declared type when
/// the value fits it as-is, otherwise the value's own type.
fn converted_type(value: &Value, declared: ValueType) -> ValueType {
    let fits = if is_date(declared) {
        matches!(value, Value::Date(_))
    } else if is_boolean(declared) {
        matches!(value, Value::Boolean(_))
    } else if is_numeric(declared) {
        value.as_f64().is_some()
    } else {
        true
    };
    if fits { declared } else { value.value_type() }
}

pub struct SheetWriter<'s, S: Sheet + ?Sized, R> {
    sheet: &'s mut S,
    extraction: Extraction<R>,
    generate_header: bool,
}

impl<'s, S: Sheet + ?Sized, R: 'static> SheetWriter<'s, S, R> {
    pub fn new(sheet: &'s mut S, record_type: RecordType<R>) -> Result<Self> {
        let extraction = ColumnsExtractor::extract(&record_type)?;
        Ok(Self {
            sheet,
            extraction,
            generate_header: true,
        })
    }

    pub fn for_record(sheet: &'s mut S) -> Result<Self>
    where
        R: Record,
    {
        Self::new(sheet, RecordType::of())
    }

    /// Header generation is on by default.
    pub fn generate_header_row(&mut self, enabled: bool) -> &mut Self {
        self.generate_header = enabled;
        self
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.extraction.columns
    }

    /// Writes the header (if enabled) at the first row and one row per
    /// record after it.
    pub fn write(&mut self, records: &[R]) -> Result<()> {
        let columns = self.write_columns(records)?;
        let mut row = 0;

        if self.generate_header {
            for (position, column) in columns.iter().enumerate() {
                self.sheet.set_cell(row, position, Cell::text(column.name.clone()));
            }
            row += 1;
        }

        for record in records {
            for (position, column) in columns.iter().enumerate() {
                match self.cell_for(record, column)? {
                    Some(cell) => self.sheet.set_cell(row, position, cell),
                    None => self.sheet.clear_cell(row, position),
                }
            }
            row += 1;
        }

        if self.generate_header {
            for position in 0..columns.len() {
                self.sheet.autosize_column(position);
            }
        }

        debug!(
            "Wrote {} record(s) across {} column(s), header {}",
            records.len(),
            columns.len(),
            if self.generate_header { "on" } else { "off" }
        );
        Ok(())
    }

    /// Declared columns followed by one column per overflow key seen in
    /// `records`, keys in sorted order.
    fn write_columns(&self, records: &[R]) -> Result<ColumnSet> {
        let mut columns = self.extraction.columns.clone();
        let Some(overflow) = &self.extraction.overflow else {
            return Ok(columns);
        };
        let accessor = self.extraction.fields.require(&overflow.column.field_name)?;

        let mut discovered = BTreeMap::<String, ValueType>::new();
        for record in records {
            let Some(map) = accessor.map(record)? else {
                continue;
            };
            for (key, value) in map {
                if columns.contains(key) {
                    continue;
                }
                discovered
                    .entry(key.clone())
                    .or_insert_with(|| value.value_type());
            }
        }

        for (key, value_type) in discovered {
            let mut column = Column::new(key, overflow.column.field_name.clone(), value_type);
            column.overflow = true;
            column.converter = overflow.column.converter.clone();
            columns.insert(column);
        }
        if columns.len() > self.extraction.columns.len() {
            debug!(
                "Discovered {} overflow column(s)",
                columns.len() - self.extraction.columns.len()
            );
        }
        Ok(columns)
    }

    fn resolve(&self, record: &R, column: &Column) -> Result<Option<Value>> {
        let accessor = self.extraction.fields.require(&column.field_name)?;
        if column.overflow {
            Ok(accessor
                .map(record)?
                .and_then(|map| map.get(&column.name).cloned()))
        } else {
            accessor.get(record)
        }
    }

    fn cell_for(&self, record: &R, column: &Column) -> Result<Option<Cell>> {
        let Some(value) = self.resolve(record, column)? else {
            return Ok(None);
        };
        let (value, value_type) = match &column.converter {
            Some(converter) => {
                let serialized = converter
                    .serialize(value)
                    .map_err(|err| MappingError::converter_failed(&column.name, err))?;
                let value_type = converted_type(&serialized, column.value_type);
                (serialized, value_type)
            }
            None => (value, column.value_type),
        };
        write_to_cell(&value, value_type, column.data_format.as_deref())
            .map(Some)
            .map_err(|err| err.in_column(&column.name))
    }
}
