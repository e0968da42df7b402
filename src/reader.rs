//! Row decoding: sheet rows into records.
//!
//! The first row is the header. Every later row that is not blank becomes one
//! record: each header position is routed either to the declared column of
//! that name or, failing that, into the record's overflow map.

use log::{debug, warn};

use crate::{
    classify::{CellKind, is_numeric_cell, reads_numeric_as_text},
    column::{Column, ColumnSet},
    error::{MappingError, Result},
    extract::{ColumnsExtractor, Extraction, OverflowColumn},
    record::{Record, RecordType},
    sheet::{Cell, CellValue, Sheet},
    value::{Value, ValueType, parse_bool_token, parse_naive_datetime, serial_to_datetime},
};

/// Inspects each decoded record and decides whether it is kept.
pub trait RowPostProcessor<R> {
    fn process(&mut self, record: &R) -> bool;
}

impl<R, F> RowPostProcessor<R> for F
where
    F: FnMut(&R) -> bool,
{
    fn process(&mut self, record: &R) -> bool {
        self(record)
    }
}

fn decode_value(value: &CellValue) -> Option<Value> {
    match value {
        CellValue::Boolean(b) => Some(Value::Boolean(*b)),
        CellValue::Number(n) => Some(Value::Double(*n)),
        CellValue::Text(s) => Some(Value::String(s.clone())),
        CellValue::Formula { cached, .. } => cached.as_deref().and_then(decode_value),
    }
}

/// Raw value of a cell. Numbers read for a string-typed target are re-read
/// as text; display formats are ignored either way.
pub(crate) fn read_cell_value(cell: Option<&Cell>, target: Option<ValueType>) -> Option<Value> {
    let cell = cell?;
    let value = decode_value(&cell.value)?;
    if is_numeric_cell(CellKind::of(Some(cell)))
        && matches!(value, Value::Double(_))
        && reads_numeric_as_text(target)
    {
        return Some(Value::String(cell.text_value()));
    }
    Some(value)
}

pub(crate) fn is_blank_row<S: Sheet + ?Sized>(sheet: &S, row: usize) -> bool {
    (0..sheet.row_width(row)).all(|column| {
        read_cell_value(sheet.cell(row, column), None)
            .is_none_or(|value| value.as_display().is_empty())
    })
}

fn parse_number(text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| MappingError::conversion("", format!("'{text}' is not a number")))
}

/// Default coercion of a raw cell value to a field's declared type.
pub fn convert_to_field_type(raw: Value, field_type: ValueType) -> Result<Value> {
    if raw.value_type() == field_type {
        return Ok(raw);
    }
    let text = raw.as_display();
    let converted = match field_type {
        ValueType::Double => Value::Double(parse_number(&text)?),
        ValueType::Float => Value::Float(parse_number(&text)? as f32),
        ValueType::Integer => Value::Integer(parse_number(&text)? as i32),
        ValueType::Short => Value::Short(parse_number(&text)? as i16),
        ValueType::Long => Value::Long(parse_number(&text)? as i64),
        ValueType::Char => Value::Char(text.chars().next().ok_or_else(|| {
            MappingError::conversion("", "an empty value cannot be read as a character")
        })?),
        ValueType::Boolean => Value::Boolean(parse_bool_token(&text).ok_or_else(|| {
            MappingError::conversion("", format!("'{text}' is not a boolean"))
        })?),
        ValueType::Date => {
            let parsed = match &raw {
                Value::Double(serial) => serial_to_datetime(*serial),
                _ => match text.trim().parse::<f64>() {
                    Ok(serial) => serial_to_datetime(serial),
                    Err(_) => parse_naive_datetime(&text),
                },
            };
            Value::Date(parsed.ok_or_else(|| {
                MappingError::conversion("", format!("'{text}' is not a date"))
            })?)
        }
        ValueType::String => Value::String(text),
    };
    Ok(converted)
}

pub struct SheetReader<'s, S: Sheet + ?Sized, R> {
    sheet: &'s S,
    record_type: RecordType<R>,
    extraction: Extraction<R>,
    post_processors: Vec<Box<dyn RowPostProcessor<R> + 's>>,
    header: Vec<String>,
}

impl<'s, S: Sheet + ?Sized, R: 'static> SheetReader<'s, S, R> {
    /// Resolves the record type's columns. Schema errors surface here,
    /// before any row is read.
    pub fn new(sheet: &'s S, record_type: RecordType<R>) -> Result<Self> {
        let extraction = ColumnsExtractor::extract(&record_type)?;
        Ok(Self {
            sheet,
            record_type,
            extraction,
            post_processors: Vec::new(),
            header: Vec::new(),
        })
    }

    pub fn for_record(sheet: &'s S) -> Result<Self>
    where
        R: Record,
    {
        Self::new(sheet, RecordType::of())
    }

    /// Registers a post-processor; they run in registration order and the
    /// first veto drops the record.
    pub fn add_post_processor<P>(&mut self, processor: P)
    where
        P: RowPostProcessor<R> + 's,
    {
        self.post_processors.push(Box::new(processor));
    }

    pub fn clear_post_processors(&mut self) {
        self.post_processors.clear();
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.extraction.columns
    }

    pub fn extraction(&self) -> &Extraction<R> {
        &self.extraction
    }

    /// Header of the most recent [`SheetReader::read`].
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn read(&mut self) -> Result<Vec<R>> {
        let header = self.read_header()?;
        let mut records = Vec::new();
        let mut skipped = 0usize;
        let mut vetoed = 0usize;

        for row in 1..self.sheet.row_count() {
            if is_blank_row(self.sheet, row) {
                skipped += 1;
                continue;
            }
            let record = self
                .read_row(&header, row)
                .map_err(|err| at_row(err, row))?;
            if self.keep(&record) {
                records.push(record);
            } else {
                vetoed += 1;
            }
        }

        debug!(
            "Decoded {} record(s); skipped {} blank row(s), {} vetoed",
            records.len(),
            skipped,
            vetoed
        );
        self.header = header.into_iter().flatten().collect();
        Ok(records)
    }

    /// Header names by position. Blank header cells and repeated names
    /// leave their position unmapped.
    fn read_header(&self) -> Result<Vec<Option<String>>> {
        if self.sheet.row_count() == 0 || self.sheet.row_width(0) == 0 {
            return Err(MappingError::Structural(
                "First row in sheet is empty. First row must contain header".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        let header = (0..self.sheet.row_width(0))
            .map(|column| {
                let name = self
                    .sheet
                    .cell(0, column)
                    .map(Cell::text_value)
                    .filter(|name| !name.is_empty())?;
                if seen.insert(name.clone()) {
                    Some(name)
                } else {
                    warn!("Ignoring repeated header '{name}' at position {}", column + 1);
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!("Read header with {} column(s)", header.len());
        Ok(header)
    }

    fn read_row(&self, header: &[Option<String>], row: usize) -> Result<R> {
        let mut record = self.record_type.instantiate();
        for (position, name) in header.iter().enumerate() {
            let Some(name) = name else {
                continue;
            };
            let cell = self.sheet.cell(row, position);
            match self.extraction.columns.get(name) {
                Some(column) => self.write_to_field(&mut record, column, cell)?,
                None => {
                    if let Some(overflow) = &self.extraction.overflow
                        && !overflow.ignores(name)
                    {
                        self.write_to_overflow(&mut record, overflow, name, cell)?;
                    }
                }
            }
        }
        Ok(record)
    }

    fn write_to_field(&self, record: &mut R, column: &Column, cell: Option<&Cell>) -> Result<()> {
        let accessor = self.extraction.fields.require(&column.field_name)?;
        let Some(raw) = read_cell_value(cell, Some(column.value_type)) else {
            return Ok(());
        };
        let value = match &column.converter {
            Some(converter) => converter
                .deserialize(raw)
                .map_err(|err| MappingError::converter_failed(&column.name, err))?,
            None => {
                let field_type = accessor.value_type().ok_or_else(|| {
                    MappingError::access(accessor.name(), "field does not hold a single value")
                })?;
                convert_to_field_type(raw, field_type).map_err(|err| err.in_column(&column.name))?
            }
        };
        accessor
            .set(record, value)
            .map_err(|err| err.in_column(&column.name))
    }

    fn write_to_overflow(
        &self,
        record: &mut R,
        overflow: &OverflowColumn,
        name: &str,
        cell: Option<&Cell>,
    ) -> Result<()> {
        let Some(mut value) = read_cell_value(cell, None) else {
            return Ok(());
        };
        if let Some(converter) = &overflow.column.converter {
            value = converter
                .deserialize(value)
                .map_err(|err| MappingError::converter_failed(name, err))?;
        }
        let accessor = self.extraction.fields.require(&overflow.column.field_name)?;
        accessor.map_entry(record)?.insert(name.to_string(), value);
        Ok(())
    }

    fn keep(&mut self, record: &R) -> bool {
        self.post_processors
            .iter_mut()
            .all(|processor| processor.process(record))
    }
}

fn at_row(err: MappingError, row: usize) -> MappingError {
    match err {
        MappingError::Conversion {
            column,
            message,
            source,
        } => MappingError::Conversion {
            column,
            message: format!("{message} (row {})", row + 1),
            source,
        },
        MappingError::Access { field, message } => MappingError::Access {
            field,
            message: format!("{message} (row {})", row + 1),
        },
        other => other,
    }
}
