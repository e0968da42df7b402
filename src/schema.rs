//! Schema descriptions handed to the column extractor.
//!
//! A [`RecordSchema`] says which record fields are bound to columns, under
//! which header names, with which formatting and converters, in which order,
//! and which field (if any) absorbs undeclared columns.

use std::collections::BTreeSet;

use crate::converter::ConverterRef;

#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub field: String,
    /// Header name; defaults to the field identifier.
    pub header: Option<String>,
    /// Treat the column as text regardless of the field's type.
    pub force_string: bool,
    pub data_format: Option<String>,
    pub converter: Option<ConverterRef>,
}

impl ColumnSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            header: None,
            force_string: false,
            data_format: None,
            converter: None,
        }
    }

    pub fn named(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn force_string(mut self) -> Self {
        self.force_string = true;
        self
    }

    pub fn data_format(mut self, format: impl Into<String>) -> Self {
        self.data_format = Some(format.into());
        self
    }

    pub fn converter(mut self, converter: ConverterRef) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn header_name(&self) -> &str {
        self.header
            .as_deref()
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.field)
    }
}

#[derive(Debug, Clone)]
pub struct OverflowSpec {
    pub field: String,
    pub converter: Option<ConverterRef>,
    /// Header names never routed into the overflow map.
    pub ignore: BTreeSet<String>,
}

impl OverflowSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            converter: None,
            ignore: BTreeSet::new(),
        }
    }

    pub fn converter(mut self, converter: ConverterRef) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn ignore<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore.extend(names.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordSchema {
    pub columns: Vec<ColumnSpec>,
    /// Explicit column order by header name.
    pub order: Option<Vec<String>>,
    /// Overflow declarations; more than one is rejected at extraction.
    pub overflow: Vec<OverflowSpec>,
}

impl RecordSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, spec: ColumnSpec) -> Self {
        self.columns.push(spec);
        self
    }

    pub fn order<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect::<Vec<_>>();
        self.order = if names.is_empty() { None } else { Some(names) };
        self
    }

    pub fn overflow(mut self, spec: OverflowSpec) -> Self {
        self.overflow.push(spec);
        self
    }
}
