//! Resolves a record type's schema description into the column set, the
//! field accessors behind it and the optional overflow column.

use std::collections::BTreeSet;

use log::debug;

use crate::{
    column::{Column, ColumnSet},
    error::{MappingError, Result},
    record::{FieldShape, FieldsMapper, RecordType},
    value::ValueType,
};

/// The overflow field of a record type.
#[derive(Debug, Clone)]
pub struct OverflowColumn {
    pub column: Column,
    pub ignore: BTreeSet<String>,
}

impl OverflowColumn {
    pub fn ignores(&self, header: &str) -> bool {
        self.ignore.contains(header)
    }
}

/// Everything derived from one record type.
#[derive(Debug, Clone)]
pub struct Extraction<R> {
    pub columns: ColumnSet,
    pub fields: FieldsMapper<R>,
    pub overflow: Option<OverflowColumn>,
}

pub struct ColumnsExtractor;

impl ColumnsExtractor {
    pub fn extract<R: 'static>(record_type: &RecordType<R>) -> Result<Extraction<R>> {
        let schema = &record_type.schema;
        let table = &record_type.fields;
        let mut columns = ColumnSet::new();
        let mut bound = Vec::new();

        for spec in &schema.columns {
            let accessor = table.get(&spec.field).ok_or_else(|| {
                MappingError::schema(format!(
                    "Column '{}' refers to unknown field '{}'",
                    spec.header_name(),
                    spec.field
                ))
            })?;
            let field_type = match accessor.shape() {
                FieldShape::Scalar(ty) => ty,
                FieldShape::Map => {
                    return Err(MappingError::schema(format!(
                        "Field '{}' holds a map and cannot back column '{}'",
                        spec.field,
                        spec.header_name()
                    )));
                }
            };
            let mut column = Column::new(
                spec.header_name(),
                spec.field.clone(),
                if spec.force_string {
                    ValueType::String
                } else {
                    field_type
                },
            );
            column.data_format = spec.data_format.clone().filter(|f| !f.is_empty());
            column.converter = spec.converter.clone();
            if !columns.insert(column) {
                return Err(MappingError::schema(format!(
                    "Column name '{}' is declared more than once",
                    spec.header_name()
                )));
            }
            bound.push(accessor.clone());
        }

        if let Some(order) = &schema.order {
            columns = columns.reordered(order)?;
        }

        let overflow = match schema.overflow.as_slice() {
            [] => None,
            [spec] => {
                let accessor = table.get(&spec.field).ok_or_else(|| {
                    MappingError::schema(format!(
                        "Overflow field '{}' is not a field of the record",
                        spec.field
                    ))
                })?;
                if accessor.shape() != FieldShape::Map {
                    return Err(MappingError::schema(format!(
                        "Overflow field '{}' must be a string-keyed map",
                        spec.field
                    )));
                }
                bound.push(accessor.clone());
                let mut column = Column::new(spec.field.clone(), spec.field.clone(), ValueType::String);
                column.overflow = true;
                column.converter = spec.converter.clone();
                Some(OverflowColumn {
                    column,
                    ignore: spec.ignore.clone(),
                })
            }
            specs => {
                let names = specs.iter().map(|s| s.field.as_str()).collect::<Vec<_>>();
                return Err(MappingError::schema(format!(
                    "Multiple overflow fields are not allowed: {}",
                    names.join(", ")
                )));
            }
        };

        debug!(
            "Resolved {} column(s) [{}]{}",
            columns.len(),
            columns.names().join(", "),
            overflow
                .as_ref()
                .map(|o| format!(" with overflow field '{}'", o.column.field_name))
                .unwrap_or_default()
        );

        Ok(Extraction {
            columns,
            fields: FieldsMapper::new(bound),
            overflow,
        })
    }
}
