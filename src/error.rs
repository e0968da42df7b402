//! Error taxonomy for the mapping engine.
//!
//! Every failure is fatal to the read or write in progress; there is no
//! partial-success result.

use thiserror::Error;

pub type Result<T, E = MappingError> = std::result::Result<T, E>;

pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum MappingError {
    /// The schema description cannot be resolved into a column set.
    #[error("schema error: {0}")]
    Schema(String),

    /// The sheet does not have the shape the reader expects.
    #[error("structural error: {0}")]
    Structural(String),

    /// A value cannot be coerced to its destination type, or a converter failed.
    #[error("conversion error in column '{column}': {message}")]
    Conversion {
        column: String,
        message: String,
        #[source]
        source: Option<BoxedError>,
    },

    /// A field cannot be read from or written to a record.
    #[error("access error on field '{field}': {message}")]
    Access { field: String, message: String },
}

impl MappingError {
    pub(crate) fn schema(message: impl Into<String>) -> Self {
        MappingError::Schema(message.into())
    }

    pub(crate) fn conversion(column: &str, message: impl Into<String>) -> Self {
        MappingError::Conversion {
            column: column.to_string(),
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn converter_failed(column: &str, source: anyhow::Error) -> Self {
        MappingError::Conversion {
            column: column.to_string(),
            message: format!("converter failed: {source}"),
            source: Some(source.into()),
        }
    }

    pub(crate) fn access(field: &str, message: impl Into<String>) -> Self {
        MappingError::Access {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Rebinds a conversion error raised without column context.
    pub(crate) fn in_column(self, name: &str) -> Self {
        match self {
            MappingError::Conversion {
                column,
                message,
                source,
            } if column.is_empty() => MappingError::Conversion {
                column: name.to_string(),
                message,
                source,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_names_column() {
        let err = MappingError::conversion("Age", "'abc' is not a number");
        assert_eq!(
            err.to_string(),
            "conversion error in column 'Age': 'abc' is not a number"
        );
    }

    #[test]
    fn in_column_only_fills_missing_column() {
        let anonymous = MappingError::conversion("", "bad").in_column("Id");
        assert!(matches!(anonymous, MappingError::Conversion { ref column, .. } if column == "Id"));

        let named = MappingError::conversion("Name", "bad").in_column("Id");
        assert!(matches!(named, MappingError::Conversion { ref column, .. } if column == "Name"));
    }

    #[test]
    fn converter_failure_keeps_source() {
        let err = MappingError::converter_failed("Flag", anyhow::anyhow!("unknown token"));
        let source = std::error::Error::source(&err).expect("source retained");
        assert!(source.to_string().contains("unknown token"));
    }
}
