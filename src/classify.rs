//! Pure classification of value types and physical cells.

use crate::{
    sheet::{Cell, CellValue},
    value::ValueType,
};

/// Native kind of a physical cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Blank,
    Numeric,
    /// A number carrying a date or time display format.
    DateNumeric,
    Boolean,
    Text,
    Formula,
}

impl CellKind {
    pub fn of(cell: Option<&Cell>) -> Self {
        let Some(cell) = cell else {
            return CellKind::Blank;
        };
        match &cell.value {
            CellValue::Number(_) if cell.format.as_deref().is_some_and(is_date_format) => {
                CellKind::DateNumeric
            }
            CellValue::Number(_) => CellKind::Numeric,
            CellValue::Boolean(_) => CellKind::Boolean,
            CellValue::Text(_) => CellKind::Text,
            CellValue::Formula { .. } => CellKind::Formula,
        }
    }
}

pub fn is_numeric(value_type: ValueType) -> bool {
    matches!(
        value_type,
        ValueType::Short
            | ValueType::Integer
            | ValueType::Long
            | ValueType::Float
            | ValueType::Double
    )
}

pub fn is_boolean(value_type: ValueType) -> bool {
    value_type == ValueType::Boolean
}

pub fn is_date(value_type: ValueType) -> bool {
    value_type == ValueType::Date
}

pub fn is_string(value_type: ValueType) -> bool {
    value_type == ValueType::String
}

/// Whether a physically numeric cell read for `target` must be re-read as
/// its textual representation instead of its number.
pub fn reads_numeric_as_text(target: Option<ValueType>) -> bool {
    target.is_some_and(is_string)
}

pub fn is_numeric_cell(kind: CellKind) -> bool {
    matches!(
        kind,
        CellKind::Numeric | CellKind::DateNumeric | CellKind::Formula
    )
}

/// Detects date or time tokens in a display format, ignoring quoted
/// literals, escaped characters and bracketed sections such as colors.
pub fn is_date_format(format: &str) -> bool {
    let mut is_escaped = false;
    let mut is_literal = false;
    let mut is_bracket = false;
    for character in format.chars() {
        match character {
            _ if is_escaped => is_escaped = false,
            '_' | '\\' if !is_literal => is_escaped = true,

            '"' if is_literal => is_literal = false,
            '"' if !is_bracket => is_literal = true,

            ']' if is_bracket => is_bracket = false,
            '[' if !is_literal => is_bracket = true,
            _ if is_literal || is_bracket => (),

            'Y' | 'y' | 'D' | 'd' | 'H' | 'h' | 'S' | 's' => return true,
            _ => (),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_types_are_classified() {
        for ty in [
            ValueType::Short,
            ValueType::Integer,
            ValueType::Long,
            ValueType::Float,
            ValueType::Double,
        ] {
            assert!(is_numeric(ty), "{ty}");
        }
        assert!(!is_numeric(ValueType::Boolean));
        assert!(!is_numeric(ValueType::Date));
        assert!(!is_numeric(ValueType::String));
    }

    #[test]
    fn only_string_targets_force_text_reads() {
        assert!(reads_numeric_as_text(Some(ValueType::String)));
        assert!(!reads_numeric_as_text(Some(ValueType::Char)));
        assert!(!reads_numeric_as_text(Some(ValueType::Integer)));
        assert!(!reads_numeric_as_text(None));
    }

    #[test]
    fn date_formats_are_detected_outside_literals() {
        assert!(is_date_format("yyyy-mm-dd"));
        assert!(is_date_format("ddd mmm dd hh:mm:ss yyy"));
        assert!(is_date_format("[Red]hh:mm"));
        assert!(!is_date_format("0.00"));
        assert!(!is_date_format("#,##0\" days\""));
        assert!(!is_date_format("[Red]0.00"));
        assert!(!is_date_format("0\\d"));
    }

    #[test]
    fn cell_kind_reflects_value_and_format() {
        assert_eq!(CellKind::of(None), CellKind::Blank);
        assert_eq!(CellKind::of(Some(&Cell::number(1.0))), CellKind::Numeric);
        assert_eq!(
            CellKind::of(Some(&Cell::number(45_000.0).with_format("yyyy-mm-dd"))),
            CellKind::DateNumeric
        );
        assert_eq!(CellKind::of(Some(&Cell::text("x"))), CellKind::Text);
        assert_eq!(CellKind::of(Some(&Cell::boolean(true))), CellKind::Boolean);
        assert!(is_numeric_cell(CellKind::Formula));
        assert!(!is_numeric_cell(CellKind::Text));
    }
}
