//! Typed cell values and the semantic type tags that drive coercion.
//!
//! [`Value`] is the logical value moved between record fields and sheet
//! cells. [`ValueType`] is the declared type of a field or column; it decides
//! how raw cells are coerced on read and which kind of cell is written.

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Char(char),
    Boolean(bool),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Date(NaiveDateTime),
}

impl Value {
    /// Semantic type of the value at runtime.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Char(_) => ValueType::Char,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Short(_) => ValueType::Short,
            Value::Integer(_) => ValueType::Integer,
            Value::Long(_) => ValueType::Long,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::Date(_) => ValueType::Date,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Char(c) => c.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Short(i) => i.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Long(i) => i.to_string(),
            Value::Float(f) => format_number(f64::from(*f)),
            Value::Double(f) => format_number(*f),
            Value::Date(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Short(i) => Some(f64::from(*i)),
            Value::Integer(i) => Some(f64::from(*i)),
            Value::Long(i) => Some(*i as f64),
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(f) => Some(*f),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_evalexpr(&self) -> evalexpr::Value {
        match self {
            Value::String(s) => evalexpr::Value::String(s.clone()),
            Value::Char(c) => evalexpr::Value::String(c.to_string()),
            Value::Boolean(b) => evalexpr::Value::Boolean(*b),
            Value::Short(i) => evalexpr::Value::Int(i64::from(*i)),
            Value::Integer(i) => evalexpr::Value::Int(i64::from(*i)),
            Value::Long(i) => evalexpr::Value::Int(*i),
            Value::Float(f) => evalexpr::Value::Float(f64::from(*f)),
            Value::Double(f) => evalexpr::Value::Float(*f),
            Value::Date(dt) => {
                evalexpr::Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

/// Renders a number the way a spreadsheet's general format does: integral
/// values lose their fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Char,
    Boolean,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Date,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Char => "char",
            ValueType::Boolean => "boolean",
            ValueType::Short => "short",
            ValueType::Integer => "integer",
            ValueType::Long => "long",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::Date => "date",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "string", "char", "boolean", "short", "integer", "long", "float", "double", "date",
        ]
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "str" | "text" => Ok(ValueType::String),
            "char" | "character" => Ok(ValueType::Char),
            "boolean" | "bool" => Ok(ValueType::Boolean),
            "short" | "int16" => Ok(ValueType::Short),
            "integer" | "int" | "int32" => Ok(ValueType::Integer),
            "long" | "int64" => Ok(ValueType::Long),
            "float" | "float32" => Ok(ValueType::Float),
            "double" | "float64" | "number" => Ok(ValueType::Double),
            "date" | "datetime" | "timestamp" => Ok(ValueType::Date),
            _ => Err(anyhow!(
                "Unknown value type '{value}'. Supported types: {}",
                ValueType::variants().join(", ")
            )),
        }
    }
}

impl Serialize for ValueType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ValueType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        ValueType::from_str(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

pub fn parse_bool_token(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
    let trimmed = value.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(parsed);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}

pub fn normalize_column_name(name: &str) -> String {
    let mut normalized = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect::<String>()
        .to_ascii_lowercase();
    if normalized.is_empty() {
        normalized.push_str("column");
    } else if normalized.starts_with(|c: char| c.is_ascii_digit()) {
        normalized.insert(0, '_');
    }
    normalized
}

fn serial_epoch(days: i64) -> Option<NaiveDate> {
    // Serial 60 is the phantom 1900-02-29 of the 1900 date system; it and
    // every earlier serial count from 1899-12-31.
    if days <= 60 {
        NaiveDate::from_ymd_opt(1899, 12, 31)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    }
}

/// Converts a 1900-system serial day number to a date-time, rounding the
/// time of day to the millisecond.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let millis = ((serial - serial.trunc()) * MILLIS_PER_DAY).round() as i64;
    let midnight = serial_epoch(days)?
        .checked_add_signed(Duration::days(days))?
        .and_hms_opt(0, 0, 0)?;
    midnight.checked_add_signed(Duration::milliseconds(millis))
}

/// Converts a date-time to its 1900-system serial day number.
pub fn datetime_to_serial(value: &NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default();
    let mut days = (value.date() - epoch).num_days();
    if days < 61 {
        days -= 1;
    }
    let millis = f64::from(value.num_seconds_from_midnight()) * 1000.0
        + f64::from(value.nanosecond() / 1_000_000);
    days as f64 + millis / MILLIS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datetime(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn serial_conversion_matches_spreadsheet_epoch() {
        assert_eq!(serial_to_datetime(1.0), Some(datetime(1900, 1, 1, 0, 0, 0)));
        assert_eq!(serial_to_datetime(59.0), Some(datetime(1900, 2, 28, 0, 0, 0)));
        assert_eq!(serial_to_datetime(61.0), Some(datetime(1900, 3, 1, 0, 0, 0)));
        assert_eq!(
            serial_to_datetime(45_000.5),
            Some(datetime(2023, 3, 15, 12, 0, 0))
        );
        assert_eq!(serial_to_datetime(-1.0), None);
        assert_eq!(serial_to_datetime(f64::NAN), None);
    }

    #[test]
    fn datetime_to_serial_inverts_serial_to_datetime() {
        for serial in [1.0, 59.0, 61.0, 45_000.25, 44_197.0] {
            let dt = serial_to_datetime(serial).unwrap();
            assert!((datetime_to_serial(&dt) - serial).abs() < 1e-9, "{serial}");
        }
    }

    #[test]
    fn value_type_parses_aliases() {
        assert_eq!("int".parse::<ValueType>().unwrap(), ValueType::Integer);
        assert_eq!("Double".parse::<ValueType>().unwrap(), ValueType::Double);
        assert_eq!("datetime".parse::<ValueType>().unwrap(), ValueType::Date);
        let err = "decimal".parse::<ValueType>().unwrap_err();
        assert!(err.to_string().contains("Unknown value type 'decimal'"));
    }

    #[test]
    fn general_number_format_drops_integral_fraction() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-42.0), "-42");
        assert_eq!(format_number(1.25), "1.25");
        assert_eq!(Value::Double(3.0).to_string(), "3");
    }

    #[test]
    fn boolean_tokens_are_case_insensitive() {
        assert_eq!(parse_bool_token("Yes"), Some(true));
        assert_eq!(parse_bool_token("FALSE"), Some(false));
        assert_eq!(parse_bool_token("maybe"), None);
    }

    #[test]
    fn parse_naive_datetime_accepts_dates_and_datetimes() {
        assert_eq!(
            parse_naive_datetime("2024-05-06T14:30:00"),
            Some(datetime(2024, 5, 6, 14, 30, 0))
        );
        assert_eq!(
            parse_naive_datetime("2024/05/06"),
            Some(datetime(2024, 5, 6, 0, 0, 0))
        );
        assert_eq!(parse_naive_datetime("06.05.2024"), None);
    }

    #[test]
    fn normalize_column_name_produces_identifiers() {
        assert_eq!(normalize_column_name("Order ID"), "order_id");
        assert_eq!(normalize_column_name("1st"), "_1st");
        assert_eq!(normalize_column_name(""), "column");
    }
}
