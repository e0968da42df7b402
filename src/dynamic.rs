//! Records whose shape is only known at runtime.
//!
//! A [`SchemaFile`] is the YAML form of a record schema. It names each
//! field's type, so it can build the [`FieldTable`] of a [`DynamicRecord`]
//! without a compile-time Rust type behind it.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::{
    converter::ConverterRegistry,
    error::MappingError,
    reader::convert_to_field_type,
    record::{FieldTable, OverflowMap, RecordType},
    schema::{ColumnSpec, OverflowSpec, RecordSchema},
    value::{Value, ValueType},
};

/// Named scalar slots plus an optional overflow map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRecord {
    values: BTreeMap<String, Value>,
    overflow: Option<OverflowMap>,
}

impl DynamicRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value.into());
        self
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn overflow(&self) -> Option<&OverflowMap> {
        self.overflow.as_ref()
    }

    pub fn overflow_mut(&mut self) -> &mut OverflowMap {
        self.overflow.get_or_insert_with(OverflowMap::new)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEntry {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub datatype: ValueType,
    #[serde(default)]
    pub force_string: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverflowEntry {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFile {
    pub columns: Vec<ColumnEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow: Option<OverflowEntry>,
}

impl SchemaFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("Reading schema file {path:?}"))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Parsing schema file {path:?}"))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let schema: SchemaFile = serde_yaml::from_str(raw)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Serializing schema")?;
        fs::write(path, yaml).with_context(|| format!("Writing schema file {path:?}"))
    }

    fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            bail!("Schema declares no columns");
        }
        let mut types = HashMap::new();
        for entry in &self.columns {
            if entry.field.trim().is_empty() {
                bail!("Column field identifiers must not be empty");
            }
            if let Some(previous) = types.insert(entry.field.as_str(), entry.datatype)
                && previous != entry.datatype
            {
                bail!(
                    "Field '{}' is declared as both {previous} and {}",
                    entry.field,
                    entry.datatype
                );
            }
        }
        if let Some(overflow) = &self.overflow
            && types.contains_key(overflow.field.as_str())
        {
            bail!(
                "Overflow field '{}' is also bound to a column",
                overflow.field
            );
        }
        Ok(())
    }

    /// Declared type of each field, first declaration first.
    pub fn field_types(&self) -> Vec<(&str, ValueType)> {
        self.columns
            .iter()
            .map(|entry| (entry.field.as_str(), entry.datatype))
            .unique_by(|(field, _)| *field)
            .collect()
    }

    /// Resolves converter names against `registry` and builds the record
    /// type of [`DynamicRecord`].
    pub fn into_record_type(&self, registry: &ConverterRegistry) -> Result<RecordType<DynamicRecord>> {
        let resolve = |name: &str| {
            registry.get(name).ok_or_else(|| {
                anyhow!(
                    "Unknown converter '{name}'. Known converters: {}",
                    registry.names().join(", ")
                )
            })
        };

        let mut schema = RecordSchema::new();
        for entry in &self.columns {
            let mut spec = ColumnSpec::new(entry.field.clone());
            if let Some(name) = &entry.name {
                spec = spec.named(name.clone());
            }
            if entry.force_string {
                spec = spec.force_string();
            }
            if let Some(format) = &entry.data_format {
                spec = spec.data_format(format.clone());
            }
            if let Some(converter) = &entry.converter {
                spec = spec.converter(resolve(converter.as_str())?);
            }
            schema = schema.column(spec);
        }
        schema = schema.order(self.order.iter().cloned());

        let mut fields = FieldTable::new();
        for (field, value_type) in self.field_types() {
            fields = dynamic_field(fields, field, value_type);
        }

        if let Some(overflow) = &self.overflow {
            let mut spec = OverflowSpec::new(overflow.field.clone()).ignore(overflow.ignore.iter().cloned());
            if let Some(converter) = &overflow.converter {
                spec = spec.converter(resolve(converter.as_str())?);
            }
            schema = schema.overflow(spec);
            fields = fields.map(
                &overflow.field,
                |record| record.overflow.as_ref(),
                |record| record.overflow_mut(),
            );
        }

        debug!(
            "Built dynamic record type with {} field(s)",
            fields.len()
        );
        Ok(RecordType::new(schema, fields, DynamicRecord::new))
    }

    /// Renders a record as a JSON object keyed by field identifier; the
    /// overflow map nests under the overflow field.
    pub fn record_to_json(&self, record: &DynamicRecord) -> JsonValue {
        let mut object = JsonMap::new();
        for (field, _) in self.field_types() {
            let value = record.get(field).map_or(JsonValue::Null, value_to_json);
            object.insert(field.to_string(), value);
        }
        if let Some(overflow) = &self.overflow
            && let Some(map) = record.overflow()
        {
            let nested = map
                .iter()
                .map(|(key, value)| (key.clone(), value_to_json(value)))
                .collect::<JsonMap<_, _>>();
            object.insert(overflow.field.clone(), JsonValue::Object(nested));
        }
        JsonValue::Object(object)
    }

    /// Reads a JSON object into a record, coercing each member to its
    /// field's declared type. Null members are left unset.
    pub fn record_from_json(&self, json: &JsonValue) -> Result<DynamicRecord> {
        let JsonValue::Object(object) = json else {
            bail!("Expected a JSON object, found {json}");
        };
        let types = self.field_types().into_iter().collect::<HashMap<_, _>>();
        let overflow_field = self.overflow.as_ref().map(|o| o.field.as_str());
        let mut record = DynamicRecord::new();

        for (key, member) in object {
            if Some(key.as_str()) == overflow_field {
                let JsonValue::Object(entries) = member else {
                    if !member.is_null() {
                        bail!("Overflow field '{key}' must be a JSON object");
                    }
                    continue;
                };
                for (name, entry) in entries {
                    if let Some(value) = json_to_value(entry)? {
                        record.overflow_mut().insert(name.clone(), value);
                    }
                }
                continue;
            }
            let Some(value_type) = types.get(key.as_str()) else {
                warn!("Ignoring unknown field '{key}'");
                continue;
            };
            if let Some(raw) = json_to_value(member)? {
                let value = convert_to_field_type(raw, *value_type)
                    .with_context(|| format!("Reading field '{key}'"))?;
                record.set(key.clone(), value);
            }
        }
        Ok(record)
    }
}

fn dynamic_field(fields: FieldTable<DynamicRecord>, name: &str, value_type: ValueType) -> FieldTable<DynamicRecord> {
    let get_name = name.to_string();
    let set_name = name.to_string();
    fields.scalar(
        name,
        value_type,
        move |record: &DynamicRecord| record.get(&get_name).cloned(),
        move |record: &mut DynamicRecord, value: Value| {
            if value.value_type() != value_type {
                return Err(MappingError::conversion(
                    "",
                    format!(
                        "type mismatch: field expects {value_type} but got {} '{value}'",
                        value.value_type()
                    ),
                ));
            }
            record.set(set_name.clone(), value);
            Ok(())
        },
    )
}

pub fn value_to_json(value: &Value) -> JsonValue {
    let float = |f: f64| JsonNumber::from_f64(f).map_or(JsonValue::Null, JsonValue::Number);
    match value {
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Char(c) => JsonValue::String(c.to_string()),
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Short(i) => JsonValue::from(*i),
        Value::Integer(i) => JsonValue::from(*i),
        Value::Long(i) => JsonValue::from(*i),
        Value::Float(f) => float(f64::from(*f)),
        Value::Double(f) => float(*f),
        Value::Date(_) => JsonValue::String(value.as_display()),
    }
}

/// Raw value of a JSON scalar; `null` is absent.
pub fn json_to_value(json: &JsonValue) -> Result<Option<Value>> {
    Ok(match json {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(Value::Boolean(*b)),
        JsonValue::Number(n) => Some(match n.as_i64() {
            Some(i) => Value::Long(i),
            None => Value::Double(
                n.as_f64()
                    .ok_or_else(|| anyhow!("Number {n} is out of range"))?,
            ),
        }),
        JsonValue::String(s) => Some(Value::String(s.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            bail!("Expected a scalar JSON value, found {json}")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &str = r#"
columns:
  - field: id
    name: Id
    datatype: integer
  - field: name
    name: Name
    datatype: string
    converter: trim
  - field: joined
    name: Joined
    datatype: datetime
order: [Name, Id, Joined]
overflow:
  field: extra
  converter: uppercase
  ignore: [Legacy]
"#;

    #[test]
    fn parses_yaml_schema_with_aliases() {
        let schema = SchemaFile::from_yaml_str(SCHEMA).unwrap();
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.columns[2].datatype, ValueType::Date);
        assert_eq!(schema.order, vec!["Name", "Id", "Joined"]);
        let overflow = schema.overflow.as_ref().unwrap();
        assert_eq!(overflow.ignore, vec!["Legacy"]);
        assert_eq!(overflow.converter.as_deref(), Some("uppercase"));
    }

    #[test]
    fn builds_a_record_type() {
        let schema = SchemaFile::from_yaml_str(SCHEMA).unwrap();
        let record_type = schema.into_record_type(&ConverterRegistry::default()).unwrap();
        assert_eq!(record_type.fields.len(), 4);
        assert_eq!(record_type.schema.order.as_ref().map(Vec::len), Some(3));
        assert!(record_type.schema.columns[1].converter.is_some());

        let mut record = record_type.instantiate();
        let id = record_type.fields.get("id").unwrap();
        id.set(&mut record, Value::Integer(4)).unwrap();
        assert_eq!(record.get("id"), Some(&Value::Integer(4)));
        assert!(id.set(&mut record, Value::from("four")).is_err());
    }

    #[test]
    fn unknown_converters_are_reported() {
        let raw = SCHEMA.replace("converter: trim", "converter: shout");
        let schema = SchemaFile::from_yaml_str(&raw).unwrap();
        let err = schema
            .into_record_type(&ConverterRegistry::default())
            .unwrap_err();
        assert!(err.to_string().contains("Unknown converter 'shout'"), "{err}");
    }

    #[test]
    fn conflicting_declarations_are_rejected() {
        let raw = r#"
columns:
  - field: id
    datatype: integer
  - field: id
    name: Identifier
    datatype: string
"#;
        let err = SchemaFile::from_yaml_str(raw).unwrap_err();
        assert!(err.to_string().contains("declared as both"), "{err}");

        let raw = "columns:\n  - field: id\n    datatype: int\noverflow:\n  field: id\n";
        assert!(SchemaFile::from_yaml_str(raw).is_err());
        assert!(SchemaFile::from_yaml_str("columns: []").is_err());
    }

    #[test]
    fn json_round_trip_through_declared_types() {
        let schema = SchemaFile::from_yaml_str(SCHEMA).unwrap();
        let json = json!({
            "id": 7,
            "name": "Ann",
            "joined": "2024-01-02 03:04:05",
            "extra": {"City": "Berlin", "Floor": 3},
            "ignored": true
        });
        let record = schema.record_from_json(&json).unwrap();
        assert_eq!(record.get("id"), Some(&Value::Integer(7)));
        assert_eq!(
            record.get("joined").map(Value::as_display).as_deref(),
            Some("2024-01-02 03:04:05")
        );
        assert_eq!(record.overflow().unwrap().get("Floor"), Some(&Value::Long(3)));

        let back = schema.record_to_json(&record);
        assert_eq!(back["id"], json!(7));
        assert_eq!(back["name"], json!("Ann"));
        assert_eq!(back["extra"]["City"], json!("Berlin"));
        assert!(back.get("ignored").is_none());
    }

    #[test]
    fn json_members_must_coerce() {
        let schema = SchemaFile::from_yaml_str(SCHEMA).unwrap();
        assert!(schema.record_from_json(&json!({"id": "seven"})).is_err());
        assert!(schema.record_from_json(&json!({"id": [1]})).is_err());
        assert!(schema.record_from_json(&json!([1, 2])).is_err());
        let record = schema.record_from_json(&json!({"id": null})).unwrap();
        assert!(record.get("id").is_none());
    }
}
