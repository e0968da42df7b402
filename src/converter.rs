//! Pluggable value converters.
//!
//! A converter attached to a column replaces the default type coercion for
//! that column in both directions. Converters are shared handles and must be
//! stateless.

use std::{collections::BTreeMap, fmt, sync::Arc};

use anyhow::{Result, anyhow, bail};

use crate::value::{Value, parse_bool_token};

pub trait Converter: Send + Sync + fmt::Debug {
    /// Transforms a raw decoded cell value into a field's logical value.
    fn deserialize(&self, raw: Value) -> Result<Value>;

    /// Transforms a field's logical value into a writable cell value.
    fn serialize(&self, value: Value) -> Result<Value>;

    fn name(&self) -> &str {
        "custom"
    }
}

pub type ConverterRef = Arc<dyn Converter>;

type ConvertFn = dyn Fn(Value) -> Result<Value> + Send + Sync;

/// Converter assembled from a pair of closures.
pub struct FnConverter {
    name: String,
    deserialize: Box<ConvertFn>,
    serialize: Box<ConvertFn>,
}

impl FnConverter {
    pub fn new<D, S>(name: impl Into<String>, deserialize: D, serialize: S) -> Self
    where
        D: Fn(Value) -> Result<Value> + Send + Sync + 'static,
        S: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            deserialize: Box::new(deserialize),
            serialize: Box::new(serialize),
        }
    }

    pub fn shared(self) -> ConverterRef {
        Arc::new(self)
    }
}

impl fmt::Debug for FnConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConverter").field("name", &self.name).finish()
    }
}

impl Converter for FnConverter {
    fn deserialize(&self, raw: Value) -> Result<Value> {
        (self.deserialize)(raw)
    }

    fn serialize(&self, value: Value) -> Result<Value> {
        (self.serialize)(value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn map_text(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}

/// Named converters, used to resolve converter references in schema files.
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    converters: BTreeMap<String, ConverterRef>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ConverterRegistry {
    pub fn empty() -> Self {
        Self {
            converters: BTreeMap::new(),
        }
    }

    /// Registry holding `trim`, `uppercase`, `lowercase` and `yes_no`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "trim",
            FnConverter::new(
                "trim",
                |v| Ok(map_text(v, |s| s.trim().to_string())),
                |v| Ok(map_text(v, |s| s.trim().to_string())),
            )
            .shared(),
        );
        registry.register(
            "uppercase",
            FnConverter::new(
                "uppercase",
                |v| Ok(map_text(v, str::to_uppercase)),
                |v| Ok(map_text(v, str::to_uppercase)),
            )
            .shared(),
        );
        registry.register(
            "lowercase",
            FnConverter::new(
                "lowercase",
                |v| Ok(map_text(v, str::to_lowercase)),
                |v| Ok(map_text(v, str::to_lowercase)),
            )
            .shared(),
        );
        registry.register(
            "yes_no",
            FnConverter::new(
                "yes_no",
                |raw| match raw {
                    Value::Boolean(b) => Ok(Value::Boolean(b)),
                    Value::String(s) => parse_bool_token(&s)
                        .map(Value::Boolean)
                        .ok_or_else(|| anyhow!("'{s}' is not a yes/no value")),
                    other => bail!("Cannot read {} as yes/no", other.value_type()),
                },
                |value| match value {
                    Value::Boolean(b) => Ok(Value::from(if b { "Yes" } else { "No" })),
                    other => bail!("Cannot write {} as yes/no", other.value_type()),
                },
            )
            .shared(),
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, converter: ConverterRef) {
        self.converters.insert(name.into(), converter);
    }

    pub fn get(&self, name: &str) -> Option<ConverterRef> {
        self.converters.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().map(String::as_str)
    }
}
