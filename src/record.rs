//! Records and their field accessor tables.
//!
//! A record type is described by a [`RecordSchema`] (what maps to which
//! column) and a [`FieldTable`] (how to get and set each field). Typed
//! structs implement [`Record`]; dynamically shaped records build a
//! [`RecordType`] at runtime.
//!
//! ```
//! use sheet_mapper::record::{FieldTable, Record};
//! use sheet_mapper::schema::{ColumnSpec, RecordSchema};
//!
//! #[derive(Default)]
//! struct Person {
//!     id: i32,
//!     name: Option<String>,
//! }
//!
//! impl Record for Person {
//!     fn schema() -> RecordSchema {
//!         RecordSchema::new()
//!             .column(ColumnSpec::new("id").named("Id"))
//!             .column(ColumnSpec::new("name").named("Name"))
//!     }
//!
//!     fn fields() -> FieldTable<Self> {
//!         FieldTable::new()
//!             .field("id", |p: &Person| &p.id, |p: &mut Person| &mut p.id)
//!             .field("name", |p: &Person| &p.name, |p: &mut Person| &mut p.name)
//!     }
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::Arc,
};

use chrono::NaiveDateTime;

use crate::{
    error::{MappingError, Result},
    schema::RecordSchema,
    value::{Value, ValueType},
};

/// Storage of an overflow field: header name -> value.
pub type OverflowMap = BTreeMap<String, Value>;

/// Rust types that can back a scalar column.
pub trait FieldType: Sized {
    fn value_type() -> ValueType;

    fn to_value(&self) -> Option<Value>;

    fn from_value(value: Value) -> Result<Self>;
}

fn type_mismatch(expected: ValueType, found: &Value) -> MappingError {
    MappingError::conversion(
        "",
        format!(
            "type mismatch: field expects {expected} but got {} '{found}'",
            found.value_type()
        ),
    )
}

macro_rules! impl_field_type {
    ($ty:ty, $variant:ident) => {
        impl FieldType for $ty {
            fn value_type() -> ValueType {
                ValueType::$variant
            }

            fn to_value(&self) -> Option<Value> {
                Some(Value::$variant(self.clone()))
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(inner) => Ok(inner),
                    other => Err(type_mismatch(ValueType::$variant, &other)),
                }
            }
        }
    };
}

impl_field_type!(String, String);
impl_field_type!(char, Char);
impl_field_type!(bool, Boolean);
impl_field_type!(i16, Short);
impl_field_type!(i32, Integer);
impl_field_type!(i64, Long);
impl_field_type!(f32, Float);
impl_field_type!(f64, Double);
impl_field_type!(NaiveDateTime, Date);

impl<T: FieldType> FieldType for Option<T> {
    fn value_type() -> ValueType {
        T::value_type()
    }

    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(T::to_value)
    }

    fn from_value(value: Value) -> Result<Self> {
        T::from_value(value).map(Some)
    }
}

/// Storage shape of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Scalar(ValueType),
    Map,
}

type Getter<R> = Arc<dyn Fn(&R) -> Option<Value> + Send + Sync>;
type Setter<R> = Arc<dyn Fn(&mut R, Value) -> Result<()> + Send + Sync>;
type MapGetter<R> = Arc<dyn Fn(&R) -> Option<&OverflowMap> + Send + Sync>;
type MapEntry<R> = Arc<dyn Fn(&mut R) -> &mut OverflowMap + Send + Sync>;

enum Access<R> {
    Scalar { get: Getter<R>, set: Setter<R> },
    Map { get: MapGetter<R>, entry: MapEntry<R> },
}

impl<R> Clone for Access<R> {
    fn clone(&self) -> Self {
        match self {
            Access::Scalar { get, set } => Access::Scalar {
                get: Arc::clone(get),
                set: Arc::clone(set),
            },
            Access::Map { get, entry } => Access::Map {
                get: Arc::clone(get),
                entry: Arc::clone(entry),
            },
        }
    }
}

/// Get/set capability for one field of `R`.
pub struct FieldAccessor<R> {
    name: String,
    shape: FieldShape,
    access: Access<R>,
}

impl<R> Clone for FieldAccessor<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            shape: self.shape,
            access: self.access.clone(),
        }
    }
}

impl<R> fmt::Debug for FieldAccessor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldAccessor")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

impl<R> FieldAccessor<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> FieldShape {
        self.shape
    }

    /// Declared value type of a scalar field.
    pub fn value_type(&self) -> Option<ValueType> {
        match self.shape {
            FieldShape::Scalar(ty) => Some(ty),
            FieldShape::Map => None,
        }
    }

    pub fn get(&self, record: &R) -> Result<Option<Value>> {
        match &self.access {
            Access::Scalar { get, .. } => Ok(get(record)),
            Access::Map { .. } => Err(self.not_scalar()),
        }
    }

    pub fn set(&self, record: &mut R, value: Value) -> Result<()> {
        match &self.access {
            Access::Scalar { set, .. } => set(record, value),
            Access::Map { .. } => Err(self.not_scalar()),
        }
    }

    pub fn map<'r>(&self, record: &'r R) -> Result<Option<&'r OverflowMap>> {
        match &self.access {
            Access::Map { get, .. } => Ok(get(record)),
            Access::Scalar { .. } => Err(self.not_map()),
        }
    }

    /// The field's map, created empty on first use.
    pub fn map_entry<'r>(&self, record: &'r mut R) -> Result<&'r mut OverflowMap> {
        match &self.access {
            Access::Map { entry, .. } => Ok(entry(record)),
            Access::Scalar { .. } => Err(self.not_map()),
        }
    }

    fn not_scalar(&self) -> MappingError {
        MappingError::access(&self.name, "field holds a map, not a single value")
    }

    fn not_map(&self) -> MappingError {
        MappingError::access(&self.name, "field does not hold a map")
    }
}

/// Accessors for the fields of `R`, in declaration order.
pub struct FieldTable<R> {
    fields: Vec<FieldAccessor<R>>,
}

impl<R> Clone for FieldTable<R> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
        }
    }
}

impl<R> fmt::Debug for FieldTable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.fields).finish()
    }
}

impl<R: 'static> Default for FieldTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: 'static> FieldTable<R> {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Adds a typed field reached through a pair of projections.
    pub fn field<T>(self, name: &str, get: fn(&R) -> &T, get_mut: fn(&mut R) -> &mut T) -> Self
    where
        T: FieldType + 'static,
    {
        self.scalar(
            name,
            T::value_type(),
            move |record| get(record).to_value(),
            move |record, value| {
                *get_mut(record) = T::from_value(value)?;
                Ok(())
            },
        )
    }

    /// Adds a lazily created overflow map field.
    pub fn overflow(
        self,
        name: &str,
        get: fn(&R) -> &Option<OverflowMap>,
        get_mut: fn(&mut R) -> &mut Option<OverflowMap>,
    ) -> Self {
        self.map(
            name,
            move |record| get(record).as_ref(),
            move |record| get_mut(record).get_or_insert_with(OverflowMap::new),
        )
    }

    pub fn scalar<G, S>(mut self, name: &str, value_type: ValueType, get: G, set: S) -> Self
    where
        G: Fn(&R) -> Option<Value> + Send + Sync + 'static,
        S: Fn(&mut R, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.fields.push(FieldAccessor {
            name: name.to_string(),
            shape: FieldShape::Scalar(value_type),
            access: Access::Scalar {
                get: Arc::new(get),
                set: Arc::new(set),
            },
        });
        self
    }

    pub fn map<G, E>(mut self, name: &str, get: G, entry: E) -> Self
    where
        G: Fn(&R) -> Option<&OverflowMap> + Send + Sync + 'static,
        E: Fn(&mut R) -> &mut OverflowMap + Send + Sync + 'static,
    {
        self.fields.push(FieldAccessor {
            name: name.to_string(),
            shape: FieldShape::Map,
            access: Access::Map {
                get: Arc::new(get),
                entry: Arc::new(entry),
            },
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldAccessor<R>> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldAccessor<R>> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Lookup from field identifier to accessor, restricted to the fields a
/// schema binds.
pub struct FieldsMapper<R> {
    fields: HashMap<String, FieldAccessor<R>>,
}

impl<R> Clone for FieldsMapper<R> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
        }
    }
}

impl<R> fmt::Debug for FieldsMapper<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.fields.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("FieldsMapper").field("fields", &names).finish()
    }
}

impl<R> FieldsMapper<R> {
    pub fn new<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = FieldAccessor<R>>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|field| (field.name.clone(), field))
                .collect(),
        }
    }

    pub fn get(&self, field_name: &str) -> Option<&FieldAccessor<R>> {
        self.fields.get(field_name)
    }

    /// Like [`FieldsMapper::get`], failing with an access error.
    pub fn require(&self, field_name: &str) -> Result<&FieldAccessor<R>> {
        self.get(field_name)
            .ok_or_else(|| MappingError::access(field_name, "no accessor registered for field"))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Statically described record types.
pub trait Record: Default + 'static {
    fn schema() -> RecordSchema;

    fn fields() -> FieldTable<Self>;
}

/// Everything the engine needs to map one record type: its schema, its
/// accessors and a way to create empty instances.
pub struct RecordType<R> {
    pub schema: RecordSchema,
    pub fields: FieldTable<R>,
    factory: Arc<dyn Fn() -> R + Send + Sync>,
}

impl<R> Clone for RecordType<R> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            fields: self.fields.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<R> fmt::Debug for RecordType<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordType")
            .field("schema", &self.schema)
            .field("fields", &self.fields)
            .finish()
    }
}

impl<R: 'static> RecordType<R> {
    pub fn new<F>(schema: RecordSchema, fields: FieldTable<R>, factory: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
    {
        Self {
            schema,
            fields,
            factory: Arc::new(factory),
        }
    }

    pub fn of() -> Self
    where
        R: Record,
    {
        Self::new(R::schema(), R::fields(), R::default)
    }

    pub fn instantiate(&self) -> R {
        (self.factory)()
    }
}
