//! Column descriptors and ordered, name-unique column sets.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    hash::{Hash, Hasher},
};

use crate::{
    converter::ConverterRef,
    error::{MappingError, Result},
    value::ValueType,
};

/// One logical column and its binding to a record field. Two columns with
/// the same name are the same column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    /// Backing field. For overflow columns this is the overflow field and
    /// `name` is the map key.
    pub field_name: String,
    pub value_type: ValueType,
    pub data_format: Option<String>,
    pub converter: Option<ConverterRef>,
    pub overflow: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, field_name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            field_name: field_name.into(),
            value_type,
            data_format: None,
            converter: None,
            overflow: false,
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Column {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Column {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// Insertion-ordered set of columns keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `column` unless a column with the same name exists. Returns
    /// whether it was added.
    pub fn insert(&mut self, column: Column) -> bool {
        if self.index.contains_key(&column.name) {
            return false;
        }
        self.index.insert(column.name.clone(), self.columns.len());
        self.columns.push(column);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&idx| &self.columns[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Reorders the set to follow `order`, which must name every column
    /// exactly once.
    pub fn reordered(&self, order: &[String]) -> Result<ColumnSet> {
        let mut seen = HashSet::new();
        let mut reordered = ColumnSet::new();
        for name in order {
            if !seen.insert(name.as_str()) {
                return Err(MappingError::schema(format!(
                    "Column '{name}' appears more than once in the column ordering"
                )));
            }
            let column = self.get(name).ok_or_else(|| {
                MappingError::schema(format!("Unrecognized column '{name}' in the column ordering"))
            })?;
            reordered.insert(column.clone());
        }
        if reordered.len() != self.len() {
            let missing = self
                .names()
                .into_iter()
                .filter(|name| !reordered.contains(name))
                .collect::<Vec<_>>();
            return Err(MappingError::schema(format!(
                "Not all columns are specified in the column ordering; missing: {}",
                missing.join(", ")
            )));
        }
        Ok(reordered)
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
