//! Normalized posting records and their identity.
//!
//! # Responsibility
//! - Define the post-normalization record shape and its identity key.
//! - Provide the column-wise upsert used by the merge manager.
//!
//! # Invariants
//! - `RecordKey` is `(origin, origin_id)`; `origin_id` alone is only unique
//!   within one source.
//! - `origin_id` is either an integer or a non-blank string.

use crate::model::columns::{ORIGIN, ORIGIN_ID};
use crate::model::table::{RawTable, Tabular};
use crate::model::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

/// Source-local posting identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OriginId {
    Int(i64),
    Text(String),
}

impl OriginId {
    /// Reads an identifier from a cell.
    ///
    /// Integral floats (spreadsheet numbers) become integers; blank text and
    /// fractional floats are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(id) => Some(Self::Int(*id)),
            Value::Float(id) if id.fract() == 0.0 && id.abs() < 9.0e15 => {
                Some(Self::Int(*id as i64))
            }
            Value::Text(text) if !text.trim().is_empty() => Some(Self::Text(text.trim().to_string())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(id) => Value::Int(*id),
            Self::Text(id) => Value::Text(id.clone()),
        }
    }
}

impl Display for OriginId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for OriginId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for OriginId {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for OriginId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Global identity of one posting in the unified store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub origin: String,
    pub origin_id: OriginId,
}

impl RecordKey {
    pub fn new(origin: impl Into<String>, origin_id: impl Into<OriginId>) -> Self {
        Self {
            origin: origin.into(),
            origin_id: origin_id.into(),
        }
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.origin, self.origin_id)
    }
}

/// One posting after normalization: canonical, extra and protected columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedRecord {
    fields: BTreeMap<String, Value>,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields(fields: BTreeMap<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(column.into(), value.into());
    }

    /// Builder-style [`NormalizedRecord::set`].
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.fields.remove(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    pub fn origin(&self) -> Option<&str> {
        self.get(ORIGIN).and_then(Value::as_text)
    }

    pub fn origin_id(&self) -> Option<OriginId> {
        self.get(ORIGIN_ID).and_then(OriginId::from_value)
    }

    /// Returns the identity key, or `None` when origin or identifier is
    /// missing.
    pub fn key(&self) -> Option<RecordKey> {
        Some(RecordKey {
            origin: self.origin()?.to_string(),
            origin_id: self.origin_id()?,
        })
    }

    /// Column-wise upsert: columns present in `newer` overwrite, columns only
    /// present here are kept.
    pub fn absorb(&mut self, newer: NormalizedRecord) {
        self.fields.extend(newer.fields);
    }
}

/// Normalized output of one source run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedBatch {
    pub origin: String,
    pub columns: BTreeSet<String>,
    pub records: Vec<NormalizedRecord>,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Re-exports the batch as a raw table with canonical column names.
    pub fn to_raw_table(&self) -> RawTable {
        let columns: Vec<String> = self.columns.iter().cloned().collect();
        let rows = self
            .records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        RawTable::from_rows(columns, rows)
    }
}

impl Tabular for NormalizedBatch {
    fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        if !self.has_column(name) {
            return None;
        }
        const NULL: &Value = &Value::Null;
        Some(
            self.records
                .iter()
                .map(|record| record.get(name).unwrap_or(NULL))
                .collect(),
        )
    }

    fn row_count(&self) -> usize {
        self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{NormalizedRecord, OriginId, RecordKey};
    use crate::model::value::Value;

    #[test]
    fn origin_id_accepts_integral_floats_and_text() {
        assert_eq!(OriginId::from_value(&Value::Float(12.0)), Some(OriginId::Int(12)));
        assert_eq!(OriginId::from_value(&Value::Float(1.5)), None);
        assert_eq!(
            OriginId::from_value(&Value::Text(" ab-1 ".to_string())),
            Some(OriginId::Text("ab-1".to_string()))
        );
        assert_eq!(OriginId::from_value(&Value::Null), None);
    }

    #[test]
    fn absorb_overwrites_present_and_keeps_absent_columns() {
        let mut existing = NormalizedRecord::new()
            .with("origin", "EJM")
            .with("origin_id", 5)
            .with("title", "A")
            .with("url", "u1");
        existing.absorb(
            NormalizedRecord::new()
                .with("origin", "EJM")
                .with("origin_id", 5)
                .with("title", "B"),
        );
        assert_eq!(existing.get("title"), Some(&Value::from("B")));
        assert_eq!(existing.get("url"), Some(&Value::from("u1")));
        assert_eq!(existing.key(), Some(RecordKey::new("EJM", 5)));
    }
}
