//! Raw tables as produced by source loaders.
//!
//! # Responsibility
//! - Hold loaded rows under the column names used by the source system.
//! - Expose column access for validators through [`Tabular`].
//!
//! # Invariants
//! - Every row has exactly `columns().len()` cells; loaders pad short rows
//!   with `Value::Null` and cut overflow cells.

use crate::model::value::Value;
use std::collections::BTreeMap;

/// Column-oriented read access shared by raw tables and normalized batches.
pub trait Tabular {
    fn has_column(&self, name: &str) -> bool;
    /// Returns the values of one column in row order, or `None` when the
    /// column is absent.
    fn column_values(&self, name: &str) -> Option<Vec<&Value>>;
    fn row_count(&self) -> usize;
}

/// Unprocessed table with source-specific column names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from header and rows, fitting each row to the header
    /// width.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Convenience constructor for column-major literals, mostly used by
    /// scrape collaborators and tests.
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        let columns: Vec<(String, Vec<Value>)> = columns
            .into_iter()
            .map(|(name, values)| (name.into(), values))
            .collect();
        let height = columns
            .iter()
            .map(|(_, values)| values.len())
            .max()
            .unwrap_or(0);
        let names = columns.iter().map(|(name, _)| name.clone()).collect();
        let rows = (0..height)
            .map(|index| {
                columns
                    .iter()
                    .map(|(_, values)| values.get(index).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Self::from_rows(names, rows)
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Returns the first column name that appears more than once.
    pub fn duplicate_column(&self) -> Option<&str> {
        self.columns.iter().enumerate().find_map(|(index, name)| {
            self.columns[..index]
                .contains(name)
                .then_some(name.as_str())
        })
    }

    /// Renames columns in place; names without a rule are kept.
    pub fn rename_columns(&mut self, rules: &BTreeMap<String, String>) {
        for column in &mut self.columns {
            if let Some(target) = rules.get(column.as_str()) {
                column.clone_from(target);
            }
        }
    }

    /// Consumes the table into one column map per row.
    pub fn into_row_maps(self) -> Vec<BTreeMap<String, Value>> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }
}

impl Tabular for RawTable {
    fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    fn row_count(&self) -> usize {
        self.len()
    }
}
