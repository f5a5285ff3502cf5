//! Spreadsheet loader (xlsx/xls/ods) tolerant of header offset irregularities.

use crate::error::MalformedInputError;
use crate::loader::SourceLoader;
use crate::model::table::RawTable;
use crate::model::value::Value;
use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::NaiveDate;
use std::path::Path;

/// Reads the first worksheet of a workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpreadsheetLoader {
    tolerant: bool,
}

impl Default for SpreadsheetLoader {
    fn default() -> Self {
        Self { tolerant: true }
    }
}

impl SpreadsheetLoader {
    /// Loader that skips leading blank rows and trims blank edges.
    pub fn tolerant() -> Self {
        Self { tolerant: true }
    }

    /// Loader that takes the first worksheet row as header, as is.
    pub fn strict() -> Self {
        Self { tolerant: false }
    }
}

impl SourceLoader for SpreadsheetLoader {
    fn kind(&self) -> &'static str {
        "spreadsheet"
    }

    fn load(&self, origin: &str, path: &Path) -> Result<RawTable, MalformedInputError> {
        let mut workbook = open_workbook_auto(path).map_err(|err| {
            MalformedInputError::at_path(origin, path, format!("cannot open workbook: {err}"))
        })?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| MalformedInputError::at_path(origin, path, "workbook has no worksheet"))?
            .map_err(|err| {
                MalformedInputError::at_path(origin, path, format!("cannot read worksheet: {err}"))
            })?;

        let grid: Vec<Vec<Value>> = range
            .rows()
            .map(|row| row.iter().map(cell_value).collect())
            .collect();
        table_from_grid(origin, grid, self.tolerant)
            .map_err(|err| MalformedInputError { path: Some(path.to_path_buf()), ..err })
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(value) => Value::Int(*value),
        Data::Float(value) => Value::Float(*value),
        Data::Bool(value) => Value::Bool(*value),
        Data::String(text) if text.trim().is_empty() => Value::Null,
        Data::String(text) => Value::Text(text.clone()),
        Data::DateTime(_) => cell.as_date().map_or(Value::Null, Value::Date),
        Data::DateTimeIso(text) => text
            .get(..10)
            .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
            .map_or_else(|| Value::Text(text.clone()), Value::Date),
        Data::DurationIso(text) => Value::Text(text.clone()),
    }
}

/// Builds a raw table from a cell grid.
///
/// In tolerant mode the header is the first row holding any value, trailing
/// columns that are blank everywhere are trimmed, and blank rows are skipped.
/// Strict mode uses the first row as header and keeps the grid width.
pub fn table_from_grid(
    origin: &str,
    grid: Vec<Vec<Value>>,
    tolerant: bool,
) -> Result<RawTable, MalformedInputError> {
    let mut rows = grid.into_iter();
    let header_row = if tolerant {
        rows.by_ref().find(|row| row.iter().any(|cell| !cell.is_null()))
    } else {
        rows.next()
    };
    let header =
        header_row.ok_or_else(|| MalformedInputError::new(origin, "worksheet is empty"))?;

    let body: Vec<Vec<Value>> = rows
        .filter(|row| !tolerant || row.iter().any(|cell| !cell.is_null()))
        .collect();

    let width = if tolerant {
        let used = |row: &Vec<Value>| {
            row.iter()
                .rposition(|cell| !cell.is_null())
                .map_or(0, |index| index + 1)
        };
        body.iter().map(used).chain([used(&header)]).max().unwrap_or(0)
    } else {
        header.len()
    };

    let columns: Vec<String> = (0..width)
        .map(|index| match header.get(index) {
            Some(cell) if !cell.is_null() => cell.to_string().trim().to_string(),
            _ => format!("Unnamed: {index}"),
        })
        .collect();
    Ok(RawTable::from_rows(columns, body))
}

#[cfg(test)]
mod tests {
    use super::table_from_grid;
    use crate::model::value::Value;

    fn text(value: &str) -> Value {
        Value::from(value)
    }

    #[test]
    fn tolerant_mode_skips_leading_blank_rows_and_trailing_columns() {
        let grid = vec![
            vec![Value::Null, Value::Null, Value::Null],
            vec![text("jp_id"), text("jp_title"), Value::Null],
            vec![Value::Float(1.0), text("X"), Value::Null],
            vec![Value::Null, Value::Null, Value::Null],
            vec![Value::Float(2.0), text("Y")],
        ];
        let table = table_from_grid("AEA", grid, true).unwrap();
        assert_eq!(table.columns(), ["jp_id", "jp_title"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1][1], text("Y"));
    }

    #[test]
    fn tolerant_mode_names_data_columns_without_header() {
        let grid = vec![
            vec![text("jp_id")],
            vec![Value::Float(1.0), text("orphan")],
        ];
        let table = table_from_grid("AEA", grid, true).unwrap();
        assert_eq!(table.columns(), ["jp_id", "Unnamed: 1"]);
    }

    #[test]
    fn strict_mode_uses_first_row() {
        let grid = vec![vec![Value::Null, Value::Null], vec![text("a"), text("b")]];
        let table = table_from_grid("AEA", grid, false).unwrap();
        assert_eq!(table.columns(), ["Unnamed: 0", "Unnamed: 1"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn empty_grid_is_malformed() {
        let err = table_from_grid("AEA", vec![vec![Value::Null]], true).unwrap_err();
        assert!(err.reason.contains("empty"));
    }
}
