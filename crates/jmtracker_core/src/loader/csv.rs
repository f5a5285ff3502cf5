//! CSV loader with a configurable header-row offset.

use crate::error::MalformedInputError;
use crate::loader::SourceLoader;
use crate::model::table::RawTable;
use crate::model::value::Value;
use ::csv::{ReaderBuilder, Trim};
use std::path::Path;

/// Reads delimited text; rows before `header_row` are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvLoader {
    header_row: usize,
    delimiter: u8,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self {
            header_row: 0,
            delimiter: b',',
        }
    }
}

impl CsvLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero-based index of the header record (blank lines are not counted).
    pub fn with_header_row(mut self, header_row: usize) -> Self {
        self.header_row = header_row;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn header_row(&self) -> usize {
        self.header_row
    }
}

impl SourceLoader for CsvLoader {
    fn kind(&self) -> &'static str {
        "csv"
    }

    fn load(&self, origin: &str, path: &Path) -> Result<RawTable, MalformedInputError> {
        let bytes = std::fs::read(path).map_err(|err| {
            MalformedInputError::at_path(origin, path, format!("cannot read file: {err}"))
        })?;
        // Exports from some boards are not valid UTF-8; keep what decodes.
        let text = String::from_utf8_lossy(&bytes);
        parse_csv(origin, &text, self.header_row, self.delimiter)
            .map_err(|err| MalformedInputError { path: Some(path.to_path_buf()), ..err })
    }
}

/// Parses CSV text into a raw table.
///
/// Cells are typed with [`Value::infer`]; rows where every cell is blank are
/// skipped; blank header names become `Unnamed: <index>`.
pub fn parse_csv(
    origin: &str,
    text: &str,
    header_row: usize,
    delimiter: u8,
) -> Result<RawTable, MalformedInputError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::Headers)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let mut header = None;
    let mut index = 0usize;
    for record in records.by_ref() {
        let record = record.map_err(|err| {
            MalformedInputError::new(origin, format!("cannot parse CSV record {}: {err}", index + 1))
        })?;
        if index == header_row {
            header = Some(record);
            break;
        }
        index += 1;
    }

    let header = header.ok_or_else(|| {
        MalformedInputError::new(
            origin,
            format!("no header found at row {header_row} (file has {index} record(s))"),
        )
    })?;
    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(position, name)| {
            let name = name.trim();
            if name.is_empty() {
                format!("Unnamed: {position}")
            } else {
                name.to_string()
            }
        })
        .collect();

    let mut table = RawTable::new(columns);
    for (offset, record) in records.enumerate() {
        let record = record.map_err(|err| {
            MalformedInputError::new(
                origin,
                format!("cannot parse CSV record {}: {err}", header_row + offset + 2),
            )
        })?;
        let row: Vec<Value> = record.iter().map(Value::infer).collect();
        if row.iter().all(Value::is_null) {
            continue;
        }
        table.push_row(row);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::parse_csv;
    use crate::model::table::Tabular;
    use crate::model::value::Value;

    #[test]
    fn honors_header_row_offset() {
        let text = "Exported from EJM on 2024-01-01\nId,Ad title\n7,Economist\n8,Fellow\n";
        let table = parse_csv("EJM", text, 1, b',').unwrap();
        assert_eq!(table.columns(), ["Id", "Ad title"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0][0], Value::Int(7));
    }

    #[test]
    fn keeps_quoted_commas_and_pads_short_rows() {
        let text = "id,title,location\n1,\"Chair, Economics\"\n";
        let table = parse_csv("AJO", text, 0, b',').unwrap();
        assert_eq!(table.rows()[0][1], Value::from("Chair, Economics"));
        assert_eq!(table.rows()[0][2], Value::Null);
    }

    #[test]
    fn names_blank_headers_and_skips_blank_rows() {
        let text = "\u{feff}id,,title\n1,x,A\n,,\n2,y,B\n";
        let table = parse_csv("AJO", text, 0, b',').unwrap();
        assert_eq!(table.columns(), ["id", "Unnamed: 1", "title"]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn missing_header_is_malformed() {
        let err = parse_csv("EJM", "only one line\n", 1, b',').unwrap_err();
        assert_eq!(err.origin, "EJM");
        assert!(err.reason.contains("no header"));
    }
}
