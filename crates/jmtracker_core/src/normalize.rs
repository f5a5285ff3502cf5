//! Column normalizer: raw table in, normalized batch out.
//!
//! # Responsibility
//! - Rename, drop and synthesize columns per [`SourceDescriptor`].
//! - Coerce identifier and deadline values into canonical types.
//! - Overwrite protected columns last.
//!
//! # Invariants
//! - Generators receive the renamed row, including columns scheduled for
//!   dropping, and never a column produced by another generator.
//! - Protected columns always hold pipeline-computed values on output.
//! - A required column with no source and no generator stays absent; the
//!   post-rename validator reports it.

use crate::error::MalformedInputError;
use crate::merge::UnifiedStore;
use crate::model::columns::{self, DEADLINE, ORIGIN, ORIGIN_ID, STATUS, UPDATED};
use crate::model::record::{NormalizedBatch, NormalizedRecord, OriginId, RecordKey};
use crate::model::table::RawTable;
use crate::model::value::Value;
use crate::source::generators::GeneratorError;
use crate::source::SourceDescriptor;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use thiserror::Error;

/// Status assigned to postings seen for the first time.
pub const STATUS_NEW: &str = "new";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y", "%B %d, %Y", "%b %d, %Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Malformed(#[from] MalformedInputError),
    #[error("generator for `{column}` failed on row {row} of `{origin}`: {source}")]
    Generator {
        origin: String,
        column: String,
        row: usize,
        #[source]
        source: GeneratorError,
    },
}

/// Run-level inputs to protected-column computation.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    /// Store as loaded before this run, if any.
    pub store: Option<&'a UnifiedStore>,
    /// Value written into `updated`.
    pub today: NaiveDate,
}

type ProtectedFn = fn(&str, &NormalizedRecord, &NormalizeContext<'_>) -> Value;

/// Protected columns, applied in order after every other step.
const PROTECTED: &[(&str, ProtectedFn)] = &[
    (ORIGIN, protected_origin),
    (STATUS, protected_status),
    (UPDATED, protected_updated),
];

fn protected_origin(origin: &str, _: &NormalizedRecord, _: &NormalizeContext<'_>) -> Value {
    Value::from(origin)
}

fn protected_status(origin: &str, record: &NormalizedRecord, ctx: &NormalizeContext<'_>) -> Value {
    let stored = record
        .origin_id()
        .map(|id| RecordKey::new(origin, id))
        .and_then(|key| ctx.store.and_then(|store| store.get(&key)))
        .and_then(|existing| existing.get(STATUS))
        .filter(|status| !status.is_null());
    stored.cloned().unwrap_or_else(|| Value::from(STATUS_NEW))
}

fn protected_updated(_: &str, _: &NormalizedRecord, ctx: &NormalizeContext<'_>) -> Value {
    Value::Date(ctx.today)
}

/// Normalizes one raw table for `descriptor`.
pub fn normalize(
    mut raw: RawTable,
    descriptor: &SourceDescriptor,
    ctx: &NormalizeContext<'_>,
) -> Result<NormalizedBatch, NormalizeError> {
    let origin = descriptor.origin();

    raw.rename_columns(descriptor.renaming_rules());
    if let Some(column) = raw.duplicate_column() {
        return Err(MalformedInputError::new(
            origin,
            format!("column `{column}` appears more than once after renaming"),
        )
        .into());
    }

    let to_drop = descriptor.to_drop();
    let mut kept: BTreeSet<String> = raw
        .columns()
        .iter()
        .filter(|column| !to_drop.contains(column.as_str()))
        .cloned()
        .collect();
    let generated: Vec<&str> = columns::canonical_columns()
        .filter(|column| !kept.contains(*column) && descriptor.generator(column).is_some())
        .collect();

    let mut records = Vec::with_capacity(raw.len());
    for (row, fields) in raw.into_row_maps().into_iter().enumerate() {
        let renamed = NormalizedRecord::from_fields(fields);
        let mut values = Vec::with_capacity(generated.len());
        for column in &generated {
            if let Some(generator) = descriptor.generator(column) {
                let value = generator
                    .generate(&renamed, ctx.store)
                    .map_err(|source| NormalizeError::Generator {
                        origin: origin.to_string(),
                        column: column.to_string(),
                        row,
                        source,
                    })?;
                values.push((*column, value));
            }
        }

        let mut record = renamed;
        for column in to_drop {
            record.remove(column);
        }
        for (column, value) in values {
            record.set(column, value);
        }
        coerce_origin_id(&mut record);
        coerce_deadline(origin, row, &mut record);
        for (column, compute) in PROTECTED {
            let value = compute(origin, &record, ctx);
            record.set(*column, value);
        }
        records.push(record);
    }

    kept.extend(generated.iter().map(|column| column.to_string()));
    kept.extend(PROTECTED.iter().map(|(column, _)| column.to_string()));

    log::debug!(
        "event=normalize module=normalize status=ok origin={} rows={} columns={}",
        origin,
        records.len(),
        kept.len()
    );
    Ok(NormalizedBatch {
        origin: origin.to_string(),
        columns: kept,
        records,
    })
}

fn coerce_origin_id(record: &mut NormalizedRecord) {
    let coerced = match record.get(ORIGIN_ID) {
        Some(value @ Value::Float(_)) => OriginId::from_value(value).map(|id| id.to_value()),
        _ => None,
    };
    if let Some(value) = coerced {
        record.set(ORIGIN_ID, value);
    }
}

fn coerce_deadline(origin: &str, row: usize, record: &mut NormalizedRecord) {
    let Some(value) = record.get(DEADLINE) else {
        return;
    };
    if value.is_null() {
        record.set(DEADLINE, Value::Null);
        return;
    }
    let coerced = match value {
        Value::Date(_) => return,
        Value::Text(text) => parse_date(text),
        // Spreadsheet date cells already arrive as dates; bare numbers are not day serials.
        Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Null => None,
    };
    match coerced {
        Some(date) => record.set(DEADLINE, Value::Date(date)),
        None => {
            log::warn!(
                "event=normalize module=normalize status=warn origin={} row={} column=deadline reason=unparseable value={}",
                origin,
                row,
                value
            );
            record.set(DEADLINE, Value::Null);
        }
    }
}

/// Parses a deadline written as a date or a date-time.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|datetime| datetime.date())
        })
        .or_else(|| text.get(..10).and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()))
}

#[cfg(test)]
mod tests {
    use super::{normalize, parse_date, NormalizeContext, NormalizeError};
    use crate::loader::CsvLoader;
    use crate::merge::UnifiedStore;
    use crate::model::record::NormalizedRecord;
    use crate::model::table::RawTable;
    use crate::model::value::Value;
    use crate::source::generators::GeneratorError;
    use crate::source::SourceDescriptor;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn failing(
        _: &NormalizedRecord,
        _: Option<&UnifiedStore>,
    ) -> Result<Value, GeneratorError> {
        Err(GeneratorError("boom".to_string()))
    }

    fn canonical_source() -> SourceDescriptor {
        SourceDescriptor::builder("TEST")
            .expected_extension("csv")
            .loader(CsvLoader::new())
            .build()
            .unwrap()
    }

    fn canonical_table(deadline: &str) -> RawTable {
        RawTable::from_columns([
            ("origin_id", vec![Value::Float(7.0)]),
            ("title", vec![Value::from("Economist")]),
            ("location", vec![Value::from("Oslo")]),
            ("institution", vec![Value::from("UiO")]),
            ("deadline", vec![Value::from(deadline)]),
            ("url", vec![Value::from("https://x")]),
            ("status", vec![Value::from("forged")]),
        ])
    }

    #[test]
    fn coerces_identifier_and_deadline() {
        let ctx = NormalizeContext { store: None, today: today() };
        let batch = normalize(canonical_table("12/15/2024"), &canonical_source(), &ctx).unwrap();
        let record = &batch.records[0];
        assert_eq!(record.get("origin_id"), Some(&Value::Int(7)));
        assert_eq!(
            record.get("deadline"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 12, 15).unwrap()))
        );
        assert_eq!(record.get("status"), Some(&Value::from("new")));
        assert_eq!(record.get("origin"), Some(&Value::from("TEST")));
        assert_eq!(record.get("updated"), Some(&Value::Date(today())));
    }

    #[test]
    fn missing_required_column_is_left_for_post_rename_validation() {
        let ctx = NormalizeContext { store: None, today: today() };
        let source = canonical_source();
        let table = RawTable::from_columns([("origin_id", vec![Value::Int(1)])]);
        let batch = normalize(table, &source, &ctx).expect("normalize keeps going without title");
        assert!(!batch.columns.contains("title"));
        assert!(batch.columns.contains("origin_id"));

        let err = source
            .post_rename_validator()
            .validate(&batch)
            .expect_err("post-rename validator reports the gap");
        assert!(err.reason.contains("title"), "unexpected reason: {}", err.reason);
    }

    #[test]
    fn numeric_deadline_becomes_null() {
        let ctx = NormalizeContext { store: None, today: today() };
        let table = RawTable::from_columns([
            ("origin_id", vec![Value::Int(3)]),
            ("deadline", vec![Value::infer("2024")]),
            ("url", vec![Value::from("https://x")]),
        ]);
        let batch = normalize(table, &canonical_source(), &ctx).unwrap();
        assert_eq!(batch.records[0].get("deadline"), Some(&Value::Null));
    }

    #[test]
    fn generator_failure_names_row_and_column() {
        let source = SourceDescriptor::builder("TEST")
            .expected_extension("csv")
            .loader(CsvLoader::new())
            .url_generator(failing)
            .build()
            .unwrap();
        let mut table = canonical_table("2024-12-15");
        table.rename_columns(&[("url".to_string(), "link".to_string())].into_iter().collect());
        let ctx = NormalizeContext { store: None, today: today() };
        let err = normalize(table, &source, &ctx).unwrap_err();
        match err {
            NormalizeError::Generator { column, row, .. } => {
                assert_eq!(column, "url");
                assert_eq!(row, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unparseable_deadline_becomes_null() {
        let ctx = NormalizeContext { store: None, today: today() };
        let batch = normalize(canonical_table("soon"), &canonical_source(), &ctx).unwrap();
        assert_eq!(batch.records[0].get("deadline"), Some(&Value::Null));
    }

    #[test]
    fn parses_supported_date_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 31);
        assert_eq!(parse_date("2024-01-31"), expected);
        assert_eq!(parse_date("01/31/2024"), expected);
        assert_eq!(parse_date("2024-01-31 23:59:00"), expected);
        assert_eq!(parse_date("January 31, 2024"), expected);
        assert_eq!(parse_date("next week"), None);
    }
}
