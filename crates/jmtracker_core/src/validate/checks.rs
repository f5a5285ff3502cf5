//! Atomic checks: file extension, unique identifier, required columns.

use crate::error::MalformedInputError;
use crate::model::record::OriginId;
use crate::model::table::Tabular;
use crate::validate::{Check, CheckResult, Verdict};
use std::collections::BTreeMap;
use std::path::Path;

const MAX_LISTED_DUPLICATES: usize = 5;

/// Normalizes a declared extension: trimmed, lower-case, no leading period.
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Passes iff the path extension matches, case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionCheck {
    expected: String,
}

impl ExtensionCheck {
    pub fn new(expected: &str) -> Self {
        Self {
            expected: normalize_extension(expected),
        }
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }
}

impl Check<Path> for ExtensionCheck {
    fn name(&self) -> &'static str {
        "extension"
    }

    fn check(&self, input: &Path, label: &str) -> CheckResult {
        let actual = input
            .extension()
            .and_then(|ext| ext.to_str())
            .map(normalize_extension)
            .unwrap_or_default();
        if actual == self.expected {
            return Ok(Verdict::Pass);
        }
        let found = if actual.is_empty() {
            "no extension".to_string()
        } else {
            format!("`.{actual}`")
        };
        Ok(Verdict::fail(
            label,
            format!(
                "{label} expects a `.{}` file, but `{}` has {found}",
                self.expected,
                input.display()
            ),
        ))
    }
}

/// Passes iff every value in the identifier column is unique and, unless
/// allowed, non-null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueIdCheck {
    column: String,
    allow_null: bool,
}

impl UniqueIdCheck {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            allow_null: false,
        }
    }

    /// Tolerates null identifiers; nulls are then exempt from duplication.
    pub fn allowing_null(mut self) -> Self {
        self.allow_null = true;
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

impl<T: Tabular + ?Sized> Check<T> for UniqueIdCheck {
    fn name(&self) -> &'static str {
        "unique_id"
    }

    fn check(&self, input: &T, label: &str) -> CheckResult {
        let values = input.column_values(&self.column).ok_or_else(|| {
            MalformedInputError::new(
                label,
                format!("identifier column `{}` is absent", self.column),
            )
        })?;

        let mut nulls = 0usize;
        let mut counts: BTreeMap<OriginId, usize> = BTreeMap::new();
        for value in values {
            if value.is_null() {
                nulls += 1;
                continue;
            }
            // Int(5) and Float(5.0) are the same identifier.
            let id = OriginId::from_value(value).unwrap_or_else(|| OriginId::Text(value.to_string()));
            *counts.entry(id).or_default() += 1;
        }

        if nulls > 0 && !self.allow_null {
            return Ok(Verdict::fail(
                label,
                format!(
                    "{label} has {nulls} posting(s) with an empty identifier in column `{}`",
                    self.column
                ),
            ));
        }

        let duplicates: Vec<String> = counts
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(id, _)| id.to_string())
            .collect();
        if duplicates.is_empty() {
            return Ok(Verdict::Pass);
        }

        let mut listed = duplicates
            .iter()
            .take(MAX_LISTED_DUPLICATES)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if duplicates.len() > MAX_LISTED_DUPLICATES {
            listed.push_str(", ...");
        }
        Ok(Verdict::fail(
            label,
            format!(
                "{label} identifiers in column `{}` are not unique (duplicated: {listed})",
                self.column
            ),
        ))
    }
}

/// Reports missing columns as malformed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredColumnsCheck {
    columns: Vec<String>,
}

impl RequiredColumnsCheck {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

impl<T: Tabular + ?Sized> Check<T> for RequiredColumnsCheck {
    fn name(&self) -> &'static str {
        "required_columns"
    }

    fn check(&self, input: &T, label: &str) -> CheckResult {
        let missing: Vec<&str> = self
            .columns
            .iter()
            .filter(|column| !input.has_column(column))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(Verdict::Pass);
        }
        Err(MalformedInputError::new(
            label,
            format!(
                "required column(s) missing with no generator available: {}",
                missing.join(", ")
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_extension, ExtensionCheck, RequiredColumnsCheck, UniqueIdCheck};
    use crate::model::table::RawTable;
    use crate::model::value::Value;
    use crate::validate::{Check, Verdict};
    use std::path::Path;

    #[test]
    fn normalize_extension_strips_period_and_case() {
        assert_eq!(normalize_extension(" .XLSX "), "xlsx");
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let check = ExtensionCheck::new("xlsx");
        let verdict = check.check(Path::new("/tmp/joe.XLSX"), "AEA").unwrap();
        assert!(verdict.is_pass());
    }

    #[test]
    fn extension_check_names_source_and_both_extensions() {
        let check = ExtensionCheck::new("csv");
        match check.check(Path::new("/tmp/ejm.xlsx"), "EJM").unwrap() {
            Verdict::Fail(failure) => {
                assert!(failure.message.contains("EJM"));
                assert!(failure.message.contains(".csv"));
                assert!(failure.message.contains(".xlsx"));
            }
            Verdict::Pass => panic!("mismatched extension must fail"),
        }
    }

    #[test]
    fn extension_check_rejects_missing_extension() {
        let check = ExtensionCheck::new("csv");
        let verdict = check.check(Path::new("/tmp/ejm"), "EJM").unwrap();
        assert!(!verdict.is_pass());
    }

    #[test]
    fn unique_id_treats_integral_float_and_int_as_same_id() {
        let table = RawTable::from_columns([("Id", vec![Value::Int(3), Value::Float(3.0)])]);
        let verdict = UniqueIdCheck::new("Id").check(&table, "EJM").unwrap();
        assert!(!verdict.is_pass());
    }

    #[test]
    fn unique_id_rejects_null_unless_allowed() {
        let table = RawTable::from_columns([("Id", vec![Value::Int(1), Value::Null])]);
        assert!(!UniqueIdCheck::new("Id").check(&table, "EJM").unwrap().is_pass());
        assert!(UniqueIdCheck::new("Id")
            .allowing_null()
            .check(&table, "EJM")
            .unwrap()
            .is_pass());
    }

    #[test]
    fn unique_id_reports_absent_column_as_malformed() {
        let table = RawTable::from_columns([("other", vec![Value::Int(1)])]);
        let err = UniqueIdCheck::new("Id").check(&table, "EJM").unwrap_err();
        assert_eq!(err.origin, "EJM");
        assert!(err.reason.contains("`Id`"));
    }

    #[test]
    fn required_columns_lists_missing_names() {
        let table = RawTable::from_columns([("title", vec![Value::from("x")])]);
        let err = RequiredColumnsCheck::new(["title", "url", "deadline"])
            .check(&table, "AEA")
            .unwrap_err();
        assert!(err.reason.contains("url, deadline"));
    }
}
