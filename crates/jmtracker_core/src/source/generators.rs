//! Column generators used when a canonical column is missing after renaming.
//!
//! Generators only read raw and renamed columns of their own row. They never
//! see columns produced by sibling generators, so the order in which missing
//! columns are generated does not matter.

use crate::merge::UnifiedStore;
use crate::model::record::NormalizedRecord;
use crate::model::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("valid placeholder regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct GeneratorError(pub String);

/// Computes one column value for one row.
///
/// `store` is the unified store as loaded before this run, or `None` on the
/// first session.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        row: &NormalizedRecord,
        store: Option<&UnifiedStore>,
    ) -> Result<Value, GeneratorError>;
}

impl<F> Generator for F
where
    F: Fn(&NormalizedRecord, Option<&UnifiedStore>) -> Result<Value, GeneratorError> + Send + Sync,
{
    fn generate(
        &self,
        row: &NormalizedRecord,
        store: Option<&UnifiedStore>,
    ) -> Result<Value, GeneratorError> {
        self(row, store)
    }
}

/// Fills `{column}` placeholders from the row, e.g.
/// `https://host/listing.php?JOE_ID={origin_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    template: String,
}

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Column names referenced by the template, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        PLACEHOLDER
            .captures_iter(&self.template)
            .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
            .collect()
    }
}

impl Generator for UrlTemplate {
    fn generate(
        &self,
        row: &NormalizedRecord,
        _store: Option<&UnifiedStore>,
    ) -> Result<Value, GeneratorError> {
        for column in self.placeholders() {
            if row.get(column).map_or(true, Value::is_null) {
                return Err(GeneratorError(format!(
                    "url template `{}` needs column `{column}`, which is empty",
                    self.template
                )));
            }
        }
        let url = PLACEHOLDER.replace_all(&self.template, |captures: &regex::Captures<'_>| {
            row.get(&captures[1])
                .map(|value| value.to_string().trim().to_string())
                .unwrap_or_default()
        });
        Ok(Value::Text(url.into_owned()))
    }
}

/// Joins the non-empty values of several columns, e.g. city, state and
/// country into one location string. Yields `Null` when all are empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinColumns {
    columns: Vec<String>,
    separator: String,
}

impl JoinColumns {
    pub fn new<I, S>(columns: I, separator: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            separator: separator.into(),
        }
    }

    /// City, state and country joined with `", "`.
    pub fn location() -> Self {
        Self::new(["city", "state", "country"], ", ")
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

impl Generator for JoinColumns {
    fn generate(
        &self,
        row: &NormalizedRecord,
        _store: Option<&UnifiedStore>,
    ) -> Result<Value, GeneratorError> {
        let parts: Vec<String> = self
            .columns
            .iter()
            .filter_map(|column| row.get(column))
            .filter(|value| !value.is_null())
            .map(|value| value.to_string().trim().to_string())
            .collect();
        if parts.is_empty() {
            return Ok(Value::Null);
        }
        Ok(Value::Text(parts.join(&self.separator)))
    }
}

#[cfg(test)]
mod tests {
    use super::{Generator, GeneratorError, JoinColumns, UrlTemplate};
    use crate::model::record::NormalizedRecord;
    use crate::model::value::Value;

    #[test]
    fn url_template_formats_integral_ids_without_fraction() {
        let template = UrlTemplate::new("https://www.aeaweb.org/joe/listing.php?JOE_ID={origin_id}");
        let row = NormalizedRecord::new().with("origin_id", Value::Float(42.0));
        assert_eq!(
            template.generate(&row, None).unwrap(),
            Value::from("https://www.aeaweb.org/joe/listing.php?JOE_ID=42")
        );
        assert_eq!(template.placeholders(), vec!["origin_id"]);
    }

    #[test]
    fn url_template_fails_on_empty_placeholder() {
        let template = UrlTemplate::new("https://example.org/{slug}");
        let err = template.generate(&NormalizedRecord::new(), None).unwrap_err();
        assert!(err.0.contains("`slug`"));
    }

    #[test]
    fn join_columns_skips_missing_parts() {
        let row = NormalizedRecord::new()
            .with("city", "Boston")
            .with("state", Value::Null)
            .with("country", "USA");
        assert_eq!(
            JoinColumns::location().generate(&row, None).unwrap(),
            Value::from("Boston, USA")
        );
        assert_eq!(
            JoinColumns::location().generate(&NormalizedRecord::new(), None).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn closures_are_generators() {
        let constant = |_: &NormalizedRecord, _: Option<&crate::merge::UnifiedStore>| -> Result<Value, GeneratorError> {
            Ok(Value::from("remote"))
        };
        assert_eq!(
            constant.generate(&NormalizedRecord::new(), None).unwrap(),
            Value::from("remote")
        );
    }
}
