//! User-editable custom source declarations (TOML).
//!
//! # Responsibility
//! - Parse `[[source]]` tables into descriptors with built-in loaders and
//!   generators.
//!
//! # Invariants
//! - A missing custom settings file means "no custom sources".
//! - Any parse or declaration error is a `ConfigurationError`.
//!
//! ```toml
//! [[source]]
//! origin = "HIGHERED"
//! expected_extension = "csv"
//! id_column = "Job ID"
//! url_template = "https://example.org/jobs/{origin_id}"
//! location_from = ["city", "country"]
//! to_drop = ["city", "country"]
//!
//! [source.loader]
//! kind = "csv"
//! header_row = 1
//!
//! [source.rename]
//! "Job ID" = "origin_id"
//! ```

use crate::error::ConfigurationError;
use crate::loader::{CsvLoader, SourceLoader, SpreadsheetLoader};
use crate::model::columns::ORIGIN_ID;
use crate::source::descriptor::{DownloadInfo, SourceDescriptor};
use crate::source::generators::{JoinColumns, UrlTemplate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CustomSettingsFile {
    #[serde(default, rename = "source")]
    sources: Vec<CustomSourceSpec>,
}

/// One declarative source as written by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomSourceSpec {
    pub origin: String,
    pub expected_extension: String,
    pub loader: LoaderSpec,
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub to_drop: Vec<String>,
    /// Raw identifier column; defaults to the column renamed to `origin_id`.
    #[serde(default)]
    pub id_column: Option<String>,
    #[serde(default)]
    pub url_template: Option<String>,
    #[serde(default)]
    pub location_from: Vec<String>,
    #[serde(default = "default_location_separator")]
    pub location_separator: String,
    #[serde(default = "default_true")]
    pub check_extension: bool,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub download_instructions: String,
    #[serde(default)]
    pub input_file_name: Option<String>,
    #[serde(default)]
    pub beta: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum LoaderSpec {
    Csv {
        #[serde(default)]
        header_row: usize,
        #[serde(default)]
        delimiter: Option<char>,
    },
    Spreadsheet {
        #[serde(default = "default_true")]
        tolerant: bool,
    },
}

fn default_true() -> bool {
    true
}

fn default_location_separator() -> String {
    ", ".to_string()
}

impl LoaderSpec {
    fn into_loader(self, origin: &str) -> Result<Arc<dyn SourceLoader>, String> {
        match self {
            Self::Csv {
                header_row,
                delimiter,
            } => {
                let mut loader = CsvLoader::new().with_header_row(header_row);
                if let Some(delimiter) = delimiter {
                    let byte = u8::try_from(delimiter)
                        .ok()
                        .filter(u8::is_ascii)
                        .ok_or_else(|| {
                            format!("source `{origin}` delimiter `{delimiter}` is not ASCII")
                        })?;
                    loader = loader.with_delimiter(byte);
                }
                Ok(Arc::new(loader))
            }
            Self::Spreadsheet { tolerant: true } => Ok(Arc::new(SpreadsheetLoader::tolerant())),
            Self::Spreadsheet { tolerant: false } => Ok(Arc::new(SpreadsheetLoader::strict())),
        }
    }
}

impl CustomSourceSpec {
    /// Converts the declaration into a descriptor.
    pub fn into_descriptor(self, path: &Path) -> Result<SourceDescriptor, ConfigurationError> {
        let origin = self.origin.trim().to_string();
        let loader = self.loader.into_loader(&origin).map_err(|message| {
            ConfigurationError::InvalidCustomSettings {
                path: path.to_path_buf(),
                message,
            }
        })?;
        let id_column = self.id_column.or_else(|| {
            self.rename
                .iter()
                .find(|(_, target)| target.as_str() == ORIGIN_ID)
                .map(|(raw, _)| raw.clone())
        });

        let mut builder = SourceDescriptor::builder(origin)
            .expected_extension(&self.expected_extension)
            .shared_loader(loader)
            .renames(self.rename)
            .drop_columns(self.to_drop)
            .unique_raw_id(id_column.unwrap_or_else(|| ORIGIN_ID.to_string()))
            .download(DownloadInfo {
                url: self.download_url,
                instructions: self.download_instructions,
                input_file_name: self.input_file_name,
            })
            .beta(self.beta);
        if !self.check_extension {
            builder = builder.without_path_validator();
        }
        if let Some(template) = self.url_template {
            builder = builder.url_generator(UrlTemplate::new(template));
        }
        if !self.location_from.is_empty() {
            builder = builder
                .location_generator(JoinColumns::new(self.location_from, self.location_separator));
        }
        builder.build()
    }
}

/// Parses custom source declarations; `path` is only used in messages.
pub fn parse_custom_sources(
    text: &str,
    path: &Path,
) -> Result<Vec<SourceDescriptor>, ConfigurationError> {
    let file: CustomSettingsFile =
        toml::from_str(text).map_err(|err| ConfigurationError::InvalidCustomSettings {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    file.sources
        .into_iter()
        .map(|spec| spec.into_descriptor(path))
        .collect()
}

/// Loads custom sources from disk; a missing file yields no sources.
pub fn load_custom_sources(path: &Path) -> Result<Vec<SourceDescriptor>, ConfigurationError> {
    if !path.exists() {
        log::info!(
            "event=custom_sources_load module=source status=skip path={}",
            path.display()
        );
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).map_err(|err| {
        ConfigurationError::InvalidCustomSettings {
            path: path.to_path_buf(),
            message: format!("cannot read file: {err}"),
        }
    })?;
    let sources = parse_custom_sources(&text, path)?;
    log::info!(
        "event=custom_sources_load module=source status=ok path={} count={}",
        path.display(),
        sources.len()
    );
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::parse_custom_sources;
    use crate::error::ConfigurationError;
    use std::path::Path;

    const SAMPLE: &str = r#"
[[source]]
origin = "HIGHERED"
expected_extension = ".CSV"
url_template = "https://example.org/jobs/{origin_id}"
location_from = ["city", "country"]
to_drop = ["city", "country"]

[source.loader]
kind = "csv"
header_row = 2
delimiter = ";"

[source.rename]
"Job ID" = "origin_id"
"Job Title" = "title"
"#;

    #[test]
    fn parses_declarative_source() {
        let sources = parse_custom_sources(SAMPLE, Path::new("custom.toml")).unwrap();
        assert_eq!(sources.len(), 1);
        let source = &sources[0];
        assert_eq!(source.origin(), "HIGHERED");
        assert_eq!(source.expected_extension(), "csv");
        assert_eq!(source.raw_id_column(), Some("Job ID"));
        assert!(source.url_generator().is_some());
        assert!(source.location_generator().is_some());
        assert_eq!(source.loader().kind(), "csv");
    }

    #[test]
    fn empty_file_has_no_sources() {
        assert!(parse_custom_sources("", Path::new("custom.toml"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = parse_custom_sources(
            "[[source]]\norigin = \"X\"\nexpected_extension = \"csv\"\ncolour = \"red\"\n[source.loader]\nkind = \"csv\"\n",
            Path::new("custom.toml"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidCustomSettings { .. }));
    }

    #[test]
    fn missing_file_yields_no_sources() {
        let dir = tempfile::tempdir().unwrap();
        let sources = super::load_custom_sources(&dir.path().join("absent.toml")).unwrap();
        assert!(sources.is_empty());
    }
}
