//! Runtime settings loaded from TOML.
//!
//! Every key is optional; missing keys fall back to [`Settings::default`].

use crate::merge::DEFAULT_MAX_MESSAGES;
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings `{}`: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings `{}`: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding downloaded source files.
    pub input_dir: PathBuf,
    /// Directory of the persisted store and logs.
    pub storage_dir: PathBuf,
    pub custom_settings_path: PathBuf,
    /// When true, a custom source replaces the default with the same origin.
    pub custom_overrides_default: bool,
    /// Run date; defaults to the local date.
    pub today: Option<NaiveDate>,
    pub log_level: String,
    /// Rejection messages kept per merge report.
    pub max_report_messages: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            storage_dir: PathBuf::from("storage"),
            custom_settings_path: PathBuf::from("custom_sources.toml"),
            custom_overrides_default: false,
            today: None,
            log_level: "info".to_string(),
            max_report_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

impl Settings {
    /// Loads settings from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, SettingsError> {
        toml::from_str(text).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Default database location inside the storage directory.
    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join("postings.sqlite3")
    }

    /// Resolves an input file name against the input directory.
    pub fn input_path(&self, file_name: &str) -> PathBuf {
        self.input_dir.join(file_name)
    }
}
