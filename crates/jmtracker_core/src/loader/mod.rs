//! Source loader adapters.
//!
//! # Responsibility
//! - Turn a file path (or a scraper collaborator) into a [`RawTable`].
//! - Tolerate the known irregularities of each format instead of failing.
//!
//! # Invariants
//! - A file that cannot be parsed at all yields `MalformedInputError` naming
//!   the source and the path; loaders never panic on bad input.
//! - Loaders do not rename, drop or validate columns.

mod csv;
mod scrape;
mod spreadsheet;

pub use self::csv::{parse_csv, CsvLoader};
pub use scrape::{ScrapeAction, ScrapeError};
pub use spreadsheet::{table_from_grid, SpreadsheetLoader};

use crate::error::MalformedInputError;
use crate::model::table::RawTable;
use std::path::Path;

/// Uniform "path -> raw table" contract.
pub trait SourceLoader: Send + Sync {
    /// Short format name used in logs, e.g. `csv`.
    fn kind(&self) -> &'static str;

    fn load(&self, origin: &str, path: &Path) -> Result<RawTable, MalformedInputError>;
}

impl std::fmt::Debug for dyn SourceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SourceLoader({})", self.kind())
    }
}
