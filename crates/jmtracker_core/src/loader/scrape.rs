//! Scraper collaborator seam.
//!
//! Scraping itself lives outside this crate; a scrape-based source binds an
//! action that returns a table already named per the source's convention.

use crate::model::table::RawTable;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scrape failed: {0}")]
pub struct ScrapeError(pub String);

/// Produces a raw table for sources without a downloadable file.
///
/// Invoked synchronously; the pipeline blocks until it returns.
pub trait ScrapeAction: Send + Sync {
    fn scrape(&self) -> Result<RawTable, ScrapeError>;
}

impl<F> ScrapeAction for F
where
    F: Fn() -> Result<RawTable, ScrapeError> + Send + Sync,
{
    fn scrape(&self) -> Result<RawTable, ScrapeError> {
        self()
    }
}
