//! Core ingestion pipeline for JMTracker.
//! This crate is the single source of truth for posting identity and
//! normalization invariants.

pub mod db;
pub mod error;
pub mod loader;
pub mod logging;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod repo;
pub mod service;
pub mod settings;
pub mod source;
pub mod validate;

pub use error::{ConfigurationError, MalformedInputError, MergeInvariantViolation, ValidationFailure};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use merge::{MergeReport, UnifiedStore};
pub use model::record::{NormalizedBatch, NormalizedRecord, OriginId, RecordKey};
pub use model::table::RawTable;
pub use model::value::Value;
pub use normalize::{normalize, NormalizeContext, NormalizeError};
pub use repo::posting_repo::{PostingRepository, RepoError, RepoResult, SqlitePostingRepository};
pub use service::ingest_service::{IngestError, IngestService, RunReport, SourceInput, SourceOutcome};
pub use settings::{Settings, SettingsError};
pub use source::{SourceDescriptor, SourceRegistry};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
