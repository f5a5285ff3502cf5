//! Ingestion use-case service.
//!
//! # Responsibility
//! - Drive one source through load, validation, normalization and merge.
//! - Run all registered sources in registry order, isolating per-source
//!   failures from fatal ones.
//!
//! # Invariants
//! - A source is fully merged before the next one starts.
//! - Only `ConfigurationError` and `MergeInvariantViolation` abort a run.

use crate::error::{ConfigurationError, MalformedInputError, MergeInvariantViolation, ValidationFailure};
use crate::loader::ScrapeError;
use crate::merge::{MergeReport, UnifiedStore, DEFAULT_MAX_MESSAGES};
use crate::model::table::RawTable;
use crate::normalize::{normalize, NormalizeContext, NormalizeError};
use crate::repo::posting_repo::{SourceRunEntry, SourceRunStatus};
use crate::settings::Settings;
use crate::source::{SourceDescriptor, SourceRegistry};
use chrono::{NaiveDate, Utc};
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// Where a source's raw table comes from in this run.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceInput {
    /// A downloaded file, checked by the path validator before loading.
    File(PathBuf),
    /// A table produced elsewhere, e.g. by an external scraper.
    Table(RawTable),
    /// Invoke the descriptor's download action.
    Scrape,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Merge(#[from] MergeInvariantViolation),
    #[error(transparent)]
    Malformed(#[from] MalformedInputError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("source `{origin}` could not be scraped: {source}")]
    Scrape {
        origin: String,
        #[source]
        source: ScrapeError,
    },
    #[error("source `{0}` has no download action to scrape with")]
    NoDownloadAction(String),
}

impl IngestError {
    /// Returns whether the whole run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Merge(_))
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Merge(_) => "merge_invariant",
            Self::Malformed(_) => "malformed_input",
            Self::Validation(_) => "validation",
            Self::Normalize(NormalizeError::Malformed(_)) => "malformed_input",
            Self::Normalize(NormalizeError::Generator { .. }) => "generator",
            Self::Scrape { .. } | Self::NoDownloadAction(_) => "scrape",
        }
    }
}

/// Result of one source within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub origin: String,
    pub status: SourceRunStatus,
    pub report: Option<MergeReport>,
    pub message: Option<String>,
}

/// Result of one run over the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcomes: Vec<SourceOutcome>,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == SourceRunStatus::Failed)
    }

    /// Flattens the report into run-log rows stamped with `finished_at`.
    pub fn to_run_entries(&self, finished_at: &str) -> Vec<SourceRunEntry> {
        self.outcomes
            .iter()
            .map(|outcome| {
                let report = outcome.report.clone().unwrap_or_default();
                SourceRunEntry {
                    run_id: self.run_id.to_string(),
                    origin: outcome.origin.clone(),
                    status: outcome.status,
                    inserted: report.inserted,
                    updated: report.updated,
                    rejected: report.rejected,
                    message: outcome.message.clone(),
                    finished_at: finished_at.to_string(),
                }
            })
            .collect()
    }
}

/// Use-case service owning the registry and the session's unified store.
pub struct IngestService {
    registry: SourceRegistry,
    store: UnifiedStore,
    /// Whether `store` was loaded from a previous session.
    has_prior_state: bool,
    today: NaiveDate,
    max_messages: usize,
}

impl IngestService {
    /// Creates a service for a first session without persisted state.
    pub fn new(registry: SourceRegistry, today: NaiveDate) -> Self {
        Self {
            registry,
            store: UnifiedStore::new(),
            has_prior_state: false,
            today,
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }

    /// Creates a service continuing from a persisted store.
    pub fn with_store(registry: SourceRegistry, store: UnifiedStore, today: NaiveDate) -> Self {
        Self {
            store,
            has_prior_state: true,
            ..Self::new(registry, today)
        }
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &UnifiedStore {
        &self.store
    }

    pub fn into_store(self) -> UnifiedStore {
        self.store
    }

    /// Runs every registered source with an input, in registry order.
    ///
    /// Sources without an input are reported as skipped. An input for an
    /// unknown origin, or a second input for the same origin, is a
    /// configuration error raised before any work.
    pub fn run(
        &mut self,
        inputs: impl IntoIterator<Item = (String, SourceInput)>,
    ) -> Result<RunReport, IngestError> {
        let mut by_origin: HashMap<String, SourceInput> = HashMap::new();
        for (origin, input) in inputs {
            let origin = origin.trim().to_string();
            if !self.registry.contains(&origin) {
                return Err(ConfigurationError::UnknownOrigin(origin).into());
            }
            if by_origin.contains_key(&origin) {
                return Err(ConfigurationError::DuplicateInput(origin).into());
            }
            by_origin.insert(origin, input);
        }
        let mut inputs = by_origin;

        let run_id = Uuid::new_v4();
        info!("event=ingest_run module=service status=start run_id={run_id}");
        let origins = self.registry.origins();
        let mut outcomes = Vec::with_capacity(origins.len());
        for origin in origins {
            let Some(input) = inputs.remove(&origin) else {
                outcomes.push(SourceOutcome {
                    origin,
                    status: SourceRunStatus::Skipped,
                    report: None,
                    message: None,
                });
                continue;
            };
            match self.ingest_source(&origin, input) {
                Ok(report) => outcomes.push(SourceOutcome {
                    origin,
                    status: SourceRunStatus::Merged,
                    report: Some(report),
                    message: None,
                }),
                Err(err) if err.is_fatal() => {
                    error!(
                        "event=ingest_run module=service status=error run_id={run_id} origin={origin} error_code={} error={err}",
                        err.code()
                    );
                    return Err(err);
                }
                Err(err) => outcomes.push(SourceOutcome {
                    origin,
                    status: SourceRunStatus::Failed,
                    report: None,
                    message: Some(err.to_string()),
                }),
            }
        }

        info!(
            "event=ingest_run module=service status=ok run_id={} sources={} failed={} records={}",
            run_id,
            outcomes.len(),
            outcomes
                .iter()
                .filter(|outcome| outcome.status == SourceRunStatus::Failed)
                .count(),
            self.store.len()
        );
        Ok(RunReport { run_id, outcomes })
    }

    /// Loads, validates, normalizes and merges one source.
    pub fn ingest_source(
        &mut self,
        origin: &str,
        input: SourceInput,
    ) -> Result<MergeReport, IngestError> {
        let started_at = Instant::now();
        let descriptor = self.registry.get(origin)?;
        info!(
            "event=source_ingest module=service status=start origin={}",
            descriptor.origin()
        );

        let result = self.ingest_with(&descriptor, input);
        match &result {
            Ok(report) => info!(
                "event=source_ingest module=service status=ok origin={} duration_ms={} inserted={} updated={} rejected={}",
                descriptor.origin(),
                started_at.elapsed().as_millis(),
                report.inserted,
                report.updated,
                report.rejected
            ),
            Err(err) => warn!(
                "event=source_ingest module=service status=error origin={} duration_ms={} error_code={} error={}",
                descriptor.origin(),
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        result
    }

    fn ingest_with(
        &mut self,
        descriptor: &SourceDescriptor,
        input: SourceInput,
    ) -> Result<MergeReport, IngestError> {
        let raw = load_raw(descriptor, input)?;
        if let Some(validator) = descriptor.raw_validator() {
            validator.validate(&raw)?.into_result()?;
        }

        let ctx = NormalizeContext {
            store: self.has_prior_state.then_some(&self.store),
            today: self.today,
        };
        let batch = normalize(raw, descriptor, &ctx)?;
        descriptor
            .post_rename_validator()
            .validate(&batch)?
            .into_result()?;

        Ok(self.store.merge(batch, descriptor, self.max_messages)?)
    }
}

fn load_raw(descriptor: &SourceDescriptor, input: SourceInput) -> Result<RawTable, IngestError> {
    let origin = descriptor.origin();
    match input {
        SourceInput::File(path) => {
            if let Some(validator) = descriptor.path_validator() {
                validator.validate(path.as_path())?.into_result()?;
            }
            let table = descriptor.loader().load(origin, &path)?;
            info!(
                "event=source_load module=service status=ok origin={} loader={} rows={} path={}",
                origin,
                descriptor.loader().kind(),
                table.len(),
                path.display()
            );
            Ok(table)
        }
        SourceInput::Table(table) => Ok(table),
        SourceInput::Scrape => {
            let action = descriptor
                .download_action()
                .ok_or_else(|| IngestError::NoDownloadAction(origin.to_string()))?;
            action.scrape().map_err(|source| IngestError::Scrape {
                origin: origin.to_string(),
                source,
            })
        }
    }
}

/// Builds inputs from cached files in the input directory.
///
/// Sources whose cached file is missing are left out; sources with a
/// download action but no cached file are scraped.
pub fn cached_inputs(registry: &SourceRegistry, settings: &Settings) -> Vec<(String, SourceInput)> {
    registry
        .iter()
        .filter_map(|descriptor| {
            let cached = descriptor
                .download()
                .input_file_name
                .as_deref()
                .map(|name| settings.input_path(name))
                .filter(|path| path.is_file());
            let input = match (cached, descriptor.download_action()) {
                (Some(path), _) => SourceInput::File(path),
                (None, Some(_)) => SourceInput::Scrape,
                (None, None) => return None,
            };
            Some((descriptor.origin().to_string(), input))
        })
        .collect()
}

/// Current UTC time formatted for the run log.
pub fn finished_at_now() -> String {
    Utc::now().to_rfc3339()
}
