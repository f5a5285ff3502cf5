//! Pipeline error taxonomy.
//!
//! # Responsibility
//! - Separate fatal errors (configuration, merge invariant) from per-source
//!   failures (malformed input, validation).
//!
//! # Invariants
//! - Expected validation outcomes are values (`Verdict::Fail`), never
//!   `MalformedInputError`.
//! - `MergeInvariantViolation` is never recovered from inside the pipeline.

use crate::model::record::RecordKey;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Static configuration is unusable; startup must halt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("source origin must not be empty")]
    EmptyOrigin,
    #[error("source origin registered twice: {0}")]
    DuplicateOrigin(String),
    #[error("source `{origin}` is missing required field `{field}`")]
    MissingField { origin: String, field: &'static str },
    #[error("source `{origin}` declares invalid expected extension `{extension}`")]
    InvalidExtension { origin: String, extension: String },
    #[error("source `{origin}` renames both `{first}` and `{second}` to `{target}`")]
    ManyToOneRename {
        origin: String,
        target: String,
        first: String,
        second: String,
    },
    #[error("source `{origin}` renames `{column}` to both `{first}` and `{second}`")]
    ConflictingRename {
        origin: String,
        column: String,
        first: String,
        second: String,
    },
    #[error("source `{origin}` renames `{column}` into protected column `{target}`")]
    ProtectedRenameTarget {
        origin: String,
        column: String,
        target: String,
    },
    #[error("source `{origin}` declares a generator for `{column}`, which is neither canonical nor protected")]
    UnknownGeneratorColumn { origin: String, column: String },
    #[error("no source registered for origin `{0}`")]
    UnknownOrigin(String),
    #[error("run received more than one input for origin `{0}`")]
    DuplicateInput(String),
    #[error("custom source settings `{}` are invalid: {message}", .path.display())]
    InvalidCustomSettings { path: PathBuf, message: String },
}

/// Input for one source cannot be interpreted at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed input from `{origin}`{}: {reason}", describe_path(.path))]
pub struct MalformedInputError {
    pub origin: String,
    pub path: Option<PathBuf>,
    pub reason: String,
}

impl MalformedInputError {
    pub fn new(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: None,
            reason: reason.into(),
        }
    }

    pub fn at_path(
        origin: impl Into<String>,
        path: impl AsRef<Path>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            path: Some(path.as_ref().to_path_buf()),
            reason: reason.into(),
        }
    }
}

fn describe_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|path| format!(" at `{}`", path.display()))
        .unwrap_or_default()
}

/// A composed validator rejected the input; the source run is aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationFailure {
    pub origin: String,
    pub message: String,
}

impl ValidationFailure {
    pub fn new(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

/// The unified store lost its `(origin, origin_id)` uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeInvariantViolation {
    #[error("batch from `{origin}` carries key {key} more than once")]
    DuplicateKeyInBatch { origin: String, key: RecordKey },
    #[error("batch record claims origin `{found}` while merging source `{expected}`")]
    ForeignOrigin { expected: String, found: String },
    #[error("unified store index is inconsistent after merge: {0}")]
    InconsistentIndex(String),
}
