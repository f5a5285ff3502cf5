//! Tabular domain model for job-posting ingestion.
//!
//! # Responsibility
//! - Define the typed cell value shared by raw and normalized tables.
//! - Define the canonical column vocabulary and the record identity key.
//!
//! # Invariants
//! - A record is identified by `(origin, origin_id)`, never by `origin_id`
//!   alone.
//! - Protected columns are owned by the pipeline, never by source data.

pub mod columns;
pub mod record;
pub mod table;
pub mod value;
