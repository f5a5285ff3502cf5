//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate loaders, the normalizer and the merge manager into runs.
//! - Keep the CLI decoupled from pipeline internals.

pub mod ingest_service;
