//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define data access contracts used by services.
//! - Isolate SQLite query details from pipeline orchestration.
//!
//! # Invariants
//! - Repositories only accept connections with migrations applied.

pub mod posting_repo;
