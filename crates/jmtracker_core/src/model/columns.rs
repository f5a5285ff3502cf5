//! Canonical column vocabulary.
//!
//! # Invariants
//! - Required columns must exist in every batch that passes post-rename
//!   validation.
//! - Protected columns are overwritten last and can never be renamed into.

pub const ORIGIN_ID: &str = "origin_id";
pub const TITLE: &str = "title";
pub const LOCATION: &str = "location";
pub const INSTITUTION: &str = "institution";
pub const DEADLINE: &str = "deadline";
pub const URL: &str = "url";

pub const SECTION: &str = "section";
pub const DIVISION: &str = "division";
pub const DEPARTMENT: &str = "department";
pub const KEYWORDS: &str = "keywords";
pub const FULL_TEXT: &str = "full_text";

pub const ORIGIN: &str = "origin";
pub const STATUS: &str = "status";
pub const UPDATED: &str = "updated";

/// Columns every normalized posting must carry.
pub const REQUIRED_COLUMNS: &[&str] = &[ORIGIN_ID, TITLE, LOCATION, INSTITUTION, DEADLINE, URL];

/// Columns surfaced to users when a source provides them.
pub const OPTIONAL_COLUMNS: &[&str] = &[SECTION, DIVISION, DEPARTMENT, KEYWORDS, FULL_TEXT];

/// Columns computed by the pipeline regardless of input content.
pub const PROTECTED_COLUMNS: &[&str] = &[ORIGIN, STATUS, UPDATED];

/// Required columns followed by optional ones, in declaration order.
pub fn canonical_columns() -> impl Iterator<Item = &'static str> {
    REQUIRED_COLUMNS.iter().chain(OPTIONAL_COLUMNS).copied()
}

pub fn is_protected(column: &str) -> bool {
    PROTECTED_COLUMNS.contains(&column)
}

pub fn is_canonical(column: &str) -> bool {
    canonical_columns().any(|name| name == column)
}
