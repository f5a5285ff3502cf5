//! Posting repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Load the unified store at session start and persist it at session end.
//! - Keep a per-source log of ingestion runs.
//!
//! # Invariants
//! - `save_store` replaces the stored set atomically; readers never observe
//!   a half-written store.
//! - Read paths reject rows whose JSON or key columns disagree instead of
//!   masking them.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::error::MergeInvariantViolation;
use crate::merge::UnifiedStore;
use crate::model::record::{NormalizedRecord, OriginId};
use rusqlite::{params, Connection, Row, TransactionBehavior};
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("invalid persisted posting data: {0}")]
    InvalidData(String),
    #[error("cannot encode posting fields: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] MergeInvariantViolation),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Final state of one source within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRunStatus {
    Merged,
    Failed,
    Skipped,
}

impl SourceRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "merged" => Some(Self::Merged),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }
}

/// One row of the run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRunEntry {
    pub run_id: String,
    pub origin: String,
    pub status: SourceRunStatus,
    pub inserted: usize,
    pub updated: usize,
    pub rejected: usize,
    pub message: Option<String>,
    /// RFC 3339 timestamp.
    pub finished_at: String,
}

/// Repository interface for the persisted unified store.
pub trait PostingRepository {
    fn load_store(&self) -> RepoResult<UnifiedStore>;
    fn save_store(&mut self, store: &UnifiedStore) -> RepoResult<()>;
    fn record_runs(&mut self, entries: &[SourceRunEntry]) -> RepoResult<()>;
    /// Returns the newest run log rows first.
    fn recent_runs(&self, limit: u32) -> RepoResult<Vec<SourceRunEntry>>;
}

/// SQLite-backed posting repository.
pub struct SqlitePostingRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqlitePostingRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        let version = current_user_version(conn)?;
        if version < latest_version() {
            return Err(RepoError::InvalidData(format!(
                "connection schema version {version} is older than required {}",
                latest_version()
            )));
        }
        Ok(Self { conn })
    }
}

impl PostingRepository for SqlitePostingRepository<'_> {
    fn load_store(&self) -> RepoResult<UnifiedStore> {
        let mut stmt = self
            .conn
            .prepare("SELECT origin, origin_id, fields FROM postings ORDER BY position ASC;")?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_posting_row(row)?);
        }
        let store = UnifiedStore::from_records(records)?;
        log::info!(
            "event=store_load module=repo status=ok records={}",
            store.len()
        );
        Ok(store)
    }

    fn save_store(&mut self, store: &UnifiedStore) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM postings;", [])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO postings (origin, origin_id, position, fields)
                 VALUES (?1, ?2, ?3, ?4);",
            )?;
            for (position, record) in store.iter().enumerate() {
                let key = record.key().ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "record at position {position} has no identity key"
                    ))
                })?;
                insert.execute(params![
                    key.origin,
                    encode_origin_id(&key.origin_id)?,
                    position as i64,
                    serde_json::to_string(record)?,
                ])?;
            }
        }
        tx.commit()?;
        log::info!(
            "event=store_save module=repo status=ok records={}",
            store.len()
        );
        Ok(())
    }

    fn record_runs(&mut self, entries: &[SourceRunEntry]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        for entry in entries {
            tx.execute(
                "INSERT OR REPLACE INTO source_runs (
                    run_id, origin, status, inserted, updated, rejected, message, finished_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
                params![
                    entry.run_id,
                    entry.origin,
                    entry.status.as_str(),
                    entry.inserted as i64,
                    entry.updated as i64,
                    entry.rejected as i64,
                    entry.message,
                    entry.finished_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn recent_runs(&self, limit: u32) -> RepoResult<Vec<SourceRunEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, origin, status, inserted, updated, rejected, message, finished_at
             FROM source_runs
             ORDER BY finished_at DESC, rowid DESC
             LIMIT ?1;",
        )?;
        let mut rows = stmt.query([limit])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_run_row(row)?);
        }
        Ok(entries)
    }
}

fn encode_origin_id(origin_id: &OriginId) -> RepoResult<String> {
    // JSON keeps `5` and `"5"` distinct in the key column.
    Ok(serde_json::to_string(origin_id)?)
}

fn parse_posting_row(row: &Row<'_>) -> RepoResult<NormalizedRecord> {
    let origin: String = row.get("origin")?;
    let origin_id: String = row.get("origin_id")?;
    let fields: String = row.get("fields")?;
    let record: NormalizedRecord = serde_json::from_str(&fields).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid fields JSON for posting {origin}#{origin_id}: {err}"
        ))
    })?;
    let key = record.key().ok_or_else(|| {
        RepoError::InvalidData(format!("posting {origin}#{origin_id} has no identity key"))
    })?;
    if key.origin != origin || encode_origin_id(&key.origin_id)? != origin_id {
        return Err(RepoError::InvalidData(format!(
            "posting {origin}#{origin_id} stores fields for {key}"
        )));
    }
    Ok(record)
}

fn parse_run_row(row: &Row<'_>) -> RepoResult<SourceRunEntry> {
    let status_text: String = row.get("status")?;
    let status = SourceRunStatus::parse(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid run status `{status_text}` in source_runs.status"))
    })?;
    Ok(SourceRunEntry {
        run_id: row.get("run_id")?,
        origin: row.get("origin")?,
        status,
        inserted: count_column(row, "inserted")?,
        updated: count_column(row, "updated")?,
        rejected: count_column(row, "rejected")?,
        message: row.get("message")?,
        finished_at: row.get("finished_at")?,
    })
}

fn count_column(row: &Row<'_>, column: &str) -> RepoResult<usize> {
    let value: i64 = row.get(column)?;
    usize::try_from(value).map_err(|_| {
        RepoError::InvalidData(format!("negative count `{value}` in source_runs.{column}"))
    })
}

#[cfg(test)]
mod tests {
    use super::{PostingRepository, SourceRunEntry, SourceRunStatus, SqlitePostingRepository};
    use crate::db::open_db_in_memory;
    use crate::merge::UnifiedStore;
    use crate::model::record::{NormalizedRecord, RecordKey};
    use crate::model::value::Value;
    use chrono::NaiveDate;

    fn posting(origin: &str, id: i64) -> NormalizedRecord {
        NormalizedRecord::new()
            .with("origin", origin)
            .with("origin_id", id)
            .with("title", "Assistant Professor")
            .with("deadline", NaiveDate::from_ymd_opt(2024, 11, 1).unwrap())
    }

    #[test]
    fn store_round_trips_with_typed_values() {
        let mut conn = open_db_in_memory().unwrap();
        let mut repo = SqlitePostingRepository::try_new(&mut conn).unwrap();
        let store =
            UnifiedStore::from_records(vec![posting("EJM", 2), posting("AEA", 1)]).unwrap();
        repo.save_store(&store).unwrap();

        let loaded = repo.load_store().unwrap();
        assert_eq!(loaded.records(), store.records());
        assert_eq!(
            loaded.get(&RecordKey::new("EJM", 2)).unwrap().get("deadline"),
            Some(&Value::Date(NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()))
        );
    }

    #[test]
    fn save_replaces_previous_contents() {
        let mut conn = open_db_in_memory().unwrap();
        let mut repo = SqlitePostingRepository::try_new(&mut conn).unwrap();
        repo.save_store(&UnifiedStore::from_records(vec![posting("EJM", 1)]).unwrap())
            .unwrap();
        repo.save_store(&UnifiedStore::from_records(vec![posting("AEA", 9)]).unwrap())
            .unwrap();
        let loaded = repo.load_store().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains(&RecordKey::new("AEA", 9)));
    }

    #[test]
    fn run_log_round_trips() {
        let mut conn = open_db_in_memory().unwrap();
        let mut repo = SqlitePostingRepository::try_new(&mut conn).unwrap();
        let entry = SourceRunEntry {
            run_id: "run-1".to_string(),
            origin: "EJM".to_string(),
            status: SourceRunStatus::Failed,
            inserted: 0,
            updated: 0,
            rejected: 0,
            message: Some("bad file".to_string()),
            finished_at: "2024-03-01T10:00:00+00:00".to_string(),
        };
        repo.record_runs(std::slice::from_ref(&entry)).unwrap();
        assert_eq!(repo.recent_runs(10).unwrap(), vec![entry]);
    }
}
