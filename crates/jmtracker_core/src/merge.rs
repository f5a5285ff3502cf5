//! Unified store and merge/identity rules.
//!
//! # Responsibility
//! - Hold every normalized posting keyed by `(origin, origin_id)`.
//! - Integrate one normalized batch at a time through [`UnifiedStore::merge`].
//!
//! # Invariants
//! - `index` maps every record key to its position and nothing else.
//! - A batch is checked fully before the store is touched, so a fatal
//!   violation leaves the store unchanged.
//!
//! # See also
//! - `repo::posting_repo` for persistence of the store.

use crate::error::MergeInvariantViolation;
use crate::model::record::{NormalizedBatch, NormalizedRecord, RecordKey};
use crate::source::SourceDescriptor;
use std::collections::{HashMap, HashSet};

/// Default number of rejection messages kept in a [`MergeReport`].
pub const DEFAULT_MAX_MESSAGES: usize = 10;

/// Outcome of merging one batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeReport {
    pub origin: String,
    pub inserted: usize,
    pub updated: usize,
    pub rejected: usize,
    /// First rejection messages, capped by the caller's limit.
    pub messages: Vec<String>,
}

impl MergeReport {
    fn new(origin: &str) -> Self {
        Self {
            origin: origin.to_string(),
            ..Self::default()
        }
    }

    fn reject(&mut self, message: String, max_messages: usize) {
        self.rejected += 1;
        if self.messages.len() < max_messages {
            self.messages.push(message);
        }
    }

    pub fn merged(&self) -> usize {
        self.inserted + self.updated
    }
}

/// All postings known to the session.
#[derive(Debug, Clone, Default)]
pub struct UnifiedStore {
    records: Vec<NormalizedRecord>,
    index: HashMap<RecordKey, usize>,
}

impl UnifiedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from persisted records.
    pub fn from_records(records: Vec<NormalizedRecord>) -> Result<Self, MergeInvariantViolation> {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            let key = record.key().ok_or_else(|| {
                MergeInvariantViolation::InconsistentIndex(format!(
                    "record at position {position} has no identity key"
                ))
            })?;
            if index.insert(key.clone(), position).is_some() {
                return Err(MergeInvariantViolation::InconsistentIndex(format!(
                    "key {key} stored more than once"
                )));
            }
        }
        Ok(Self { records, index })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&NormalizedRecord> {
        self.index.get(key).map(|position| &self.records[*position])
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<NormalizedRecord> {
        self.records
    }

    pub fn records_for_origin<'a>(
        &'a self,
        origin: &'a str,
    ) -> impl Iterator<Item = &'a NormalizedRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| record.origin() == Some(origin))
    }

    /// Integrates `batch` produced for `descriptor`.
    ///
    /// Existing keys are upserted column-wise; new keys are appended.
    /// Records without a usable `origin_id` are rejected and reported.
    pub fn merge(
        &mut self,
        batch: NormalizedBatch,
        descriptor: &SourceDescriptor,
        max_messages: usize,
    ) -> Result<MergeReport, MergeInvariantViolation> {
        let origin = descriptor.origin();
        if batch.origin != origin {
            return Err(MergeInvariantViolation::ForeignOrigin {
                expected: origin.to_string(),
                found: batch.origin,
            });
        }

        let mut report = MergeReport::new(origin);
        let mut accepted = Vec::with_capacity(batch.records.len());
        let mut seen = HashSet::with_capacity(batch.records.len());
        for (row, record) in batch.records.into_iter().enumerate() {
            match record.origin() {
                Some(found) if found == origin => {}
                found => {
                    return Err(MergeInvariantViolation::ForeignOrigin {
                        expected: origin.to_string(),
                        found: found.unwrap_or_default().to_string(),
                    });
                }
            }
            let Some(key) = record.key() else {
                report.reject(format!("row {row}: no usable origin_id"), max_messages);
                continue;
            };
            if !seen.insert(key.clone()) {
                return Err(MergeInvariantViolation::DuplicateKeyInBatch {
                    origin: origin.to_string(),
                    key,
                });
            }
            accepted.push((key, record));
        }

        for (key, record) in accepted {
            match self.index.get(&key) {
                Some(position) => {
                    self.records[*position].absorb(record);
                    report.updated += 1;
                }
                None => {
                    self.index.insert(key, self.records.len());
                    self.records.push(record);
                    report.inserted += 1;
                }
            }
        }
        self.verify_integrity()?;

        log::info!(
            "event=merge module=merge status=ok origin={} inserted={} updated={} rejected={} total={}",
            origin,
            report.inserted,
            report.updated,
            report.rejected,
            self.records.len()
        );
        Ok(report)
    }

    /// Checks that the index and the records describe the same key set.
    pub fn verify_integrity(&self) -> Result<(), MergeInvariantViolation> {
        if self.index.len() != self.records.len() {
            return Err(MergeInvariantViolation::InconsistentIndex(format!(
                "{} index entries for {} records",
                self.index.len(),
                self.records.len()
            )));
        }
        for (position, record) in self.records.iter().enumerate() {
            let key = record.key().ok_or_else(|| {
                MergeInvariantViolation::InconsistentIndex(format!(
                    "record at position {position} lost its identity key"
                ))
            })?;
            if self.index.get(&key) != Some(&position) {
                return Err(MergeInvariantViolation::InconsistentIndex(format!(
                    "key {key} does not point at position {position}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{UnifiedStore, DEFAULT_MAX_MESSAGES};
    use crate::error::MergeInvariantViolation;
    use crate::loader::CsvLoader;
    use crate::model::record::{NormalizedBatch, NormalizedRecord, RecordKey};
    use crate::model::value::Value;
    use crate::source::SourceDescriptor;

    fn descriptor(origin: &str) -> SourceDescriptor {
        SourceDescriptor::builder(origin)
            .expected_extension("csv")
            .loader(CsvLoader::new())
            .build()
            .expect("descriptor should build")
    }

    fn record(origin: &str, id: i64, title: &str) -> NormalizedRecord {
        NormalizedRecord::new()
            .with("origin", origin)
            .with("origin_id", id)
            .with("title", title)
    }

    fn batch(origin: &str, records: Vec<NormalizedRecord>) -> NormalizedBatch {
        NormalizedBatch {
            origin: origin.to_string(),
            columns: ["origin", "origin_id", "title"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            records,
        }
    }

    #[test]
    fn inserts_new_keys_and_upserts_existing() {
        let source = descriptor("EJM");
        let mut store = UnifiedStore::new();
        store
            .merge(batch("EJM", vec![record("EJM", 1, "A")]), &source, DEFAULT_MAX_MESSAGES)
            .unwrap();
        let report = store
            .merge(
                batch("EJM", vec![record("EJM", 1, "B"), record("EJM", 2, "C")]),
                &source,
                DEFAULT_MAX_MESSAGES,
            )
            .unwrap();
        assert_eq!((report.inserted, report.updated, report.rejected), (1, 1, 0));
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get(&RecordKey::new("EJM", 1)).unwrap().get("title"),
            Some(&Value::from("B"))
        );
    }

    #[test]
    fn records_for_origin_filters_by_origin() {
        let mut store = UnifiedStore::new();
        store
            .merge(batch("EJM", vec![record("EJM", 1, "A")]), &descriptor("EJM"), DEFAULT_MAX_MESSAGES)
            .unwrap();
        store
            .merge(
                batch("AEA", vec![record("AEA", 1, "B"), record("AEA", 2, "C")]),
                &descriptor("AEA"),
                DEFAULT_MAX_MESSAGES,
            )
            .unwrap();
        let titles: Vec<_> = store
            .records_for_origin("AEA")
            .filter_map(|record| record.get("title").cloned())
            .collect();
        assert_eq!(titles, vec![Value::from("B"), Value::from("C")]);
        assert_eq!(store.records_for_origin("AJO").count(), 0);
    }

    #[test]
    fn duplicate_key_in_batch_leaves_store_untouched() {
        let source = descriptor("EJM");
        let mut store = UnifiedStore::new();
        let err = store
            .merge(
                batch("EJM", vec![record("EJM", 1, "A"), record("EJM", 1, "B")]),
                &source,
                DEFAULT_MAX_MESSAGES,
            )
            .unwrap_err();
        assert!(matches!(err, MergeInvariantViolation::DuplicateKeyInBatch { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_records_without_identifier_and_caps_messages() {
        let source = descriptor("EJM");
        let mut store = UnifiedStore::new();
        let records = (0..3)
            .map(|_| NormalizedRecord::new().with("origin", "EJM").with("title", "x"))
            .collect();
        let report = store.merge(batch("EJM", records), &source, 2).unwrap();
        assert_eq!(report.rejected, 3);
        assert_eq!(report.messages.len(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn foreign_origin_is_fatal() {
        let mut store = UnifiedStore::new();
        let err = store
            .merge(
                batch("EJM", vec![record("AEA", 1, "A")]),
                &descriptor("EJM"),
                DEFAULT_MAX_MESSAGES,
            )
            .unwrap_err();
        assert_eq!(
            err,
            MergeInvariantViolation::ForeignOrigin {
                expected: "EJM".to_string(),
                found: "AEA".to_string()
            }
        );
    }

    #[test]
    fn from_records_rejects_duplicate_keys() {
        let err = UnifiedStore::from_records(vec![record("EJM", 1, "A"), record("EJM", 1, "B")])
            .unwrap_err();
        assert!(matches!(err, MergeInvariantViolation::InconsistentIndex(_)));
    }
}
