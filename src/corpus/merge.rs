//! Merge/dedup engine.
//!
//! Folds batches of enriched records into the canonical corpus. Malformed
//! records are skipped and counted, never fatal; a record whose id already
//! exists replaces the earlier one in place, so positions stay stable and a
//! rebuild sees minimal churn. The later arrival always wins: upstream
//! enrichment carries no comparable timestamp, so arrival order across
//! batches is the only recency signal there is.

use tracing::{debug, warn};

use super::Corpus;
use crate::models::{Record, ValidationError};

/// Accounting for one merge run.
///
/// `accepted` counts new ids appended, `replaced` counts in-place
/// supersessions, and the `skipped_*` fields count rejects by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Records appended under a new id
    pub accepted: usize,

    /// Records that superseded an existing id in place
    pub replaced: usize,

    /// Records rejected for a missing/blank id
    pub skipped_missing_id: usize,

    /// Records rejected for an empty abstract
    pub skipped_empty_abstract: usize,
}

impl MergeReport {
    /// Total records rejected, over all reasons.
    pub fn skipped(&self) -> usize {
        self.skipped_missing_id + self.skipped_empty_abstract
    }

    /// Total records examined.
    pub fn processed(&self) -> usize {
        self.accepted + self.replaced + self.skipped()
    }

    fn record_skip(&mut self, reason: ValidationError) {
        match reason {
            ValidationError::MissingId => self.skipped_missing_id += 1,
            ValidationError::EmptyAbstract => self.skipped_empty_abstract += 1,
        }
    }
}

/// Merge incoming batches into the corpus.
///
/// Batches are applied in order, records within a batch in order; that
/// arrival order decides which duplicate wins. The returned corpus upholds
/// the uniqueness invariant by construction and the operation is
/// idempotent: merging the same batch again changes nothing but the
/// accepted/replaced split in the report.
pub fn merge(mut corpus: Corpus, batches: Vec<Vec<Record>>) -> (Corpus, MergeReport) {
    let mut report = MergeReport::default();

    for batch in batches {
        for mut record in batch {
            if let Err(reason) = record.validate() {
                warn!(id = %record.id, %reason, "skipping invalid record");
                report.record_skip(reason);
                continue;
            }
            record.sanitize();

            match corpus.positions.get(record.id.as_str()).copied() {
                Some(pos) => {
                    corpus.records[pos] = record;
                    report.replaced += 1;
                }
                None => {
                    corpus.positions.insert(record.id.clone(), corpus.records.len());
                    corpus.records.push(record);
                    report.accepted += 1;
                }
            }
        }
    }

    debug!(
        accepted = report.accepted,
        replaced = report.replaced,
        skipped = report.skipped(),
        total = corpus.len(),
        "merge complete"
    );
    (corpus, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashSet};

    fn record(id: &str, abstract_text: &str) -> Record {
        Record {
            id: id.to_string(),
            title: format!("Title {}", id),
            abstract_text: abstract_text.to_string(),
            summary: None,
            keywords: vec![],
            authors: vec![],
            categories: BTreeSet::new(),
            affiliations: BTreeSet::new(),
            language: "en".to_string(),
            year: Some(2023),
            pdf_url: String::new(),
        }
    }

    fn ids(corpus: &Corpus) -> Vec<&str> {
        corpus.records().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_merge_into_empty_corpus() {
        let batch = vec![record("a", "one"), record("b", "two")];
        let (corpus, report) = merge(Corpus::new(), vec![batch]);

        assert_eq!(ids(&corpus), vec!["a", "b"]);
        assert_eq!(report.accepted, 2);
        assert_eq!(report.replaced, 0);
        assert_eq!(report.skipped(), 0);
    }

    #[test]
    fn test_merge_skips_invalid_records() {
        let batch = vec![
            record("a", "fine"),
            record("", "no id"),
            record("b", "   "),
        ];
        let (corpus, report) = merge(Corpus::new(), vec![batch]);

        assert_eq!(ids(&corpus), vec!["a"]);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.skipped_missing_id, 1);
        assert_eq!(report.skipped_empty_abstract, 1);
        assert_eq!(report.processed(), 3);
    }

    #[test]
    fn test_merge_replaces_in_place() {
        let existing = Corpus::from_records(vec![
            record("a", "one"),
            record("b", "two"),
            record("c", "three"),
        ])
        .unwrap();

        let (corpus, report) = merge(existing, vec![vec![record("b", "two prime")]]);

        // Position of "b" is unchanged; only the content moved forward.
        assert_eq!(ids(&corpus), vec!["a", "b", "c"]);
        assert_eq!(corpus.records()[1].abstract_text, "two prime");
        assert_eq!(corpus.len(), 3);
        assert_eq!(report.accepted, 0);
        assert_eq!(report.replaced, 1);
    }

    #[test]
    fn test_merge_last_write_wins_across_batches() {
        let b1 = vec![record("x", "foo")];
        let b2 = vec![record("x", "bar")];
        let (corpus, _) = merge(Corpus::new(), vec![b1, b2]);

        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.get("x").unwrap().abstract_text, "bar");
    }

    #[test]
    fn test_merge_last_write_wins_within_batch() {
        let batch = vec![record("x", "foo"), record("x", "bar")];
        let (corpus, report) = merge(Corpus::new(), vec![batch]);

        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.get("x").unwrap().abstract_text, "bar");
        assert_eq!(report.accepted, 1);
        assert_eq!(report.replaced, 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = Corpus::from_records(vec![record("a", "one")]).unwrap();
        let batch = vec![record("a", "updated"), record("b", "two")];

        let (once, _) = merge(existing.clone(), vec![batch.clone()]);
        let (twice, _) = merge(once.clone(), vec![batch]);

        assert_eq!(once.records(), twice.records());
    }

    #[test]
    fn test_merge_preserves_uniqueness() {
        let b1 = vec![record("a", "1"), record("b", "2")];
        let b2 = vec![record("b", "3"), record("c", "4")];
        let b3 = vec![record("a", "5"), record("c", "6"), record("d", "7")];
        let (corpus, _) = merge(Corpus::new(), vec![b1, b2, b3]);

        let unique: HashSet<&str> = corpus.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(unique.len(), corpus.len());
        assert_eq!(ids(&corpus), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_merge_replacement_keeps_count() {
        let existing =
            Corpus::from_records(vec![record("a", "old"), record("b", "two")]).unwrap();
        let before = existing.len();

        let (corpus, _) = merge(existing, vec![vec![record("a", "new")]]);

        assert_eq!(corpus.len(), before);
        assert_eq!(corpus.get("a").unwrap().abstract_text, "new");
    }

    #[test]
    fn test_merge_sanitizes_year() {
        let mut r = record("a", "one");
        r.year = Some(12);
        let (corpus, _) = merge(Corpus::new(), vec![vec![r]]);
        assert_eq!(corpus.get("a").unwrap().year, None);
    }

    #[test]
    fn test_merge_lookup_map_stays_consistent() {
        let b1 = vec![record("a", "1"), record("b", "2"), record("c", "3")];
        let b2 = vec![record("b", "2b"), record("d", "4")];
        let (corpus, _) = merge(Corpus::new(), vec![b1, b2]);

        for r in corpus.records() {
            assert_eq!(corpus.get(&r.id).map(|x| &x.abstract_text), Some(&r.abstract_text));
        }
        assert_eq!(corpus.get("b").unwrap().abstract_text, "2b");
    }

    #[test]
    fn test_merge_empty_batches() {
        let existing = Corpus::from_records(vec![record("a", "one")]).unwrap();
        let (corpus, report) = merge(existing.clone(), vec![]);
        assert_eq!(corpus.records(), existing.records());
        assert_eq!(report.processed(), 0);

        let (corpus, report) = merge(existing.clone(), vec![vec![], vec![]]);
        assert_eq!(corpus.records(), existing.records());
        assert_eq!(report.processed(), 0);
    }
}
