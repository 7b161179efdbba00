use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;

use crate::verdict::{ResultRecord, Verdict};

/// Destination for flushed result batches.
///
/// `write_batch` is called from the dispatching thread only, every
/// `flush_every` records and once more with the remainder.
pub trait ResultSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn write_batch(&mut self, records: &[ResultRecord]) -> Result<(), Self::Error>;

    fn finish(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    type Error = S::Error;

    fn write_batch(&mut self, records: &[ResultRecord]) -> Result<(), Self::Error> {
        (**self).write_batch(records)
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        (**self).finish()
    }
}

/// In-memory address → category partition.
#[derive(Debug, Default, Clone)]
pub struct Partition {
    by_verdict: BTreeMap<Verdict, Vec<ResultRecord>>,
    batches: usize,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, verdict: Verdict) -> &[ResultRecord] {
        self.by_verdict
            .get(&verdict)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_verdict.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `write_batch` calls received.
    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.by_verdict.values().flatten()
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for record in self.records() {
            summary.record(record);
        }
        summary
    }
}

impl ResultSink for Partition {
    type Error = Infallible;

    fn write_batch(&mut self, records: &[ResultRecord]) -> Result<(), Self::Error> {
        self.batches += 1;
        for record in records {
            self.by_verdict
                .entry(record.verdict)
                .or_default()
                .push(record.clone());
        }
        Ok(())
    }
}

/// Per-category counts for a finished batch.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize))]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    counts: BTreeMap<Verdict, usize>,
    total: usize,
}

impl BatchSummary {
    pub fn record(&mut self, record: &ResultRecord) {
        *self.counts.entry(record.verdict).or_default() += 1;
        self.total += 1;
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        self.counts.get(&verdict).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Share of `verdict` in percent; `0.0` for an empty batch.
    pub fn percentage(&self, verdict: Verdict) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(verdict) as f64 * 100.0 / self.total as f64
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "total: {}", self.total)?;
        for verdict in Verdict::ALL {
            writeln!(
                f,
                "{:<10} {:>7} ({:.1}%)",
                verdict.as_str(),
                self.count(verdict),
                self.percentage(verdict)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(original: &str, verdict: Verdict) -> ResultRecord {
        let mut record = ResultRecord::malformed(original, "test");
        record.verdict = verdict;
        record
    }

    #[test]
    fn partition_groups_by_verdict() {
        let mut partition = Partition::new();
        partition
            .write_batch(&[
                record("a@x.test", Verdict::Valid),
                record("b@x.test", Verdict::Blocked),
            ])
            .expect("infallible");
        partition
            .write_batch(&[record("c@x.test", Verdict::Valid)])
            .expect("infallible");

        assert_eq!(partition.len(), 3);
        assert_eq!(partition.batches(), 2);
        assert_eq!(partition.get(Verdict::Valid).len(), 2);
        assert!(partition.get(Verdict::Business).is_empty());
        assert_eq!(partition.summary().count(Verdict::Blocked), 1);
    }

    #[test]
    fn summary_renders_every_category() {
        let mut summary = BatchSummary::default();
        for verdict in [Verdict::Valid, Verdict::Valid, Verdict::Invalid, Verdict::Blocked] {
            summary.record(&record("x@y.test", verdict));
        }
        insta::assert_snapshot!(summary.to_string().trim_end(), @r"
        total: 4
        valid            2 (50.0%)
        invalid          1 (25.0%)
        business         0 (0.0%)
        spam_trap        0 (0.0%)
        blocked          1 (25.0%)
        ");
    }

    #[test]
    fn empty_summary_has_zero_percentages() {
        let summary = BatchSummary::default();
        assert_eq!(summary.total(), 0);
        assert_eq!(summary.percentage(Verdict::Valid), 0.0);
    }
}
