//! Aggregation Module
//!
//! Failure counts keyed by source IP, and the [`Analysis`] accumulator that carries
//! rows and both aggregates from one pipeline stage to the next.
use crate::models::{NormalizedRecord, SkippedItem};
use serde::Serialize;
use std::collections::btree_map::{self, BTreeMap};

/// Cumulative message count per source IP for one failure category.
///
/// Keys are the IP text exactly as reported; `2001:db8::1` and
/// `2001:0db8:0:0:0:0:0:1` are two different entries.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FailureAggregate {
    counts: BTreeMap<String, u64>,
}

impl FailureAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` to the entry for `ip`, starting from zero when absent.
    pub fn add(&mut self, ip: &str, count: u64) {
        let entry = self.counts.entry(ip.to_string()).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    /// Count for `ip`; zero when the IP never failed.
    pub fn get(&self, ip: &str) -> u64 {
        self.counts.get(ip).copied().unwrap_or(0)
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.counts.contains_key(ip)
    }

    pub fn merge(&mut self, other: FailureAggregate) {
        for (ip, count) in other.counts {
            self.add(&ip, count);
        }
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, u64> {
        self.counts.iter()
    }

    pub fn ips(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl<'a> IntoIterator for &'a FailureAggregate {
    type Item = (&'a String, &'a u64);
    type IntoIter = btree_map::Iter<'a, String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Everything a run (or a slice of one) produced: the table rows, the SPF and
/// DKIM aggregates, and whatever was stepped over.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub records: Vec<NormalizedRecord>,
    pub spf_failures: FailureAggregate,
    pub dkim_failures: FailureAggregate,
    pub files_processed: usize,
    pub skipped: Vec<SkippedItem>,
}

impl Analysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a row and feeds its count into the matching failure aggregates.
    pub fn record(&mut self, record: NormalizedRecord) {
        if record.spf_failed() {
            self.spf_failures.add(&record.source_ip, record.count);
        }
        if record.dkim_failed() {
            self.dkim_failures.add(&record.source_ip, record.count);
        }
        self.records.push(record);
    }

    pub fn skip(&mut self, location: impl Into<String>, reason: impl ToString) {
        self.skipped.push(SkippedItem {
            location: location.into(),
            reason: reason.to_string(),
        });
    }

    /// Folds `other` in after everything already held, keeping row order.
    pub fn merge(&mut self, other: Analysis) {
        self.records.extend(other.records);
        self.spf_failures.merge(other.spf_failures);
        self.dkim_failures.merge(other.dkim_failures);
        self.files_processed += other.files_processed;
        self.skipped.extend(other.skipped);
    }

    /// Messages summarized by all rows (sum of `count`).
    pub fn message_count(&self) -> u64 {
        self.records.iter().map(|r| r.count).sum()
    }
}
