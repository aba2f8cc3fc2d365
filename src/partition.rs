//! Balanced batch partitioning of the pending pool.
//!
//! Each source's pending records form a queue ordered newest first. Every round draws up to
//! `ceil(chunk_size / sources)` records from the front of each queue, so within one batch every
//! source that still has records left contributes exactly the same number, and a source that
//! runs dry simply contributes fewer.

use crate::types::{PostRecord, SourceId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, VecDeque};

/// One round of records to fetch, grouped by source
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchBatch {
    groups: BTreeMap<SourceId, Vec<PostRecord>>,
}

impl FetchBatch {
    /// Build a batch from per-source record lists; empty lists are dropped
    pub fn new(groups: impl IntoIterator<Item = (SourceId, Vec<PostRecord>)>) -> Self {
        Self {
            groups: groups
                .into_iter()
                .filter(|(_, records)| !records.is_empty())
                .collect(),
        }
    }

    /// Records assigned to `source` in this batch
    pub fn get(&self, source: &SourceId) -> Option<&[PostRecord]> {
        self.groups.get(source).map(Vec::as_slice)
    }

    /// Sources represented in the batch, in order
    pub fn sources(&self) -> impl Iterator<Item = &SourceId> {
        self.groups.keys()
    }

    /// Iterate over `(source, records)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&SourceId, &[PostRecord])> {
        self.groups.iter().map(|(id, records)| (id, records.as_slice()))
    }

    /// Number of sources in the batch
    pub fn source_count(&self) -> usize {
        self.groups.len()
    }

    /// Total records across all sources
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether the batch holds no records
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Creation time of the oldest post in the batch
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.groups.values().flatten().map(|r| r.created_time).min()
    }

    /// Creation time of the newest post in the batch
    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.groups.values().flatten().map(|r| r.created_time).max()
    }
}

impl IntoIterator for FetchBatch {
    type Item = (SourceId, Vec<PostRecord>);
    type IntoIter = std::collections::btree_map::IntoIter<SourceId, Vec<PostRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

/// Iterator of balanced [`FetchBatch`]es drawn from a pending pool
#[derive(Debug)]
pub struct Partitioner {
    queues: BTreeMap<SourceId, VecDeque<PostRecord>>,
    per_source: usize,
}

impl Partitioner {
    /// Partition `pending` into batches of roughly `chunk_size` records.
    ///
    /// `None` puts the whole pool into a single batch.
    pub fn new(
        pending: impl IntoIterator<Item = (SourceId, Vec<PostRecord>)>,
        chunk_size: Option<usize>,
    ) -> Self {
        let mut queues = BTreeMap::new();
        for (source, mut records) in pending {
            if records.is_empty() {
                continue;
            }
            // Stable: records with equal timestamps keep their pool order
            records.sort_by(|a, b| b.created_time.cmp(&a.created_time));
            queues
                .entry(source)
                .or_insert_with(VecDeque::new)
                .extend(records);
        }

        let per_source = match chunk_size {
            Some(chunk) if !queues.is_empty() => chunk.max(1).div_ceil(queues.len()),
            _ => usize::MAX,
        };

        Self { queues, per_source }
    }

    /// Records drawn from each source per batch
    pub fn per_source(&self) -> usize {
        self.per_source
    }

    /// Records not yet handed out
    pub fn remaining(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }
}

impl Iterator for Partitioner {
    type Item = FetchBatch;

    fn next(&mut self) -> Option<FetchBatch> {
        if self.queues.is_empty() {
            return None;
        }

        let per_source = self.per_source;
        let mut groups: BTreeMap<SourceId, Vec<PostRecord>> = BTreeMap::new();
        self.queues.retain(|source, queue| {
            let take = per_source.min(queue.len());
            groups.insert(source.clone(), queue.drain(..take).collect());
            !queue.is_empty()
        });

        Some(FetchBatch { groups })
    }
}

/// Split a pending pool into balanced batches
pub fn partition(
    pending: impl IntoIterator<Item = (SourceId, Vec<PostRecord>)>,
    chunk_size: Option<usize>,
) -> Partitioner {
    Partitioner::new(pending, chunk_size)
}
