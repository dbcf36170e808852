//! Write path for one category in one storage root
//!
//! Events are merged in memory into day buckets (one record per identity per
//! day) and committed into monthly partition files by read-merge-write:
//!
//! ```text
//! insert(event) → day bucket (merge by identity)
//!                      │  month rollover or explicit commit
//!                      ▼
//! load partition → fold buffered buckets in → write temp → rename
//! ```
//!
//! A failed commit keeps the buffer so the next commit retries the same data.
//! Not internally synchronized; share through [`crate::storage::SharedStorer`].

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::storage::clock::{Clock, Month, SystemClock};
use crate::storage::codec::{backup_corrupt, fold_buckets, Codec, ReadOutcome, XmlCodec};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::merger::{merger_for, Merger};
use crate::storage::naming;
use crate::storage::roots::StorageRoot;
use crate::storage::types::{Category, DayBucket, Event, Extra, Record};

/// What a successful commit persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Partition files rewritten
    pub partitions: usize,
    /// Buffered records folded into them
    pub records: usize,
}

impl std::fmt::Display for CommitReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Partitions: {}, Records: {}",
            self.partitions, self.records
        )
    }
}

/// Buffers and persists events of one category
pub struct Storer {
    category: Category,
    root: StorageRoot,
    merger: Arc<dyn Merger>,
    codec: Arc<dyn Codec>,
    clock: Arc<dyn Clock>,
    /// Uncommitted buckets, at most one per date
    buffer: BTreeMap<NaiveDate, DayBucket>,
    /// Month of the most recent insert
    current_month: Option<Month>,
}

impl Storer {
    /// Create a storer with the category's default merger and the XML codec
    pub fn new(category: Category, root: StorageRoot) -> Self {
        Self {
            category,
            root,
            merger: merger_for(category),
            codec: Arc::new(XmlCodec),
            clock: Arc::new(SystemClock),
            buffer: BTreeMap::new(),
            current_month: None,
        }
    }

    pub fn with_merger(mut self, merger: Arc<dyn Merger>) -> Self {
        self.merger = merger;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Clock used to stamp backups of unreadable partitions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Buffer one event
    ///
    /// Events of another category and events carrying a negative measure
    /// are rejected and leave the buffer untouched.
    ///
    /// An event from another month than the previous insert first commits
    /// the buffer. A failing rollover commit is logged and the data stays
    /// buffered; the event is still accepted.
    pub fn insert(&mut self, event: Event) -> StorageResult<()> {
        if event.category() != self.category {
            return Err(StorageError::CategoryMismatch {
                expected: self.category,
                found: event.category(),
            });
        }
        if event.measure < 0 {
            return Err(StorageError::InvalidMeasure(event.measure));
        }
        if let Extra::Launch { count, .. } = &event.extra {
            if *count < 0 {
                return Err(StorageError::InvalidMeasure(*count));
            }
        }

        let date = event.date();
        let month = Month::containing(date);

        if self.current_month.is_some_and(|current| current != month) && !self.buffer.is_empty() {
            tracing::debug!(
                category = %self.category,
                from = ?self.current_month.map(|m| m.to_string()),
                to = %month,
                "Month rollover, committing buffer"
            );
            if let Err(e) = self.commit() {
                tracing::warn!(
                    category = %self.category,
                    "Rollover commit failed, data stays buffered: {}",
                    e
                );
            }
        }
        self.current_month = Some(month);

        self.buffer
            .entry(date)
            .or_insert_with(|| DayBucket::new(date))
            .absorb(Record::from(event), self.merger.as_ref());
        Ok(())
    }

    /// Buffer events in order; stops at the first invalid event
    pub fn insert_batch(&mut self, events: impl IntoIterator<Item = Event>) -> StorageResult<()> {
        for event in events {
            self.insert(event)?;
        }
        Ok(())
    }

    /// Persist every buffered month into its partition file
    ///
    /// Months written successfully leave the buffer; months that fail stay
    /// for the next attempt and the first failure is returned.
    pub fn commit(&mut self) -> StorageResult<CommitReport> {
        if self.buffer.is_empty() {
            return Ok(CommitReport::default());
        }

        let mut by_month: BTreeMap<Month, Vec<NaiveDate>> = BTreeMap::new();
        for date in self.buffer.keys() {
            by_month.entry(Month::containing(*date)).or_default().push(*date);
        }

        let mut report = CommitReport::default();
        let mut first_error = None;

        for (month, dates) in by_month {
            let buckets: Vec<&DayBucket> =
                dates.iter().filter_map(|d| self.buffer.get(d)).collect();
            match self.commit_month(month, &buckets) {
                Ok(records) => {
                    report.partitions += 1;
                    report.records += records;
                    for date in &dates {
                        self.buffer.remove(date);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        category = %self.category,
                        month = %month,
                        root = %self.root.name,
                        "Commit failed, keeping buffered data: {}",
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!(
                    category = %self.category,
                    root = %self.root.name,
                    partitions = report.partitions,
                    records = report.records,
                    "Committed usage data"
                );
                Ok(report)
            }
        }
    }

    fn commit_month(&self, month: Month, buffered: &[&DayBucket]) -> StorageResult<usize> {
        let path = naming::file_for(self.category, month, &self.root);
        let existing = self.load_existing(&path)?;

        let merger = self.merger.as_ref();
        let mut merged = fold_buckets(existing, merger);
        let mut records = 0;

        for bucket in buffered {
            records += bucket.len();
            match merged.iter_mut().find(|b| b.date == bucket.date) {
                Some(on_disk) => on_disk.absorb_all((*bucket).clone(), merger),
                None => merged.push((*bucket).clone()),
            }
        }
        merged.sort_by_key(|b| b.date);

        self.codec.write(self.category, &merged, &path)?;
        Ok(records)
    }

    /// On-disk buckets of a partition about to be rewritten
    ///
    /// An unparseable file is moved aside first so its bytes are not lost;
    /// a file that cannot even be read aborts the commit.
    fn load_existing(&self, path: &Path) -> StorageResult<Vec<DayBucket>> {
        match self.codec.load(self.category, path) {
            ReadOutcome::Missing => Ok(Vec::new()),
            ReadOutcome::Loaded(buckets) => Ok(buckets),
            ReadOutcome::Corrupt(StorageError::Io(e)) => Err(StorageError::Io(e)),
            ReadOutcome::Corrupt(e) => {
                let backup = backup_corrupt(path, self.clock.now())?;
                tracing::error!(
                    category = %self.category,
                    path = ?path,
                    backup = ?backup,
                    "Partition unreadable, moved aside and starting fresh: {}",
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Months with uncommitted data, oldest first
    pub fn buffered_months(&self) -> Vec<Month> {
        let mut months: Vec<Month> = self.buffer.keys().map(|d| Month::containing(*d)).collect();
        months.dedup();
        months
    }

    /// Uncommitted buckets, oldest first
    pub fn buffered_days(&self) -> impl Iterator<Item = &DayBucket> {
        self.buffer.values()
    }

    /// Number of uncommitted records across all days
    pub fn pending_records(&self) -> usize {
        self.buffer.values().map(DayBucket::len).sum()
    }
}

impl std::fmt::Debug for Storer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storer")
            .field("category", &self.category)
            .field("root", &self.root)
            .field("buffered_days", &self.buffer.len())
            .field("current_month", &self.current_month)
            .finish()
    }
}
