//! Read path for one category across every storage root
//!
//! ```text
//! get_data(start, end)
//!   → roots (registry) → partition files per month (naming)
//!   → day buckets (codec) → keep dates in [start, end]
//!   → convert each record, skipping the ones that fail
//! ```
//!
//! Reads never touch a storer's buffer and never write.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::storage::codec::{fold_buckets, Codec, XmlCodec};
use crate::storage::error::{ConvertError, StorageError, StorageResult};
use crate::storage::merger::{merger_for, Merger};
use crate::storage::naming;
use crate::storage::roots::RootRegistry;
use crate::storage::types::{Category, Entry};

/// Turns a persisted entry into a category-specific result
pub type Converter<T> = Arc<dyn Fn(&Entry) -> Result<T, ConvertError> + Send + Sync>;

/// Queries one category over date ranges
pub struct Accessor<T> {
    category: Category,
    registry: Arc<RootRegistry>,
    codec: Arc<dyn Codec>,
    merger: Arc<dyn Merger>,
    convert: Converter<T>,
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        Self {
            category: self.category,
            registry: Arc::clone(&self.registry),
            codec: Arc::clone(&self.codec),
            merger: Arc::clone(&self.merger),
            convert: Arc::clone(&self.convert),
        }
    }
}

impl Accessor<Entry> {
    /// Accessor yielding the persisted entries themselves
    pub fn raw(category: Category, registry: Arc<RootRegistry>) -> Self {
        Self::new(category, registry, |entry: &Entry| Ok(entry.clone()))
    }
}

impl<T> Accessor<T> {
    pub fn new<F>(category: Category, registry: Arc<RootRegistry>, convert: F) -> Self
    where
        F: Fn(&Entry) -> Result<T, ConvertError> + Send + Sync + 'static,
    {
        Self {
            category,
            registry,
            codec: Arc::new(XmlCodec),
            merger: merger_for(category),
            convert: Arc::new(convert),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_merger(mut self, merger: Arc<dyn Merger>) -> Self {
        self.merger = merger;
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Every persisted entry dated within `[start, end]`, across all roots
    ///
    /// One entry per (root, date, identity); nothing is merged across days
    /// or roots. Unreadable partitions contribute nothing.
    pub fn entries(&self, start: NaiveDate, end: NaiveDate) -> StorageResult<Vec<Entry>> {
        if end < start {
            return Err(StorageError::InvalidDateRange { start, end });
        }

        let roots = self.registry.roots();
        let files = naming::files_for_roots(self.category, start, end, &roots);
        let mut entries = Vec::new();

        for (root, path) in files {
            let buckets = fold_buckets(self.codec.read(self.category, &path), self.merger.as_ref());
            for bucket in buckets {
                // Old or foreign files may hold dates outside their month
                if bucket.date < start || bucket.date > end {
                    continue;
                }
                for record in bucket.records {
                    entries.push(Entry {
                        workspace: root.name.clone(),
                        date: bucket.date,
                        record,
                    });
                }
            }
        }

        tracing::debug!(
            category = %self.category,
            %start,
            %end,
            roots = roots.len(),
            entries = entries.len(),
            "Read usage entries"
        );
        Ok(entries)
    }

    /// Per-day results within `[start, end]`
    pub fn get_data(&self, start: NaiveDate, end: NaiveDate) -> StorageResult<Vec<T>> {
        let entries = self.entries(start, end)?;
        Ok(self.convert_all(&entries))
    }

    /// One result per identity over the whole range, summed across days and
    /// roots
    ///
    /// Each merged entry carries the earliest date and the workspace where
    /// the identity was first seen.
    pub fn get_totals(&self, start: NaiveDate, end: NaiveDate) -> StorageResult<Vec<T>> {
        let mut totals: Vec<Entry> = Vec::new();
        for entry in self.entries(start, end)? {
            match totals
                .iter_mut()
                .find(|total| self.merger.same_identity(&total.record, &entry.record))
            {
                Some(total) => {
                    self.merger.merge(&mut total.record, &entry.record);
                    if entry.date < total.date {
                        total.date = entry.date;
                    }
                }
                None => totals.push(entry),
            }
        }
        Ok(self.convert_all(&totals))
    }

    fn convert_all(&self, entries: &[Entry]) -> Vec<T> {
        let mut skipped = 0usize;
        let results: Vec<T> = entries
            .iter()
            .filter_map(|entry| match (self.convert)(entry) {
                Ok(result) => Some(result),
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(
                        category = %self.category,
                        date = %entry.date,
                        workspace = %entry.workspace,
                        "Skipping unconvertible record: {}",
                        e
                    );
                    None
                }
            })
            .collect();

        if skipped > 0 {
            tracing::warn!(
                category = %self.category,
                skipped,
                "Some usage records could not be converted"
            );
        }
        results
    }
}
