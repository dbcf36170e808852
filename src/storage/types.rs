//! Core data types for the usage ledger
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `Category`: which kind of usage an event describes
//! - `Key`: the identity-defining attributes of an event, one variant per category
//! - `Event`: a single observation handed in by a tracker
//! - `Record`: the merged, persisted form of events sharing a key on one day
//! - `DayBucket`: all records of one category on one calendar day
//! - `Entry`: a record read back from a partition, tagged with its origin

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use std::fmt;

use crate::storage::clock::{day_of, duration_millis};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::merger::Merger;

/// Kind of usage being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Commands executed (counted)
    Command,
    /// Time spent in workbench parts (views and editors)
    Part,
    /// Time spent in perspectives
    Perspective,
    /// Time spent in files
    File,
    /// Active session time per day
    Session,
    /// Time spent in launches (run/debug)
    Launch,
    /// Time spent on files while a task was active
    Task,
}

impl Category {
    /// Get all categories for iteration
    pub fn all() -> &'static [Category] {
        &[
            Category::Command,
            Category::Part,
            Category::Perspective,
            Category::File,
            Category::Session,
            Category::Launch,
            Category::Task,
        ]
    }

    /// Fixed name fragment of this category's partition files
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Category::Command => "commandEvents",
            Category::Part => "partEvents",
            Category::Perspective => "perspectiveEvents",
            Category::File => "fileEvents",
            Category::Session => "sessionEvents",
            Category::Launch => "launchEvents",
            Category::Task => "taskEvents",
        }
    }

    /// Element name of one record in a partition document
    pub fn record_element(&self) -> &'static str {
        match self {
            Category::Command => "command",
            Category::Part => "part",
            Category::Perspective => "perspective",
            Category::File => "file",
            Category::Session => "session",
            Category::Launch => "launch",
            Category::Task => "task",
        }
    }

    /// Whether the measure is a count rather than a duration in milliseconds
    pub fn counts_occurrences(&self) -> bool {
        matches!(self, Category::Command)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record_element())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::all()
            .iter()
            .copied()
            .find(|c| c.record_element() == s)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Identity of an event or record
///
/// Two records describe the same entity on a day iff their keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Command {
        command_id: String,
    },
    Part {
        part_id: String,
    },
    Perspective {
        perspective_id: String,
    },
    File {
        file_id: String,
    },
    /// Sessions have a single record per day
    Session,
    Launch {
        name: String,
        launch_type: String,
        mode: String,
    },
    Task {
        handle: String,
        created: NaiveDateTime,
        file_id: String,
    },
}

impl Key {
    pub fn command(id: impl Into<String>) -> Self {
        Key::Command {
            command_id: id.into(),
        }
    }

    pub fn part(id: impl Into<String>) -> Self {
        Key::Part { part_id: id.into() }
    }

    pub fn perspective(id: impl Into<String>) -> Self {
        Key::Perspective {
            perspective_id: id.into(),
        }
    }

    pub fn file(id: impl Into<String>) -> Self {
        Key::File { file_id: id.into() }
    }

    pub fn launch(
        name: impl Into<String>,
        launch_type: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        Key::Launch {
            name: name.into(),
            launch_type: launch_type.into(),
            mode: mode.into(),
        }
    }

    pub fn task(
        handle: impl Into<String>,
        created: NaiveDateTime,
        file_id: impl Into<String>,
    ) -> Self {
        Key::Task {
            handle: handle.into(),
            created,
            file_id: file_id.into(),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Key::Command { .. } => Category::Command,
            Key::Part { .. } => Category::Part,
            Key::Perspective { .. } => Category::Perspective,
            Key::File { .. } => Category::File,
            Key::Session => Category::Session,
            Key::Launch { .. } => Category::Launch,
            Key::Task { .. } => Category::Task,
        }
    }
}

/// Measures beyond the primary one, only carried by some categories
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Extra {
    #[default]
    None,
    /// Launch count and the files touched while launched
    Launch {
        count: i64,
        file_ids: BTreeSet<String>,
    },
}

/// A single observed occurrence, produced by trackers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub key: Key,
    /// Naive local instant of the observation
    pub instant: NaiveDateTime,
    /// Duration in milliseconds, or occurrence count for counted categories
    pub measure: i64,
    pub extra: Extra,
}

impl Event {
    pub fn new(key: Key, instant: NaiveDateTime, measure: i64) -> Self {
        Self {
            key,
            instant,
            measure,
            extra: Extra::None,
        }
    }

    /// A single occurrence (measure 1)
    pub fn occurrence(key: Key, instant: NaiveDateTime) -> Self {
        Self::new(key, instant, 1)
    }

    /// An event spanning `[start, end]`, attributed to the day of `start`
    pub fn from_interval(
        key: Key,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> StorageResult<Self> {
        let millis = duration_millis(start, end).ok_or(StorageError::InvalidInterval)?;
        Ok(Self::new(key, start, millis))
    }

    /// One launch over `[start, end]` that touched `file_ids`
    pub fn launch(
        key: Key,
        start: NaiveDateTime,
        end: NaiveDateTime,
        file_ids: impl IntoIterator<Item = String>,
    ) -> StorageResult<Self> {
        let mut event = Self::from_interval(key, start, end)?;
        event.extra = Extra::Launch {
            count: 1,
            file_ids: file_ids.into_iter().collect(),
        };
        Ok(event)
    }

    pub fn category(&self) -> Category {
        self.key.category()
    }

    /// Calendar day this event is attributed to
    pub fn date(&self) -> NaiveDate {
        day_of(self.instant)
    }
}

/// The persisted, merged form of all same-key events on one day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Key,
    pub measure: i64,
    pub extra: Extra,
}

impl Record {
    pub fn new(key: Key, measure: i64) -> Self {
        Self {
            key,
            measure,
            extra: Extra::None,
        }
    }

    pub fn with_extra(mut self, extra: Extra) -> Self {
        self.extra = extra;
        self
    }

    pub fn category(&self) -> Category {
        self.key.category()
    }
}

impl From<Event> for Record {
    fn from(event: Event) -> Self {
        Self {
            key: event.key,
            measure: event.measure,
            extra: event.extra,
        }
    }
}

/// All records of one category on one calendar day
///
/// Holds at most one record per identity as long as records are added
/// through [`DayBucket::absorb`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub records: Vec<Record>,
}

impl DayBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            records: Vec::new(),
        }
    }

    /// Merge `record` into the same-identity record, or append it
    pub fn absorb(&mut self, record: Record, merger: &dyn Merger) {
        match self
            .records
            .iter_mut()
            .find(|existing| merger.same_identity(existing, &record))
        {
            Some(existing) => merger.merge(existing, &record),
            None => self.records.push(record),
        }
    }

    /// Merge every record of `other` into this bucket
    pub fn absorb_all(&mut self, other: DayBucket, merger: &dyn Merger) {
        for record in other.records {
            self.absorb(record, merger);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A record read back from storage, with the day and workspace it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Name of the storage root (workspace directory) holding the record
    pub workspace: String,
    pub date: NaiveDate,
    pub record: Record,
}
