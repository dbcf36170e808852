//! Typed usage results
//!
//! One result type per category, built from persisted entries. Conversion
//! fails for records of the wrong kind, for invalid values, and for files
//! whose identifier no longer maps to a live path; the accessor skips those.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage::{ConvertError, Entry, Extra, Key};

/// Maps stable file identifiers to live paths
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, file_id: &str) -> Option<PathBuf>;
}

impl<F> ResourceResolver for F
where
    F: Fn(&str) -> Option<PathBuf> + Send + Sync,
{
    fn resolve(&self, file_id: &str) -> Option<PathBuf> {
        self(file_id)
    }
}

fn duration(entry: &Entry) -> Result<Duration, ConvertError> {
    u64::try_from(entry.record.measure)
        .map(Duration::from_millis)
        .map_err(|_| ConvertError::Invalid(format!("negative duration {}", entry.record.measure)))
}

fn non_empty(id: &str, what: &str) -> Result<String, ConvertError> {
    if id.is_empty() {
        Err(ConvertError::Invalid(format!("empty {}", what)))
    } else {
        Ok(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandUsage {
    pub workspace: String,
    pub date: NaiveDate,
    pub command_id: String,
    pub count: i64,
}

impl TryFrom<&Entry> for CommandUsage {
    type Error = ConvertError;

    fn try_from(entry: &Entry) -> Result<Self, Self::Error> {
        match &entry.record.key {
            Key::Command { command_id } => Ok(Self {
                workspace: entry.workspace.clone(),
                date: entry.date,
                command_id: non_empty(command_id, "command id")?,
                count: entry.record.measure,
            }),
            other => Err(ConvertError::UnexpectedKind(other.category())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartUsage {
    pub workspace: String,
    pub date: NaiveDate,
    pub part_id: String,
    pub duration: Duration,
}

impl TryFrom<&Entry> for PartUsage {
    type Error = ConvertError;

    fn try_from(entry: &Entry) -> Result<Self, Self::Error> {
        match &entry.record.key {
            Key::Part { part_id } => Ok(Self {
                workspace: entry.workspace.clone(),
                date: entry.date,
                part_id: non_empty(part_id, "part id")?,
                duration: duration(entry)?,
            }),
            other => Err(ConvertError::UnexpectedKind(other.category())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerspectiveUsage {
    pub workspace: String,
    pub date: NaiveDate,
    pub perspective_id: String,
    pub duration: Duration,
}

impl TryFrom<&Entry> for PerspectiveUsage {
    type Error = ConvertError;

    fn try_from(entry: &Entry) -> Result<Self, Self::Error> {
        match &entry.record.key {
            Key::Perspective { perspective_id } => Ok(Self {
                workspace: entry.workspace.clone(),
                date: entry.date,
                perspective_id: non_empty(perspective_id, "perspective id")?,
                duration: duration(entry)?,
            }),
            other => Err(ConvertError::UnexpectedKind(other.category())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUsage {
    pub workspace: String,
    pub date: NaiveDate,
    pub duration: Duration,
}

impl TryFrom<&Entry> for SessionUsage {
    type Error = ConvertError;

    fn try_from(entry: &Entry) -> Result<Self, Self::Error> {
        match &entry.record.key {
            Key::Session => Ok(Self {
                workspace: entry.workspace.clone(),
                date: entry.date,
                duration: duration(entry)?,
            }),
            other => Err(ConvertError::UnexpectedKind(other.category())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchUsage {
    pub workspace: String,
    pub date: NaiveDate,
    pub name: String,
    pub launch_type: String,
    pub mode: String,
    pub count: i64,
    pub duration: Duration,
    pub file_ids: BTreeSet<String>,
}

impl TryFrom<&Entry> for LaunchUsage {
    type Error = ConvertError;

    fn try_from(entry: &Entry) -> Result<Self, Self::Error> {
        let Key::Launch {
            name,
            launch_type,
            mode,
        } = &entry.record.key
        else {
            return Err(ConvertError::UnexpectedKind(entry.record.category()));
        };

        let (count, file_ids) = match &entry.record.extra {
            Extra::Launch { count, file_ids } => (*count, file_ids.clone()),
            Extra::None => (0, BTreeSet::new()),
        };

        Ok(Self {
            workspace: entry.workspace.clone(),
            date: entry.date,
            name: non_empty(name, "launch name")?,
            launch_type: launch_type.clone(),
            mode: mode.clone(),
            count,
            duration: duration(entry)?,
            file_ids,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskUsage {
    pub workspace: String,
    pub date: NaiveDate,
    pub handle: String,
    pub created: NaiveDateTime,
    pub file_id: String,
    pub duration: Duration,
}

impl TryFrom<&Entry> for TaskUsage {
    type Error = ConvertError;

    fn try_from(entry: &Entry) -> Result<Self, Self::Error> {
        match &entry.record.key {
            Key::Task {
                handle,
                created,
                file_id,
            } => Ok(Self {
                workspace: entry.workspace.clone(),
                date: entry.date,
                handle: non_empty(handle, "task handle")?,
                created: *created,
                file_id: file_id.clone(),
                duration: duration(entry)?,
            }),
            other => Err(ConvertError::UnexpectedKind(other.category())),
        }
    }
}

/// Time spent in a file that still resolves to a live path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUsage {
    pub workspace: String,
    pub date: NaiveDate,
    pub file_id: String,
    pub path: PathBuf,
    pub duration: Duration,
}

impl FileUsage {
    pub fn convert(entry: &Entry, resolver: &dyn ResourceResolver) -> Result<Self, ConvertError> {
        let Key::File { file_id } = &entry.record.key else {
            return Err(ConvertError::UnexpectedKind(entry.record.category()));
        };
        let path = resolver
            .resolve(file_id)
            .ok_or_else(|| ConvertError::Unresolvable(file_id.clone()))?;

        Ok(Self {
            workspace: entry.workspace.clone(),
            date: entry.date,
            file_id: file_id.clone(),
            path,
            duration: duration(entry)?,
        })
    }
}
