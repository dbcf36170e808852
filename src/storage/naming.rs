//! Partition naming scheme
//!
//! One partition file per (category, month) inside a storage root, named
//! `<category-prefix>-<yyyy-MM>.xml`.

use chrono::NaiveDate;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::storage::clock::Month;
use crate::storage::error::StorageResult;
use crate::storage::roots::StorageRoot;
use crate::storage::types::Category;

/// Extension of partition files
pub const PARTITION_EXTENSION: &str = "xml";

fn partition_name() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| {
        Regex::new(r"^(?P<prefix>[A-Za-z]+)-(?P<month>\d{4}-\d{2})\.xml$").expect("static regex")
    })
}

/// Partition file for `category` in `month` under `root`
///
/// Deterministic; the file may or may not exist.
pub fn file_for(category: Category, month: Month, root: &StorageRoot) -> PathBuf {
    root.dir_for(category).join(format!(
        "{}-{}.{}",
        category.file_prefix(),
        month,
        PARTITION_EXTENSION
    ))
}

/// Existing partition files under `root` for every month overlapping
/// `[start, end]`, oldest first
pub fn files_for(
    category: Category,
    start: NaiveDate,
    end: NaiveDate,
    root: &StorageRoot,
) -> Vec<PathBuf> {
    Month::range(start, end)
        .into_iter()
        .map(|month| file_for(category, month, root))
        .filter(|path| path.is_file())
        .collect()
}

/// Existing partition files for `[start, end]` across all `roots`, paired
/// with the root each one belongs to
pub fn files_for_roots<'a>(
    category: Category,
    start: NaiveDate,
    end: NaiveDate,
    roots: &'a [StorageRoot],
) -> Vec<(&'a StorageRoot, PathBuf)> {
    roots
        .iter()
        .flat_map(|root| {
            files_for(category, start, end, root)
                .into_iter()
                .map(move |path| (root, path))
        })
        .collect()
}

/// Month encoded in a partition file name of `category`, if it is one
pub fn month_of(category: Category, path: &Path) -> Option<Month> {
    let name = path.file_name()?.to_str()?;
    let caps = partition_name().captures(name)?;
    if &caps["prefix"] != category.file_prefix() {
        return None;
    }
    caps["month"].parse().ok()
}

/// Months for which `root` holds a partition of `category`, oldest first
///
/// Backups and temporary files are not partitions and are ignored.
pub fn available_months(category: Category, root: &StorageRoot) -> StorageResult<Vec<Month>> {
    let dir = root.dir_for(category);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut months = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(month) = month_of(category, &path) {
            months.push(month);
        }
    }

    months.sort();
    Ok(months)
}
