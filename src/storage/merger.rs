//! Identity and measure-combination rules
//!
//! A merger decides whether two records describe the same entity and how
//! their measures combine. Merging must be order-independent: folding any
//! permutation of same-identity records yields the same totals.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::storage::types::{Category, Extra, Record};

/// Category-specific identity predicate and merge rule
pub trait Merger: Send + Sync {
    /// Compare identity-defining attributes only
    fn same_identity(&self, a: &Record, b: &Record) -> bool;

    /// Combine `other` into `main`; identity attributes are left untouched
    fn merge(&self, main: &mut Record, other: &Record);
}

/// Key equality, measures summed
///
/// Used by every category whose record carries a single measure.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumMerger;

impl Merger for SumMerger {
    fn same_identity(&self, a: &Record, b: &Record) -> bool {
        a.key == b.key
    }

    fn merge(&self, main: &mut Record, other: &Record) {
        main.measure = main.measure.saturating_add(other.measure);
    }
}

/// Key equality; durations and launch counts summed, touched files unioned
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchMerger;

impl Merger for LaunchMerger {
    fn same_identity(&self, a: &Record, b: &Record) -> bool {
        a.key == b.key
    }

    fn merge(&self, main: &mut Record, other: &Record) {
        main.measure = main.measure.saturating_add(other.measure);

        let (other_count, other_files) = match &other.extra {
            Extra::Launch { count, file_ids } => (*count, Some(file_ids)),
            Extra::None => (0, None),
        };

        if main.extra == Extra::None {
            main.extra = Extra::Launch {
                count: 0,
                file_ids: BTreeSet::new(),
            };
        }
        if let Extra::Launch { count, file_ids } = &mut main.extra {
            *count = count.saturating_add(other_count);
            if let Some(files) = other_files {
                file_ids.extend(files.iter().cloned());
            }
        }
    }
}

/// The default merger for a category
pub fn merger_for(category: Category) -> Arc<dyn Merger> {
    match category {
        Category::Launch => Arc::new(LaunchMerger),
        _ => Arc::new(SumMerger),
    }
}
