//! Usage Ledger Storage Engine
//!
//! This module provides the event aggregation and partitioned persistence:
//!
//! - **types**: Core data structures (Event, Record, DayBucket, Category)
//! - **clock**: Calendar months and day conversion
//! - **naming**: Partition file names per (category, month, root)
//! - **codec**: XML partition documents
//! - **merger**: Identity and measure-combination rules
//! - **storer**: Buffered write path with read-merge-write commits
//! - **accessor**: Range queries across roots and partitions
//! - **roots**: Storage root registry
//! - **scheduler**: Background commits for shared storers
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Event → Storer buffer (merge per day/identity) → Commit → Partition file
//!
//! Read Path:
//!   Range → Roots × Months → Partition files → Filter days → Convert
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use usage_ledger::storage::{Accessor, Category, Event, Key, RootRegistry, Storer};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(RootRegistry::new("./usage", "/home/me/workspace"));
//!
//!     let mut storer = Storer::new(Category::Command, registry.active_root());
//!     let instant = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(10, 0, 0).unwrap();
//!     storer.insert(Event::occurrence(Key::command("cmd.save"), instant))?;
//!     storer.commit()?;
//!
//!     let accessor = Accessor::raw(Category::Command, registry);
//!     let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//!     let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
//!     for entry in accessor.get_data(start, end)? {
//!         println!("{} {:?} {}", entry.date, entry.record.key, entry.record.measure);
//!     }
//!     Ok(())
//! }
//! ```

pub mod accessor;
pub mod clock;
pub mod codec;
pub mod error;
pub mod merger;
pub mod naming;
pub mod roots;
pub mod scheduler;
pub mod storer;
pub mod types;

// Re-export commonly used types
pub use accessor::{Accessor, Converter};
pub use clock::{day_of, Clock, FixedClock, Month, SystemClock};
pub use codec::{backup_corrupt, fold_buckets, Codec, ReadOutcome, XmlCodec};
pub use error::{ConvertError, StorageError, StorageResult};
pub use merger::{merger_for, LaunchMerger, Merger, SumMerger};
pub use naming::{available_months, file_for, files_for, files_for_roots};
pub use roots::{workspace_dir_name, RootRegistry, StorageRoot};
pub use scheduler::{commit_shared, shared, CommitScheduler, SharedStorer};
pub use storer::{CommitReport, Storer};
pub use types::{Category, DayBucket, Entry, Event, Extra, Key, Record};
