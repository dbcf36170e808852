//! # Usage Ledger
//!
//! Aggregation and date-partitioned persistence of IDE usage telemetry:
//! time spent in files, parts, perspectives, launches and tasks, and
//! commands executed.
//!
//! ## Features
//!
//! - **Merge on insert**: at most one record per identity per day
//! - **Monthly partitions**: one XML file per category and month per workspace
//! - **Read-merge-write commits**: atomic replace, failed commits keep data buffered
//! - **Range queries**: fan-in across months and every tracked workspace
//! - **Tolerant reads**: missing or corrupt partitions degrade to empty
//!
//! ## Modules
//!
//! - [`storage`]: Storer, accessor, codec, naming and root registry
//! - [`usage`]: Typed per-category results
//! - [`ledger`]: Explicit wiring of registry, codec and clock
//! - [`config`]: TOML configuration with environment overrides
//! - [`logging`]: tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use usage_ledger::{Category, Event, Key, LedgerContext, RootRegistry};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let context = LedgerContext::new(Arc::new(RootRegistry::new("./usage", "/home/me/ws")));
//!
//!     let mut commands = context.storer(Category::Command);
//!     let instant = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap().and_hms_opt(9, 0, 0).unwrap();
//!     commands.insert(Event::occurrence(Key::command("cmd.save"), instant))?;
//!     commands.commit()?;
//!
//!     let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//!     let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
//!     for usage in context.commands().get_totals(start, end)? {
//!         println!("{}: {}", usage.command_id, usage.count);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod ledger;
pub mod logging;
pub mod storage;
pub mod usage;

// Re-export top-level types for convenience
pub use storage::{
    Accessor, Category, CommitReport, CommitScheduler, ConvertError, DayBucket, Entry, Event,
    Key, Month, Record, RootRegistry, SharedStorer, StorageError, StorageResult, StorageRoot,
    Storer,
};

pub use ledger::LedgerContext;

pub use usage::{
    CommandUsage, FileUsage, LaunchUsage, PartUsage, PerspectiveUsage, ResourceResolver,
    SessionUsage, TaskUsage,
};

pub use config::{generate_default_config, Config, ConfigError, LoggingConfig, StorageConfig};
