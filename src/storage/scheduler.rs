//! Background commits
//!
//! Each storer is owned behind its own mutex, which serializes commits per
//! storer; storers of different categories commit independently. Commits
//! run on tokio's blocking pool since they do file I/O.

use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::storer::{CommitReport, Storer};
use crate::storage::types::Category;

/// A storer shared between its producers and the scheduler
pub type SharedStorer = Arc<Mutex<Storer>>;

pub fn shared(storer: Storer) -> SharedStorer {
    Arc::new(Mutex::new(storer))
}

/// Commit a shared storer on the blocking pool
pub async fn commit_shared(storer: SharedStorer) -> StorageResult<CommitReport> {
    tokio::task::spawn_blocking(move || {
        let mut guard = storer
            .lock()
            .map_err(|e| StorageError::Lock(format!("Failed to acquire storer lock: {}", e)))?;
        guard.commit()
    })
    .await
    .map_err(|e| StorageError::Lock(format!("Commit task failed: {}", e)))?
}

/// Periodically commits a set of storers
pub struct CommitScheduler {
    storers: Vec<SharedStorer>,
    interval: Duration,
    shutdown: RwLock<bool>,
}

impl CommitScheduler {
    /// Intervals below one millisecond are raised to one millisecond
    pub fn new(storers: Vec<SharedStorer>, interval: Duration) -> Self {
        Self {
            storers,
            interval: interval.max(Duration::from_millis(1)),
            shutdown: RwLock::new(false),
        }
    }

    pub fn storers(&self) -> &[SharedStorer] {
        &self.storers
    }

    /// Commit every storer holding buffered data
    ///
    /// Failures are logged and returned per category; the failed storers
    /// keep their data for the next round.
    pub async fn commit_all(&self) -> Vec<(Category, StorageResult<CommitReport>)> {
        let mut results = Vec::new();

        for storer in &self.storers {
            let (category, pending) = match storer.lock() {
                Ok(guard) => (guard.category(), !guard.is_empty()),
                Err(e) => {
                    tracing::error!("Storer lock poisoned: {}", e);
                    continue;
                }
            };
            if !pending {
                continue;
            }

            let result = commit_shared(Arc::clone(storer)).await;
            if let Err(ref e) = result {
                tracing::error!(%category, "Scheduled commit failed: {}", e);
            }
            results.push((category, result));
        }

        results
    }

    /// Start the background commit task
    ///
    /// Commits on every tick until [`CommitScheduler::shutdown`] is called,
    /// then performs one final commit. Buffered past-month data therefore
    /// reaches disk even if no newer event ever triggers a rollover.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(scheduler.interval);

            loop {
                ticker.tick().await;

                if *scheduler.shutdown.read().await {
                    break;
                }

                scheduler.commit_all().await;
            }

            scheduler.commit_all().await;
            tracing::debug!("Commit scheduler stopped");
        })
    }

    /// Stop the background task and commit everything still buffered
    pub async fn shutdown(&self) -> StorageResult<()> {
        *self.shutdown.write().await = true;

        let mut first_error = None;
        for (_, result) in self.commit_all().await {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
