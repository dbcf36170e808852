//! Explicit wiring of registry, codec and clock
//!
//! Everything a storer or accessor needs is passed in here instead of being
//! looked up from process-wide state.

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::storage::{
    shared, Accessor, Category, Clock, Codec, CommitScheduler, ConvertError, Entry, RootRegistry,
    SharedStorer, Storer, SystemClock, XmlCodec,
};
use crate::usage::{
    CommandUsage, FileUsage, LaunchUsage, PartUsage, PerspectiveUsage, ResourceResolver,
    SessionUsage, TaskUsage,
};

#[derive(Clone)]
pub struct LedgerContext {
    registry: Arc<RootRegistry>,
    codec: Arc<dyn Codec>,
    clock: Arc<dyn Clock>,
}

impl LedgerContext {
    pub fn new(registry: Arc<RootRegistry>) -> Self {
        Self {
            registry,
            codec: Arc::new(XmlCodec),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(Arc::new(RootRegistry::new(config.base_dir(), config.workspace())))
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Arc<RootRegistry> {
        &self.registry
    }

    /// Storer bound to the active workspace's root
    pub fn storer(&self, category: Category) -> Storer {
        Storer::new(category, self.registry.active_root())
            .with_codec(Arc::clone(&self.codec))
            .with_clock(Arc::clone(&self.clock))
    }

    /// One shared storer per category
    pub fn shared_storers(&self) -> Vec<SharedStorer> {
        Category::all()
            .iter()
            .map(|category| shared(self.storer(*category)))
            .collect()
    }

    /// Scheduler committing `storers` at the configured interval
    pub fn scheduler(
        &self,
        storers: Vec<SharedStorer>,
        config: &StorageConfig,
    ) -> Arc<CommitScheduler> {
        Arc::new(CommitScheduler::new(storers, config.commit_interval()))
    }

    pub fn accessor<T, F>(&self, category: Category, convert: F) -> Accessor<T>
    where
        F: Fn(&Entry) -> Result<T, ConvertError> + Send + Sync + 'static,
    {
        Accessor::new(category, Arc::clone(&self.registry), convert)
            .with_codec(Arc::clone(&self.codec))
    }

    pub fn entries(&self, category: Category) -> Accessor<Entry> {
        Accessor::raw(category, Arc::clone(&self.registry)).with_codec(Arc::clone(&self.codec))
    }

    pub fn commands(&self) -> Accessor<CommandUsage> {
        self.accessor(Category::Command, |e: &Entry| CommandUsage::try_from(e))
    }

    pub fn parts(&self) -> Accessor<PartUsage> {
        self.accessor(Category::Part, |e: &Entry| PartUsage::try_from(e))
    }

    pub fn perspectives(&self) -> Accessor<PerspectiveUsage> {
        self.accessor(Category::Perspective, |e: &Entry| PerspectiveUsage::try_from(e))
    }

    pub fn sessions(&self) -> Accessor<SessionUsage> {
        self.accessor(Category::Session, |e: &Entry| SessionUsage::try_from(e))
    }

    pub fn launches(&self) -> Accessor<LaunchUsage> {
        self.accessor(Category::Launch, |e: &Entry| LaunchUsage::try_from(e))
    }

    pub fn tasks(&self) -> Accessor<TaskUsage> {
        self.accessor(Category::Task, |e: &Entry| TaskUsage::try_from(e))
    }

    /// File usage; files the resolver no longer knows are left out
    pub fn files(&self, resolver: Arc<dyn ResourceResolver>) -> Accessor<FileUsage> {
        self.accessor(Category::File, move |e: &Entry| {
            FileUsage::convert(e, resolver.as_ref())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Event, Key};
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_storer_targets_active_root() {
        let dir = tempdir().unwrap();
        let context = LedgerContext::new(Arc::new(RootRegistry::new(dir.path(), "/home/me/ws")));
        let storer = context.storer(Category::Perspective);
        assert_eq!(storer.root().name, "-home-me-ws");
        assert_eq!(context.shared_storers().len(), Category::all().len());
    }

    #[test]
    fn test_typed_file_accessor() {
        let dir = tempdir().unwrap();
        let context = LedgerContext::new(Arc::new(RootRegistry::new(dir.path(), "/ws")));
        let instant = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();

        let mut storer = context.storer(Category::File);
        storer
            .insert_batch(vec![
                Event::new(Key::file("live"), instant, 100),
                Event::new(Key::file("deleted"), instant, 200),
            ])
            .unwrap();
        storer.commit().unwrap();

        let resolver = |id: &str| (id == "live").then(|| PathBuf::from("/ws/live.rs"));
        let day = instant.date();
        let usage = context.files(Arc::new(resolver)).get_data(day, day).unwrap();

        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].path, PathBuf::from("/ws/live.rs"));
    }
}
