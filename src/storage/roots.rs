//! Storage root registry
//!
//! A base directory holds one subdirectory per workspace ever tracked on
//! this machine. The active workspace's directory name is a sanitized form
//! of its filesystem location, so it stays the same across restarts.
//!
//! ```text
//! <base_dir>/
//! ├── -home-alice-workspace/
//! │   ├── commandEvents-2024-03.xml
//! │   └── fileEvents-2024-03.xml
//! └── -home-alice-old-workspace/
//!     └── commandEvents-2023-11.xml
//! ```

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};

use crate::storage::types::Category;

/// Directory holding every partition of one tracked workspace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageRoot {
    /// Directory name, the workspace identity
    pub name: String,
    /// Full path of the directory
    pub dir: PathBuf,
}

impl StorageRoot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { name, dir }
    }

    /// Directory holding `category`'s partitions; all categories share the
    /// root and are told apart by file prefix
    pub fn dir_for(&self, _category: Category) -> &Path {
        &self.dir
    }
}

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("static regex"))
}

/// Directory name for a workspace location
///
/// Every character outside `[A-Za-z0-9._-]` becomes `-`. The mapping is not
/// injective: `/work/a b` and `/work/a-b` both map to `-work-a-b` and share
/// one storage root, so their usage is reported as one workspace.
pub fn workspace_dir_name(workspace: &Path) -> String {
    let raw = workspace.to_string_lossy();
    let name = unsafe_chars().replace_all(&raw, "-").into_owned();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "workspace".to_string()
    } else {
        name
    }
}

/// Enumerates storage roots under a (reconfigurable) base directory
#[derive(Debug)]
pub struct RootRegistry {
    base_dir: RwLock<PathBuf>,
    workspace: PathBuf,
}

impl RootRegistry {
    /// Create a registry for the workspace at `workspace`
    pub fn new(base_dir: impl Into<PathBuf>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: RwLock::new(base_dir.into()),
            workspace: workspace.into(),
        }
    }

    pub fn base_dir(&self) -> PathBuf {
        match self.base_dir.read() {
            Ok(dir) => dir.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Point the registry at a new base directory (e.g. the user moved the
    /// storage location). Subsequent `roots()` calls see the new layout.
    pub fn set_base_dir(&self, base_dir: impl Into<PathBuf>) {
        let base_dir = base_dir.into();
        tracing::info!(base_dir = ?base_dir, "Storage base directory changed");
        match self.base_dir.write() {
            Ok(mut dir) => *dir = base_dir,
            Err(poisoned) => *poisoned.into_inner() = base_dir,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Root of the live workspace; may not exist on disk yet
    pub fn active_root(&self) -> StorageRoot {
        let name = workspace_dir_name(&self.workspace);
        StorageRoot {
            dir: self.base_dir().join(&name),
            name,
        }
    }

    /// Every known root, sorted by name, always including the active one
    ///
    /// Rescans the base directory on each call. Scan failures are logged
    /// and degrade to whatever was found.
    pub fn roots(&self) -> Vec<StorageRoot> {
        let base = self.base_dir();
        let mut roots = Vec::new();

        match std::fs::read_dir(&base) {
            Ok(entries) => {
                for entry in entries {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(e) => {
                            tracing::warn!(
                                base_dir = ?base,
                                "Failed to read directory entry: {}",
                                e
                            );
                            continue;
                        }
                    };
                    let path = entry.path();
                    if path.is_dir() {
                        roots.push(StorageRoot::new(path));
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(base_dir = ?base, "Failed to scan storage roots: {}", e);
            }
        }

        let active = self.active_root();
        if !roots.iter().any(|r| r.name == active.name) {
            roots.push(active);
        }

        roots.sort_by(|a, b| a.name.cmp(&b.name));
        roots
    }
}
