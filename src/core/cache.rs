use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Last-known dependency list per output file.
///
/// Entries live as long as the middleware that owns the cache. There is no
/// eviction: one entry exists per distinct output ever requested.
#[derive(Debug, Default)]
pub struct StalenessCache {
    entries: DashMap<PathBuf, Vec<PathBuf>>,
}

impl StalenessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, output: &Path) -> Option<Vec<PathBuf>> {
        self.entries.get(output).map(|deps| deps.value().clone())
    }

    pub fn insert(&self, output: PathBuf, dependencies: Vec<PathBuf>) {
        self.entries.insert(output, dependencies);
    }

    pub fn contains(&self, output: &Path) -> bool {
        self.entries.contains_key(output)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One in-flight build per output path
#[derive(Debug, Default)]
pub struct BuildLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl BuildLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other build holds `output`, then hold it until the guard drops
    pub async fn acquire(&self, output: &Path) -> OwnedMutexGuard<()> {
        // Clone the mutex out so the shard lock is not held across the await.
        let lock = self
            .locks
            .entry(output.to_path_buf())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }
}
