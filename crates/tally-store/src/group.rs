//! Group resolvers: lazily open one store per group and cache it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

use tally_core::GroupId;

use crate::error::{Result, StoreError};
use crate::memory::MemoryGroupStore;
use crate::sqlite::SqliteGroupStore;
use crate::traits::GroupResolver;

/// File extension of group databases.
const DB_EXTENSION: &str = "sqlite";

/// Where [`SqliteGroups`] keeps its databases.
#[derive(Debug, Clone)]
enum Location {
    /// `<dir>/<group_id>.sqlite`
    Directory(PathBuf),
    /// One in-memory database per group, gone when the resolver drops.
    Memory,
}

/// Handle slot for one group, filled once by whichever caller opens it first.
type Slot = Arc<OnceCell<Arc<SqliteGroupStore>>>;

/// SQLite-backed resolver: one database per group.
///
/// The map lock is held only to find a group's slot. Opening and migrating
/// a database happens outside it, so a slow first open of one group never
/// delays resolution of another.
pub struct SqliteGroups {
    location: Location,
    open: Mutex<HashMap<GroupId, Slot>>,
}

impl SqliteGroups {
    /// Keep group databases under `dir`, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            location: Location::Directory(dir),
            open: Mutex::new(HashMap::new()),
        })
    }

    /// Keep every group in its own in-memory database.
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the database file for `group`, if file-backed.
    pub fn db_path(&self, group: &GroupId) -> Option<PathBuf> {
        match &self.location {
            Location::Directory(dir) => {
                Some(dir.join(format!("{}.{}", group.as_str(), DB_EXTENSION)))
            }
            Location::Memory => None,
        }
    }

    async fn open_store(&self, group: &GroupId) -> Result<Arc<SqliteGroupStore>> {
        let group_id = group.clone();
        let store = match self.db_path(group) {
            Some(path) => {
                tokio::task::spawn_blocking(move || SqliteGroupStore::open(group_id, path))
                    .await
                    .map_err(|e| {
                        StoreError::Unavailable(format!("spawn_blocking failed: {}", e))
                    })??
            }
            None => SqliteGroupStore::open_memory(group_id)?,
        };

        info!(group = %group, "opened group store");
        Ok(Arc::new(store))
    }
}

/// Group ids of the `*.sqlite` files directly under `dir`.
fn scan_dir(dir: &Path) -> Result<Vec<GroupId>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(DB_EXTENSION) {
            continue;
        }
        // Files that do not name a valid group are not ours.
        if let Some(group) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| GroupId::new(s).ok())
        {
            found.push(group);
        }
    }
    Ok(found)
}

#[async_trait]
impl GroupResolver for SqliteGroups {
    type Store = SqliteGroupStore;

    async fn resolve(&self, group: &GroupId) -> Result<Arc<SqliteGroupStore>> {
        let slot = {
            let mut open = self.open.lock().await;
            Arc::clone(open.entry(group.clone()).or_default())
        };

        // A failed open leaves the slot empty; the next call retries.
        let store = slot.get_or_try_init(|| self.open_store(group)).await?;
        Ok(Arc::clone(store))
    }

    async fn list_groups(&self) -> Result<Vec<GroupId>> {
        let mut groups: Vec<GroupId> = match &self.location {
            Location::Directory(dir) => {
                let dir = dir.clone();
                tokio::task::spawn_blocking(move || scan_dir(&dir))
                    .await
                    .map_err(|e| {
                        StoreError::Unavailable(format!("spawn_blocking failed: {}", e))
                    })??
            }
            Location::Memory => self
                .open
                .lock()
                .await
                .iter()
                .filter(|(_, slot)| slot.initialized())
                .map(|(group, _)| group.clone())
                .collect(),
        };
        groups.sort();
        Ok(groups)
    }
}

/// In-memory resolver backed by [`MemoryGroupStore`].
#[derive(Default)]
pub struct MemoryGroups {
    open: Mutex<HashMap<GroupId, Arc<MemoryGroupStore>>>,
}

impl MemoryGroups {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupResolver for MemoryGroups {
    type Store = MemoryGroupStore;

    async fn resolve(&self, group: &GroupId) -> Result<Arc<MemoryGroupStore>> {
        let mut open = self.open.lock().await;
        let store = open
            .entry(group.clone())
            .or_insert_with(|| Arc::new(MemoryGroupStore::new(group.clone())));
        Ok(Arc::clone(store))
    }

    async fn list_groups(&self) -> Result<Vec<GroupId>> {
        let mut groups: Vec<GroupId> = self.open.lock().await.keys().cloned().collect();
        groups.sort();
        Ok(groups)
    }
}
