use crate::core::server_stats::{GuildStats, ServerStatsStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Message statistics for every guild, in one JSON file.
///
/// Writes go to the in-memory cache and mark it dirty; `flush` writes the
/// file. Counting a message therefore never touches the disk.
pub struct JsonServerStatsStore {
    path: PathBuf,
    cache: RwLock<HashMap<u64, GuildStats>>,
    dirty: AtomicBool,
}

impl JsonServerStatsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match std::fs::File::open(&path) {
            Ok(file) => serde_json::from_reader(file).unwrap_or_else(|e| {
                tracing::warn!("Could not parse {}: {}, starting empty", path.display(), e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            path,
            cache: RwLock::new(map),
            dirty: AtomicBool::new(false),
        }
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let cache = self.cache.read().await;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(&self.path)?;
        serde_json::to_writer_pretty(file, &*cache)?;
        Ok(())
    }
}

#[async_trait]
impl ServerStatsStore for JsonServerStatsStore {
    async fn get_guild(&self, guild_id: u64) -> Result<Option<GuildStats>, StoreError> {
        let cache = self.cache.read().await;
        Ok(cache.get(&guild_id).cloned())
    }

    async fn save_guild(&self, guild_id: u64, stats: GuildStats) -> Result<(), StoreError> {
        let mut cache = self.cache.write().await;
        cache.insert(guild_id, stats);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    async fn guild_ids(&self) -> Result<Vec<u64>, StoreError> {
        let cache = self.cache.read().await;
        Ok(cache.keys().copied().collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = self.persist().await {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[tokio::test]
    async fn saves_only_reach_disk_on_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        let store = JsonServerStatsStore::new(&path);

        let mut stats = GuildStats::default();
        stats.record_message(1, 2, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        store.save_guild(7, stats.clone()).await.unwrap();
        assert!(!path.exists());

        store.flush().await.unwrap();
        let reloaded = JsonServerStatsStore::new(&path);
        assert_eq!(reloaded.get_guild(7).await.unwrap(), Some(stats));
        assert_eq!(reloaded.guild_ids().await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn flush_without_changes_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        let store = JsonServerStatsStore::new(&path);

        store.flush().await.unwrap();
        assert!(!path.exists());
    }
}
