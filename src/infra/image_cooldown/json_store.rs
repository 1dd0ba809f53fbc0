use crate::core::image_cooldown::{ImageCooldownConfig, ImageCooldownError, ImageCooldownStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Debug, Default, Serialize, Deserialize)]
struct GuildEntry {
    #[serde(default)]
    config: Option<ImageCooldownConfig>,
    #[serde(default)]
    last_posts: HashMap<u64, DateTime<Utc>>,
}

/// Image cooldown settings and last-post times, kept in one JSON file.
pub struct JsonImageCooldownStore {
    path: PathBuf,
    cache: RwLock<HashMap<u64, GuildEntry>>,
}

fn storage_err(e: impl std::fmt::Display) -> ImageCooldownError {
    ImageCooldownError::StorageError(e.to_string())
}

impl JsonImageCooldownStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = std::fs::File::open(&path)
            .ok()
            .and_then(|file| serde_json::from_reader(file).ok())
            .unwrap_or_default();

        Self {
            path,
            cache: RwLock::new(map),
        }
    }

    async fn persist(&self) -> Result<(), ImageCooldownError> {
        let cache = self.cache.read().await;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }
        let file = std::fs::File::create(&self.path).map_err(storage_err)?;
        serde_json::to_writer_pretty(file, &*cache).map_err(storage_err)?;
        Ok(())
    }
}

#[async_trait]
impl ImageCooldownStore for JsonImageCooldownStore {
    async fn get_config(
        &self,
        guild_id: u64,
    ) -> Result<Option<ImageCooldownConfig>, ImageCooldownError> {
        let cache = self.cache.read().await;
        Ok(cache.get(&guild_id).and_then(|entry| entry.config.clone()))
    }

    async fn save_config(
        &self,
        guild_id: u64,
        config: &ImageCooldownConfig,
    ) -> Result<(), ImageCooldownError> {
        let mut cache = self.cache.write().await;
        cache.entry(guild_id).or_default().config = Some(config.clone());
        drop(cache);
        self.persist().await
    }

    async fn get_last_post(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<Option<DateTime<Utc>>, ImageCooldownError> {
        let cache = self.cache.read().await;
        Ok(cache
            .get(&guild_id)
            .and_then(|entry| entry.last_posts.get(&member_id).copied()))
    }

    async fn set_last_post(
        &self,
        guild_id: u64,
        member_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), ImageCooldownError> {
        let mut cache = self.cache.write().await;
        cache
            .entry(guild_id)
            .or_default()
            .last_posts
            .insert(member_id, at);
        drop(cache);
        self.persist().await
    }
}
