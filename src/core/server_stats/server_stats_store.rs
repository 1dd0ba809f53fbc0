use super::server_stats_models::GuildStats;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait ServerStatsStore: Send + Sync {
    async fn get_guild(&self, guild_id: u64) -> Result<Option<GuildStats>, StoreError>;
    /// Stage a guild's stats. May only reach disk on the next `flush`.
    async fn save_guild(&self, guild_id: u64, stats: GuildStats) -> Result<(), StoreError>;
    async fn guild_ids(&self) -> Result<Vec<u64>, StoreError>;
    /// Write staged changes out.
    async fn flush(&self) -> Result<(), StoreError>;
}
