// Storage port for the leveling feature.
// The core defines WHAT it needs; infra decides how it's persisted.

use async_trait::async_trait;

use super::leveling_models::{GuildConfig, MemberState};
use super::leveling_service::LevelingError;

/// Persistence for guild settings and member progress.
///
/// Implementations only store and load. Validation, locking and the
/// read-modify-write cycle are handled by `LevelingService`.
#[async_trait]
pub trait LevelingStore: Send + Sync {
    /// `None` means the guild never changed a setting; callers use defaults.
    async fn get_guild_config(&self, guild_id: u64) -> Result<Option<GuildConfig>, LevelingError>;

    async fn save_guild_config(
        &self,
        guild_id: u64,
        config: &GuildConfig,
    ) -> Result<(), LevelingError>;

    async fn delete_guild_config(&self, guild_id: u64) -> Result<(), LevelingError>;

    async fn get_member(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<Option<MemberState>, LevelingError>;

    async fn save_member(&self, guild_id: u64, state: &MemberState) -> Result<(), LevelingError>;

    /// Returns `true` if a record was removed.
    async fn delete_member(&self, guild_id: u64, member_id: u64) -> Result<bool, LevelingError>;

    /// Remove every member of a guild. Returns how many were removed.
    async fn delete_guild_members(&self, guild_id: u64) -> Result<u64, LevelingError>;

    async fn get_all_members(&self, guild_id: u64) -> Result<Vec<MemberState>, LevelingError>;
}
