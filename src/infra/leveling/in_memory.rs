// In-memory implementation of LevelingStore.
//
// Used by tests and handy for running the bot without a database file.
// Nothing survives a restart.

use crate::core::leveling::{GuildConfig, LevelingError, LevelingStore, MemberState};
use async_trait::async_trait;
use dashmap::DashMap;

/// A composite key for member records.
/// Members can be in several guilds, and progress is tracked per guild.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct MemberKey {
    guild_id: u64,
    member_id: u64,
}

/// **DashMap:** a concurrent HashMap, safe to share across async tasks
/// without wrapping the whole store in a Mutex.
pub struct InMemoryLevelingStore {
    configs: DashMap<u64, GuildConfig>,
    members: DashMap<MemberKey, MemberState>,
}

impl InMemoryLevelingStore {
    pub fn new() -> Self {
        Self {
            configs: DashMap::new(),
            members: DashMap::new(),
        }
    }
}

impl Default for InMemoryLevelingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LevelingStore for InMemoryLevelingStore {
    async fn get_guild_config(&self, guild_id: u64) -> Result<Option<GuildConfig>, LevelingError> {
        Ok(self.configs.get(&guild_id).map(|entry| entry.clone()))
    }

    async fn save_guild_config(
        &self,
        guild_id: u64,
        config: &GuildConfig,
    ) -> Result<(), LevelingError> {
        self.configs.insert(guild_id, config.clone());
        Ok(())
    }

    async fn delete_guild_config(&self, guild_id: u64) -> Result<(), LevelingError> {
        self.configs.remove(&guild_id);
        Ok(())
    }

    async fn get_member(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<Option<MemberState>, LevelingError> {
        let key = MemberKey {
            guild_id,
            member_id,
        };
        Ok(self.members.get(&key).map(|entry| entry.clone()))
    }

    async fn save_member(&self, guild_id: u64, state: &MemberState) -> Result<(), LevelingError> {
        let key = MemberKey {
            guild_id,
            member_id: state.member_id,
        };
        self.members.insert(key, state.clone());
        Ok(())
    }

    async fn delete_member(&self, guild_id: u64, member_id: u64) -> Result<bool, LevelingError> {
        let key = MemberKey {
            guild_id,
            member_id,
        };
        Ok(self.members.remove(&key).is_some())
    }

    async fn delete_guild_members(&self, guild_id: u64) -> Result<u64, LevelingError> {
        let before = self.members.len();
        self.members.retain(|key, _| key.guild_id != guild_id);
        Ok((before - self.members.len()) as u64)
    }

    async fn get_all_members(&self, guild_id: u64) -> Result<Vec<MemberState>, LevelingError> {
        Ok(self
            .members
            .iter()
            .filter(|entry| entry.key().guild_id == guild_id)
            .map(|entry| entry.value().clone())
            .collect())
    }
}
