use crate::core::leveling::{GuildConfig, LevelingError, LevelingStore, MemberState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// SQLite-backed leveling store.
///
/// Guild settings are kept as one JSON document per guild since they're
/// always read as a whole. Member progress gets one column per field.
pub struct SqliteLevelingStore {
    pool: Pool<Sqlite>,
}

fn storage_err(e: impl std::fmt::Display) -> LevelingError {
    LevelingError::StorageError(e.to_string())
}

impl SqliteLevelingStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new().connect(&conn_str).await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and make sure the tables exist.
    pub async fn from_pool(pool: Pool<Sqlite>) -> anyhow::Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guild_configs (
                guild_id INTEGER PRIMARY KEY,
                config TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS member_levels (
                guild_id INTEGER NOT NULL,
                member_id INTEGER NOT NULL,
                username TEXT NOT NULL DEFAULT '',
                exp INTEGER NOT NULL DEFAULT 0,
                level INTEGER NOT NULL DEFAULT 0,
                goal INTEGER NOT NULL DEFAULT 100,
                last_trigger TEXT,
                role_name TEXT,
                message_count INTEGER NOT NULL DEFAULT 0,
                xp_message_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (guild_id, member_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl LevelingStore for SqliteLevelingStore {
    async fn get_guild_config(&self, guild_id: u64) -> Result<Option<GuildConfig>, LevelingError> {
        let row = sqlx::query("SELECT config FROM guild_configs WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        match row {
            Some(row) => {
                let json: String = row.get("config");
                serde_json::from_str(&json).map(Some).map_err(storage_err)
            }
            None => Ok(None),
        }
    }

    async fn save_guild_config(
        &self,
        guild_id: u64,
        config: &GuildConfig,
    ) -> Result<(), LevelingError> {
        let json = serde_json::to_string(config).map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO guild_configs (guild_id, config) VALUES (?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET config = excluded.config
            "#,
        )
        .bind(guild_id as i64)
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn delete_guild_config(&self, guild_id: u64) -> Result<(), LevelingError> {
        sqlx::query("DELETE FROM guild_configs WHERE guild_id = ?")
            .bind(guild_id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_member(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<Option<MemberState>, LevelingError> {
        let row = sqlx::query("SELECT * FROM member_levels WHERE guild_id = ? AND member_id = ?")
            .bind(guild_id as i64)
            .bind(member_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.as_ref().map(row_to_member))
    }

    async fn save_member(&self, guild_id: u64, state: &MemberState) -> Result<(), LevelingError> {
        sqlx::query(
            r#"
            INSERT INTO member_levels (
                guild_id, member_id, username, exp, level, goal,
                last_trigger, role_name, message_count, xp_message_count
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guild_id, member_id) DO UPDATE SET
                username = excluded.username,
                exp = excluded.exp,
                level = excluded.level,
                goal = excluded.goal,
                last_trigger = excluded.last_trigger,
                role_name = excluded.role_name,
                message_count = excluded.message_count,
                xp_message_count = excluded.xp_message_count
            "#,
        )
        .bind(guild_id as i64)
        .bind(state.member_id as i64)
        .bind(state.username.as_str())
        .bind(state.exp as i64)
        .bind(state.level as i64)
        .bind(state.goal as i64)
        .bind(state.last_trigger)
        .bind(state.role_name.as_deref())
        .bind(state.message_count as i64)
        .bind(state.xp_message_count as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn delete_member(&self, guild_id: u64, member_id: u64) -> Result<bool, LevelingError> {
        let result = sqlx::query("DELETE FROM member_levels WHERE guild_id = ? AND member_id = ?")
            .bind(guild_id as i64)
            .bind(member_id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_guild_members(&self, guild_id: u64) -> Result<u64, LevelingError> {
        let result = sqlx::query("DELETE FROM member_levels WHERE guild_id = ?")
            .bind(guild_id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn get_all_members(&self, guild_id: u64) -> Result<Vec<MemberState>, LevelingError> {
        let rows = sqlx::query("SELECT * FROM member_levels WHERE guild_id = ?")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(rows.iter().map(row_to_member).collect())
    }
}

fn row_to_member(row: &sqlx::sqlite::SqliteRow) -> MemberState {
    MemberState {
        member_id: row.get::<i64, _>("member_id") as u64,
        username: row.get("username"),
        exp: row.get::<i64, _>("exp") as u64,
        level: row.get::<i64, _>("level") as u32,
        goal: row.get::<i64, _>("goal") as u64,
        last_trigger: row.get::<Option<DateTime<Utc>>, _>("last_trigger"),
        role_name: row.get("role_name"),
        message_count: row.get::<i64, _>("message_count") as u64,
        xp_message_count: row.get::<i64, _>("xp_message_count") as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::leveling::RoleTier;

    // Every connection to :memory: is its own database, so pin the pool to one.
    async fn memory_store() -> SqliteLevelingStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        SqliteLevelingStore::from_pool(pool).await.unwrap()
    }

    #[tokio::test]
    async fn member_roundtrip_keeps_every_field() {
        let store = memory_store().await;
        let mut state = MemberState::new(42, "ana", &GuildConfig::default());
        state.exp = 33;
        state.level = 4;
        state.goal = 380;
        state.last_trigger = Some(Utc::now());
        state.role_name = Some("Adept".into());
        state.message_count = 12;
        state.xp_message_count = 9;

        store.save_member(7, &state).await.unwrap();
        let loaded = store.get_member(7, 42).await.unwrap().unwrap();

        assert_eq!(loaded.exp, 33);
        assert_eq!(loaded.level, 4);
        assert_eq!(loaded.goal, 380);
        assert_eq!(loaded.role_name.as_deref(), Some("Adept"));
        assert_eq!(loaded.message_count, 12);
        assert_eq!(loaded.xp_message_count, 9);
        assert_eq!(
            loaded.last_trigger.map(|t| t.timestamp()),
            state.last_trigger.map(|t| t.timestamp())
        );
    }

    #[tokio::test]
    async fn upsert_overwrites_and_deletes_count_rows() {
        let store = memory_store().await;
        let mut state = MemberState::new(1, "a", &GuildConfig::default());
        store.save_member(7, &state).await.unwrap();
        state.exp = 99;
        store.save_member(7, &state).await.unwrap();
        store
            .save_member(7, &MemberState::new(2, "b", &GuildConfig::default()))
            .await
            .unwrap();

        assert_eq!(store.get_member(7, 1).await.unwrap().unwrap().exp, 99);
        assert_eq!(store.get_all_members(7).await.unwrap().len(), 2);
        assert!(store.delete_member(7, 1).await.unwrap());
        assert!(!store.delete_member(7, 1).await.unwrap());
        assert_eq!(store.delete_guild_members(7).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn guild_config_is_stored_as_json() {
        let store = memory_store().await;
        let config = GuildConfig {
            xp_gain_factor: 0.25,
            role_tiers: vec![RoleTier {
                role_id: 5,
                role_name: "Regular".into(),
                level: 3,
                description: "talks a lot".into(),
            }],
            ..GuildConfig::default()
        };

        store.save_guild_config(1, &config).await.unwrap();
        assert_eq!(store.get_guild_config(1).await.unwrap(), Some(config));

        store.delete_guild_config(1).await.unwrap();
        assert!(store.get_guild_config(1).await.unwrap().is_none());
    }
}
