// This is the leveling service - it orchestrates the progression engine and
// the storage port. Like the engine, it has NO Discord-specific code.
//
// Responsibilities:
// - load / lazily create member state, run the engine, persist the result
// - validate every guild config write (bounds, tiers, ignore lists)
// - serialize read-modify-write cycles per member and per guild

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, RwLock};

use super::leveling_models::{
    AdminChange, ConfigUpdate, GuildConfig, LevelUpEvent, MemberState, MemberTierChange, RoleTier,
    TierChange,
};
use super::leveling_store::LevelingStore;
use super::progression;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum LevelingError {
    #[error("Member is on cooldown. Time remaining: {0:?}")]
    OnCooldown(Duration),

    #[error("XP tracking is disabled in this guild")]
    Inactive,

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid member or guild ID")]
    InvalidId,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Level must be 0 or higher (got {0})")]
    InvalidLevel(i64),

    #[error("**{role_name}** has already been assigned to level {level}!")]
    DuplicateTier { role_name: String, level: u32 },

    #[error("Role not found in the tier list")]
    TierNotFound,

    #[error("No data found for this member")]
    MemberNotFound,
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Leveling operations for every guild the bot is in.
///
/// **Locking:** serenity dispatches events concurrently, so two messages from
/// the same member can race. Every member read-modify-write happens under a
/// per-member async mutex, and config writes under a per-guild one.
/// Member writes also hold a shared per-guild gate that a guild-wide reset
/// takes exclusively, so no in-flight write can resurrect a wiped member.
pub struct LevelingService<S: LevelingStore> {
    store: S,
    member_locks: DashMap<(u64, u64), Arc<Mutex<()>>>,
    member_gates: DashMap<u64, Arc<RwLock<()>>>,
    guild_locks: DashMap<u64, Arc<Mutex<()>>>,
}

/// Held for the duration of one member read-modify-write.
///
/// The lock entry is dropped from the map on release unless another task is
/// already waiting on it, so the map only holds members with work in flight.
struct MemberGuard<'a> {
    locks: &'a DashMap<(u64, u64), Arc<Mutex<()>>>,
    key: (u64, u64),
    guard: Option<OwnedMutexGuard<()>>,
    _gate: OwnedRwLockReadGuard<()>,
}

impl Drop for MemberGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl<S: LevelingStore> LevelingService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            member_locks: DashMap::new(),
            member_gates: DashMap::new(),
            guild_locks: DashMap::new(),
        }
    }

    fn validate_ids(guild_id: u64, member_id: u64) -> Result<(), LevelingError> {
        if guild_id == 0 || member_id == 0 {
            Err(LevelingError::InvalidId)
        } else {
            Ok(())
        }
    }

    fn member_gate(&self, guild_id: u64) -> Arc<RwLock<()>> {
        self.member_gates
            .entry(guild_id)
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    // DashMap guards are dropped before anything is awaited.
    async fn lock_member(&self, guild_id: u64, member_id: u64) -> MemberGuard<'_> {
        let gate = self.member_gate(guild_id).read_owned().await;
        let key = (guild_id, member_id);
        let lock = self
            .member_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        MemberGuard {
            locks: &self.member_locks,
            key,
            guard: Some(lock.lock_owned().await),
            _gate: gate,
        }
    }

    fn guild_lock(&self, guild_id: u64) -> Arc<Mutex<()>> {
        self.guild_locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Current settings of a guild, defaults if it never changed any.
    pub async fn guild_config(&self, guild_id: u64) -> Result<GuildConfig, LevelingError> {
        Ok(self
            .store
            .get_guild_config(guild_id)
            .await?
            .unwrap_or_default())
    }

    /// Stored state of a member, or a fresh record. A fresh record that
    /// starts on a tier comes with the role change Discord still needs.
    async fn load_member(
        &self,
        guild_id: u64,
        member_id: u64,
        username: &str,
        config: &GuildConfig,
    ) -> Result<(MemberState, Option<TierChange>), LevelingError> {
        match self.store.get_member(guild_id, member_id).await? {
            Some(state) => Ok((state, None)),
            None => {
                tracing::debug!(guild_id, member_id, "Creating leveling record");
                let joined = config.starting_tier().map(|tier| TierChange {
                    previous: None,
                    current: Some(tier.clone()),
                });
                Ok((MemberState::new(member_id, username, config), joined))
            }
        }
    }

    /// Process a qualifying message and maybe award XP.
    ///
    /// **Returns:**
    /// - `Ok(Some(LevelUpEvent))` if the member leveled up or changed tier
    /// - `Ok(None)` if XP was awarded and nothing else moved
    /// - `Err(LevelingError::OnCooldown)` if the member is on cooldown
    ///   (the message still counts towards `message_count`)
    /// - `Err(LevelingError::Inactive)` if the guild turned XP tracking off
    pub async fn process_message(
        &self,
        guild_id: u64,
        member_id: u64,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<LevelUpEvent>, LevelingError> {
        Self::validate_ids(guild_id, member_id)?;

        let config = self.guild_config(guild_id).await?;
        if !config.active {
            return Err(LevelingError::Inactive);
        }

        let _guard = self.lock_member(guild_id, member_id).await;

        let (mut state, joined) = self
            .load_member(guild_id, member_id, username, &config)
            .await?;
        state.message_count += 1;

        let old_level = state.level;
        let old_role = match &joined {
            Some(change) => change.previous.clone(),
            None => state.role_name.clone(),
        };
        let progress = {
            let mut rng = rand::thread_rng();
            progression::award_message_xp(&config, &mut state, now, &mut rng)
        };

        self.store.save_member(guild_id, &state).await?;

        let Some(progress) = progress else {
            let remaining = progression::cooldown_remaining(&config, &state, now);
            return Err(LevelingError::OnCooldown(remaining));
        };

        let tier_change = chain_tier_changes(joined, progress.tier_change.clone());
        if !progress.leveled_up() && tier_change.is_none() {
            return Ok(None);
        }

        tracing::debug!(
            guild_id,
            member_id,
            xp_gained = progress.xp_gained,
            new_level = state.level,
            new_role = ?state.role_name,
            "Level or tier changed from message"
        );

        Ok(Some(LevelUpEvent {
            guild_id,
            member_id,
            username: state.username.clone(),
            old_level,
            new_level: state.level,
            exp: state.exp,
            goal: state.goal,
            old_role,
            new_role: state.role_name.clone(),
            tier_change,
        }))
    }

    /// Admin XP grant. Bypasses cooldown; may cascade through several levels.
    pub async fn give_xp(
        &self,
        guild_id: u64,
        member_id: u64,
        username: &str,
        amount: i64,
    ) -> Result<AdminChange, LevelingError> {
        Self::validate_ids(guild_id, member_id)?;
        let config = self.guild_config(guild_id).await?;

        let _guard = self.lock_member(guild_id, member_id).await;

        let (mut state, joined) = self
            .load_member(guild_id, member_id, username, &config)
            .await?;
        let progress = progression::grant_xp(&config, &mut state, amount);
        self.store.save_member(guild_id, &state).await?;

        tracing::info!(
            guild_id,
            member_id,
            amount,
            levels_gained = progress.levels_gained,
            "Admin granted XP"
        );

        Ok(AdminChange {
            state,
            levels_gained: progress.levels_gained,
            tier_change: chain_tier_changes(joined, progress.tier_change),
        })
    }

    /// Admin level override. XP is reset to 0 and the tier re-resolved.
    pub async fn set_level(
        &self,
        guild_id: u64,
        member_id: u64,
        username: &str,
        level: i64,
    ) -> Result<AdminChange, LevelingError> {
        Self::validate_ids(guild_id, member_id)?;
        let new_level = u32::try_from(level).map_err(|_| LevelingError::InvalidLevel(level))?;
        let config = self.guild_config(guild_id).await?;

        let _guard = self.lock_member(guild_id, member_id).await;

        let (mut state, joined) = self
            .load_member(guild_id, member_id, username, &config)
            .await?;
        let old_level = state.level;
        let tier_change = chain_tier_changes(
            joined,
            progression::set_level(&config, &mut state, new_level),
        );
        self.store.save_member(guild_id, &state).await?;

        tracing::info!(guild_id, member_id, old_level, new_level, "Admin set level");

        Ok(AdminChange {
            state,
            levels_gained: new_level.saturating_sub(old_level),
            tier_change,
        })
    }

    pub async fn member_state(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<Option<MemberState>, LevelingError> {
        Self::validate_ids(guild_id, member_id)?;
        self.store.get_member(guild_id, member_id).await
    }

    /// Delete all stored progress of one member.
    pub async fn reset_member(&self, guild_id: u64, member_id: u64) -> Result<(), LevelingError> {
        Self::validate_ids(guild_id, member_id)?;
        let _guard = self.lock_member(guild_id, member_id).await;

        if self.store.delete_member(guild_id, member_id).await? {
            tracing::info!(guild_id, member_id, "Member leveling data reset");
            Ok(())
        } else {
            Err(LevelingError::MemberNotFound)
        }
    }

    /// Wipe every member record of a guild. Settings are kept.
    ///
    /// Waits for in-flight member writes of the guild and holds new ones off
    /// until the wipe is done.
    pub async fn reset_guild_members(&self, guild_id: u64) -> Result<u64, LevelingError> {
        let gate = self.member_gate(guild_id);
        let _exclusive = gate.write().await;
        let removed = self.store.delete_guild_members(guild_id).await?;
        tracing::info!(guild_id, removed, "Guild leveling data reset");
        Ok(removed)
    }

    /// Restore default settings. Member progress is kept.
    pub async fn reset_config(&self, guild_id: u64) -> Result<GuildConfig, LevelingError> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;
        self.store.delete_guild_config(guild_id).await?;
        Ok(GuildConfig::default())
    }

    /// Members sorted by level then XP, capped at the guild's leaderboard max.
    pub async fn leaderboard(&self, guild_id: u64) -> Result<Vec<MemberState>, LevelingError> {
        let config = self.guild_config(guild_id).await?;
        let mut members = self.store.get_all_members(guild_id).await?;
        members.sort_by(|a, b| {
            (b.level, b.exp)
                .cmp(&(a.level, a.exp))
                .then(a.member_id.cmp(&b.member_id))
        });
        members.truncate(config.leaderboard_max);
        Ok(members)
    }

    /// Keep the stored display name in sync. Returns `false` for members
    /// the bot has no record of.
    pub async fn rename_member(
        &self,
        guild_id: u64,
        member_id: u64,
        username: &str,
    ) -> Result<bool, LevelingError> {
        let _guard = self.lock_member(guild_id, member_id).await;

        match self.store.get_member(guild_id, member_id).await? {
            Some(mut state) if state.username != username => {
                state.username = username.to_string();
                self.store.save_member(guild_id, &state).await?;
                Ok(true)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    // ------------------------------------------------------------------------
    // Config writes
    // ------------------------------------------------------------------------

    /// Read-modify-validate-write a guild's config under the guild lock.
    async fn modify_config<T>(
        &self,
        guild_id: u64,
        edit: impl FnOnce(&mut GuildConfig) -> Result<T, LevelingError>,
    ) -> Result<(T, GuildConfig), LevelingError> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let mut config = self.guild_config(guild_id).await?;
        let out = edit(&mut config)?;
        config.validate().map_err(LevelingError::InvalidConfig)?;
        self.store.save_guild_config(guild_id, &config).await?;
        Ok((out, config))
    }

    pub async fn update_config(
        &self,
        guild_id: u64,
        update: ConfigUpdate,
    ) -> Result<GuildConfig, LevelingError> {
        let (_, config) = self
            .modify_config(guild_id, |config| {
                update.apply(config);
                Ok(())
            })
            .await?;
        tracing::info!(guild_id, ?update, "Leveling config updated");
        Ok(config)
    }

    pub async fn tiers(&self, guild_id: u64) -> Result<Vec<RoleTier>, LevelingError> {
        Ok(self.guild_config(guild_id).await?.role_tiers)
    }

    /// Register a new tier. Role ids and levels must both be unused.
    ///
    /// Stored members are moved onto the tier their level now resolves to;
    /// the returned changes still have to be applied on Discord.
    pub async fn add_tier(
        &self,
        guild_id: u64,
        tier: RoleTier,
    ) -> Result<Vec<MemberTierChange>, LevelingError> {
        let (_, config) = self
            .modify_config(guild_id, |config| {
            if let Some(existing) = config
                .role_tiers
                .iter()
                .find(|t| t.role_id == tier.role_id || t.level == tier.level)
            {
                return Err(LevelingError::DuplicateTier {
                    role_name: existing.role_name.clone(),
                    level: existing.level,
                });
            }
            config.role_tiers.push(tier);
            config.role_tiers.sort_by_key(|t| t.level);
            Ok(())
        })
        .await?;
        self.resync_tiers(guild_id, &config).await
    }

    /// Drop a tier. Members holding it fall back to the next lower one.
    pub async fn remove_tier(
        &self,
        guild_id: u64,
        role_id: u64,
    ) -> Result<(RoleTier, Vec<MemberTierChange>), LevelingError> {
        let (removed, config) = self
            .modify_config(guild_id, |config| {
                let index = config
                    .role_tiers
                    .iter()
                    .position(|t| t.role_id == role_id)
                    .ok_or(LevelingError::TierNotFound)?;
                Ok(config.role_tiers.remove(index))
            })
            .await?;
        let changes = self.resync_tiers(guild_id, &config).await?;
        Ok((removed, changes))
    }

    /// Re-resolve the stored tier of every member against `config`.
    async fn resync_tiers(
        &self,
        guild_id: u64,
        config: &GuildConfig,
    ) -> Result<Vec<MemberTierChange>, LevelingError> {
        let mut changes = Vec::new();
        for listed in self.store.get_all_members(guild_id).await? {
            let _guard = self.lock_member(guild_id, listed.member_id).await;
            // The listing may be stale by the time the lock is ours
            let Some(mut state) = self.store.get_member(guild_id, listed.member_id).await? else {
                continue;
            };
            if let Some(change) = progression::sync_tier(config, &mut state) {
                self.store.save_member(guild_id, &state).await?;
                changes.push(MemberTierChange {
                    member_id: state.member_id,
                    change,
                });
            }
        }

        if !changes.is_empty() {
            tracing::info!(guild_id, updated = changes.len(), "Member tiers re-resolved");
        }
        Ok(changes)
    }

    /// Returns `true` if the channel is ignored after the toggle.
    pub async fn toggle_ignored_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<bool, LevelingError> {
        let (ignored, _) = self
            .modify_config(guild_id, |config| {
                Ok(toggle(&mut config.ignored_channels, channel_id))
            })
            .await?;
        Ok(ignored)
    }

    pub async fn toggle_ignored_role(
        &self,
        guild_id: u64,
        role_id: u64,
    ) -> Result<bool, LevelingError> {
        let (ignored, _) = self
            .modify_config(guild_id, |config| Ok(toggle(&mut config.ignored_roles, role_id)))
            .await?;
        Ok(ignored)
    }

    pub async fn toggle_ignored_member(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<bool, LevelingError> {
        let (ignored, _) = self
            .modify_config(guild_id, |config| {
                Ok(toggle(&mut config.ignored_members, member_id))
            })
            .await?;
        Ok(ignored)
    }
}

/// A new member's starting tier followed by whatever the engine did next,
/// folded into the one change Discord has to apply.
fn chain_tier_changes(first: Option<TierChange>, then: Option<TierChange>) -> Option<TierChange> {
    match (first, then) {
        (Some(first), Some(then)) => Some(TierChange {
            previous: first.previous,
            current: then.current,
        }),
        (first, then) => then.or(first),
    }
}

/// Add `id` if missing, remove it otherwise. Returns whether it's present now.
fn toggle(ids: &mut Vec<u64>, id: u64) -> bool {
    if let Some(index) = ids.iter().position(|x| *x == id) {
        ids.remove(index);
        false
    } else {
        ids.push(id);
        true
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::leveling::InMemoryLevelingStore;
    use chrono::Duration as ChronoDuration;

    const GUILD: u64 = 100;

    fn service() -> LevelingService<InMemoryLevelingStore> {
        LevelingService::new(InMemoryLevelingStore::new())
    }

    fn tier(role_id: u64, name: &str, level: u32) -> RoleTier {
        RoleTier {
            role_id,
            role_name: name.to_string(),
            level,
            description: "test tier".to_string(),
        }
    }

    #[tokio::test]
    async fn first_message_creates_member_and_awards_xp() {
        let service = service();

        let result = service.process_message(GUILD, 1, "ana", Utc::now()).await;
        assert!(matches!(result, Ok(None)));

        let state = service.member_state(GUILD, 1).await.unwrap().unwrap();
        assert_eq!(state.username, "ana");
        assert_eq!(state.message_count, 1);
        assert_eq!(state.xp_message_count, 1);
        assert!((15..=25).contains(&state.exp));
    }

    #[tokio::test]
    async fn cooldown_still_counts_messages() {
        let service = service();
        let now = Utc::now();

        service.process_message(GUILD, 1, "ana", now).await.unwrap();
        let second = service
            .process_message(GUILD, 1, "ana", now + ChronoDuration::seconds(5))
            .await;

        match second {
            Err(LevelingError::OnCooldown(remaining)) => {
                assert_eq!(remaining, Duration::from_secs(55))
            }
            other => panic!("expected cooldown, got {other:?}"),
        }

        let state = service.member_state(GUILD, 1).await.unwrap().unwrap();
        assert_eq!(state.message_count, 2);
        assert_eq!(state.xp_message_count, 1);
    }

    #[tokio::test]
    async fn inactive_guild_awards_nothing() {
        let service = service();
        service
            .update_config(GUILD, ConfigUpdate::Active(false))
            .await
            .unwrap();

        let result = service.process_message(GUILD, 1, "ana", Utc::now()).await;

        assert!(matches!(result, Err(LevelingError::Inactive)));
        assert!(service.member_state(GUILD, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn message_level_up_reports_event() {
        let service = service();
        // Min above the current max (25) is rejected, so raise the max first.
        assert!(service
            .update_config(GUILD, ConfigUpdate::MinXp(100))
            .await
            .is_err());
        service
            .update_config(GUILD, ConfigUpdate::MaxXp(100))
            .await
            .unwrap();
        service
            .update_config(GUILD, ConfigUpdate::MinXp(100))
            .await
            .unwrap();
        service.add_tier(GUILD, tier(9, "Chatter", 1)).await.unwrap();

        let event = service
            .process_message(GUILD, 1, "ana", Utc::now())
            .await
            .unwrap()
            .expect("100 XP reaches the default goal");

        assert_eq!(event.old_level, 0);
        assert_eq!(event.new_level, 1);
        assert_eq!(event.old_role, None);
        assert_eq!(event.new_role.as_deref(), Some("Chatter"));
        assert!(event.tier_change.is_some());
    }

    #[tokio::test]
    async fn first_message_picks_up_level_zero_tier() {
        let service = service();
        service.add_tier(GUILD, tier(1, "Novice", 0)).await.unwrap();

        let event = service
            .process_message(GUILD, 1, "ana", Utc::now())
            .await
            .unwrap()
            .expect("new member should be handed the Novice role");

        assert!(!event.leveled_up());
        assert_eq!(event.old_role, None);
        assert_eq!(event.new_role.as_deref(), Some("Novice"));
        let change = event.tier_change.unwrap();
        assert_eq!(change.previous, None);
        assert_eq!(change.current_name(), Some("Novice"));

        let stored = service.member_state(GUILD, 1).await.unwrap().unwrap();
        assert_eq!(stored.role_name.as_deref(), Some("Novice"));
    }

    #[tokio::test]
    async fn tier_table_edits_move_stored_members() {
        let service = service();
        service.give_xp(GUILD, 1, "ana", 10).await.unwrap();
        service.set_level(GUILD, 2, "bo", 6).await.unwrap();

        let changes = service.add_tier(GUILD, tier(1, "Novice", 0)).await.unwrap();
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .all(|c| c.change.current_name() == Some("Novice")));

        let changes = service.add_tier(GUILD, tier(2, "Adept", 5)).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].member_id, 2);
        assert_eq!(changes[0].change.previous.as_deref(), Some("Novice"));
        assert_eq!(changes[0].change.current_name(), Some("Adept"));

        let (_, changes) = service.remove_tier(GUILD, 2).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change.current_name(), Some("Novice"));
        let bo = service.member_state(GUILD, 2).await.unwrap().unwrap();
        assert_eq!(bo.role_name.as_deref(), Some("Novice"));
    }

    #[tokio::test]
    async fn guild_reset_waits_for_in_flight_member_writes() {
        let service = Arc::new(service());
        service.give_xp(GUILD, 1, "ana", 50).await.unwrap();

        // A message handler that already loaded the member
        let guard = service.lock_member(GUILD, 1).await;
        let loaded = service.store.get_member(GUILD, 1).await.unwrap().unwrap();

        let resetting = Arc::clone(&service);
        let reset = tokio::spawn(async move { resetting.reset_guild_members(GUILD).await });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!reset.is_finished());

        service.store.save_member(GUILD, &loaded).await.unwrap();
        drop(guard);

        assert_eq!(reset.await.unwrap().unwrap(), 1);
        assert!(service.member_state(GUILD, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn member_locks_are_released_after_use() {
        let service = service();
        service.process_message(GUILD, 1, "ana", Utc::now()).await.unwrap();
        service.give_xp(GUILD, 2, "bo", 5).await.unwrap();
        assert!(service.member_locks.is_empty());
    }

    #[tokio::test]
    async fn give_xp_cascades_and_counts_levels() {
        let service = service();

        let change = service.give_xp(GUILD, 1, "ana", 255).await.unwrap();

        assert_eq!(change.levels_gained, 2);
        assert_eq!(change.state.level, 2);
        assert_eq!(change.state.exp, 0);
        assert_eq!(change.state.goal, 220);
        let stored = service.member_state(GUILD, 1).await.unwrap().unwrap();
        assert_eq!(stored, change.state);
    }

    #[tokio::test]
    async fn set_level_rejects_negative_levels() {
        let service = service();
        let result = service.set_level(GUILD, 1, "ana", -3).await;
        assert!(matches!(result, Err(LevelingError::InvalidLevel(-3))));
        assert!(service.member_state(GUILD, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_level_resolves_tier() {
        let service = service();
        service.add_tier(GUILD, tier(1, "Novice", 0)).await.unwrap();
        service.add_tier(GUILD, tier(3, "Master", 10)).await.unwrap();
        service.add_tier(GUILD, tier(2, "Adept", 5)).await.unwrap();

        let change = service.set_level(GUILD, 1, "ana", 7).await.unwrap();
        assert_eq!(change.state.role_name.as_deref(), Some("Adept"));

        let change = service.set_level(GUILD, 1, "ana", 2).await.unwrap();
        assert_eq!(change.state.role_name.as_deref(), Some("Novice"));
        assert_eq!(change.levels_gained, 0);
    }

    #[tokio::test]
    async fn tiers_stay_sorted_and_unique() {
        let service = service();
        service.add_tier(GUILD, tier(2, "Adept", 5)).await.unwrap();
        service.add_tier(GUILD, tier(1, "Novice", 0)).await.unwrap();

        let same_level = service.add_tier(GUILD, tier(3, "Other", 5)).await;
        assert!(matches!(
            same_level,
            Err(LevelingError::DuplicateTier { level: 5, .. })
        ));
        let same_role = service.add_tier(GUILD, tier(1, "Novice", 8)).await;
        assert!(matches!(same_role, Err(LevelingError::DuplicateTier { .. })));

        let levels: Vec<u32> = service
            .tiers(GUILD)
            .await
            .unwrap()
            .iter()
            .map(|t| t.level)
            .collect();
        assert_eq!(levels, vec![0, 5]);

        let (removed, _) = service.remove_tier(GUILD, 2).await.unwrap();
        assert_eq!(removed.role_name, "Adept");
        assert!(matches!(
            service.remove_tier(GUILD, 2).await,
            Err(LevelingError::TierNotFound)
        ));
    }

    #[tokio::test]
    async fn invalid_config_is_not_saved() {
        let service = service();

        let result = service.update_config(GUILD, ConfigUpdate::Cooldown(0)).await;

        assert!(matches!(result, Err(LevelingError::InvalidConfig(_))));
        assert_eq!(service.guild_config(GUILD).await.unwrap().cooldown_secs, 60);
    }

    #[tokio::test]
    async fn leaderboard_orders_by_level_then_xp_and_caps() {
        let service = service();
        service.give_xp(GUILD, 1, "a", 50).await.unwrap(); // lvl 0, 50
        service.give_xp(GUILD, 2, "b", 120).await.unwrap(); // lvl 1, 20
        service.give_xp(GUILD, 3, "c", 90).await.unwrap(); // lvl 0, 90
        service.give_xp(999, 4, "elsewhere", 5000).await.unwrap();
        service
            .update_config(GUILD, ConfigUpdate::LeaderboardMax(2))
            .await
            .unwrap();

        let ids: Vec<u64> = service
            .leaderboard(GUILD)
            .await
            .unwrap()
            .iter()
            .map(|m| m.member_id)
            .collect();

        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn resets_remove_members_but_keep_settings() {
        let service = service();
        service
            .update_config(GUILD, ConfigUpdate::Cooldown(5))
            .await
            .unwrap();
        service.give_xp(GUILD, 1, "a", 10).await.unwrap();
        service.give_xp(GUILD, 2, "b", 10).await.unwrap();

        service.reset_member(GUILD, 1).await.unwrap();
        assert!(matches!(
            service.reset_member(GUILD, 1).await,
            Err(LevelingError::MemberNotFound)
        ));

        assert_eq!(service.reset_guild_members(GUILD).await.unwrap(), 1);
        assert!(service.leaderboard(GUILD).await.unwrap().is_empty());
        assert_eq!(service.guild_config(GUILD).await.unwrap().cooldown_secs, 5);

        service.reset_config(GUILD).await.unwrap();
        assert_eq!(service.guild_config(GUILD).await.unwrap(), GuildConfig::default());
    }

    #[tokio::test]
    async fn ignore_toggles_flip() {
        let service = service();
        assert!(service.toggle_ignored_channel(GUILD, 5).await.unwrap());
        assert!(service.toggle_ignored_role(GUILD, 6).await.unwrap());
        assert!(service.toggle_ignored_member(GUILD, 7).await.unwrap());

        let config = service.guild_config(GUILD).await.unwrap();
        assert_eq!(config.ignored_channels, vec![5]);
        assert_eq!(config.ignored_roles, vec![6]);
        assert_eq!(config.ignored_members, vec![7]);

        assert!(!service.toggle_ignored_channel(GUILD, 5).await.unwrap());
        assert!(service
            .guild_config(GUILD)
            .await
            .unwrap()
            .ignored_channels
            .is_empty());
    }

    #[tokio::test]
    async fn rename_only_touches_known_members() {
        let service = service();
        assert!(!service.rename_member(GUILD, 1, "new").await.unwrap());

        service.give_xp(GUILD, 1, "old", 1).await.unwrap();
        assert!(service.rename_member(GUILD, 1, "new").await.unwrap());
        let state = service.member_state(GUILD, 1).await.unwrap().unwrap();
        assert_eq!(state.username, "new");
    }

    #[tokio::test]
    async fn concurrent_grants_are_not_lost() {
        let service = Arc::new(service());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.give_xp(GUILD, 1, "ana", 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let state = service.member_state(GUILD, 1).await.unwrap().unwrap();
        assert_eq!(state.exp, 50);
    }

    #[tokio::test]
    async fn zero_ids_are_rejected() {
        let service = service();
        assert!(matches!(
            service.give_xp(0, 1, "a", 1).await,
            Err(LevelingError::InvalidId)
        ));
    }
}
