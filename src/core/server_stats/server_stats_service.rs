use super::server_stats_models::{
    GuildStats, StatsPeriod, StatsScope, StatsSettings, DAY_BUCKETS, MONTH_BUCKETS,
};
use super::server_stats_store::{ServerStatsStore, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum ServerStatsError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Answer to a statistics query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsReading {
    Day { date: NaiveDate, count: u64 },
    /// `month` is the first day of the month.
    Month { month: NaiveDate, count: u64 },
    Total(u64),
    NoData,
    /// Past what the day/month rings keep.
    TooOld,
}

pub struct ServerStatsService<S: ServerStatsStore> {
    store: S,
    guild_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl<S: ServerStatsStore> ServerStatsService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            guild_locks: DashMap::new(),
        }
    }

    fn guild_lock(&self, guild_id: u64) -> Arc<Mutex<()>> {
        self.guild_locks.entry(guild_id).or_default().clone()
    }

    async fn load(&self, guild_id: u64) -> Result<GuildStats, ServerStatsError> {
        Ok(self.store.get_guild(guild_id).await?.unwrap_or_default())
    }

    /// Count a message. Returns false when stats are off for the guild or
    /// the channel is ignored.
    pub async fn record_message(
        &self,
        guild_id: u64,
        channel_id: u64,
        member_id: u64,
        now: DateTime<Utc>,
    ) -> Result<bool, ServerStatsError> {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let mut stats = self.load(guild_id).await?;
        if !stats.settings.enabled || stats.settings.ignored_channels.contains(&channel_id) {
            return Ok(false);
        }

        stats.record_message(channel_id, member_id, now.date_naive());
        self.store.save_guild(guild_id, stats).await?;
        Ok(true)
    }

    pub async fn query(
        &self,
        guild_id: u64,
        scope: StatsScope,
        period: StatsPeriod,
        today: NaiveDate,
    ) -> Result<StatsReading, ServerStatsError> {
        match period {
            StatsPeriod::Day { days_ago } if days_ago as usize >= DAY_BUCKETS => {
                return Ok(StatsReading::TooOld)
            }
            StatsPeriod::Month { months_ago } if months_ago as usize >= MONTH_BUCKETS => {
                return Ok(StatsReading::TooOld)
            }
            _ => {}
        }

        let stats = self.load(guild_id).await?;
        let Some(activity) = stats.scope(scope) else {
            return Ok(StatsReading::NoData);
        };

        let reading = match period {
            StatsPeriod::Day { days_ago } => activity
                .day(today, days_ago)
                .map(|(date, count)| StatsReading::Day { date, count }),
            StatsPeriod::Month { months_ago } => activity
                .month(today, months_ago)
                .map(|(month, count)| StatsReading::Month { month, count }),
            StatsPeriod::Total => Some(StatsReading::Total(activity.total())),
        };

        Ok(reading.unwrap_or(StatsReading::NoData))
    }

    /// Fold every finished day up to yesterday into months and totals, for
    /// every guild. Days already registered are skipped, so this is safe to
    /// call at startup, at midnight, and on demand. Returns how many guilds
    /// had at least one day registered.
    ///
    /// Registration resumes right after the last registered day however long
    /// ago that was; recycled day buckets simply contribute nothing.
    pub async fn register_finished_days(&self, today: NaiveDate) -> Result<usize, ServerStatsError> {
        let Some(yesterday) = today.pred_opt() else {
            return Ok(0);
        };

        let mut registered = 0;
        for guild_id in self.store.guild_ids().await? {
            let lock = self.guild_lock(guild_id);
            let _guard = lock.lock().await;

            let mut stats = self.load(guild_id).await?;
            let first = match stats.registered_through() {
                Some(last) => last.succ_opt(),
                None => stats.oldest_recorded_day(),
            };
            let Some(first) = first.filter(|day| *day <= yesterday) else {
                continue;
            };

            let mut day = first;
            while day <= yesterday {
                stats.register_day(day);
                day = match day.succ_opt() {
                    Some(next) => next,
                    None => break,
                };
            }

            tracing::debug!(guild_id, from = %first, to = %yesterday, "Registered message stats");
            self.store.save_guild(guild_id, stats).await?;
            registered += 1;
        }

        self.store.flush().await?;
        Ok(registered)
    }

    pub async fn settings(&self, guild_id: u64) -> Result<StatsSettings, ServerStatsError> {
        Ok(self.load(guild_id).await?.settings)
    }

    async fn modify_settings<F>(
        &self,
        guild_id: u64,
        change: F,
    ) -> Result<StatsSettings, ServerStatsError>
    where
        F: FnOnce(&mut StatsSettings),
    {
        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let mut stats = self.load(guild_id).await?;
        change(&mut stats.settings);
        let settings = stats.settings.clone();
        self.store.save_guild(guild_id, stats).await?;
        self.store.flush().await?;
        Ok(settings)
    }

    /// Flip message counting on or off. Returns the new value.
    pub async fn toggle_enabled(&self, guild_id: u64) -> Result<bool, ServerStatsError> {
        let settings = self
            .modify_settings(guild_id, |s| s.enabled = !s.enabled)
            .await?;
        Ok(settings.enabled)
    }

    /// Returns true if the channel is ignored after the call.
    pub async fn toggle_ignored_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<bool, ServerStatsError> {
        let settings = self
            .modify_settings(guild_id, |s| {
                if let Some(pos) = s.ignored_channels.iter().position(|c| *c == channel_id) {
                    s.ignored_channels.remove(pos);
                } else {
                    s.ignored_channels.push(channel_id);
                }
            })
            .await?;
        Ok(settings.ignored_channels.contains(&channel_id))
    }

    pub async fn flush(&self) -> Result<(), ServerStatsError> {
        Ok(self.store.flush().await?)
    }
}
