pub mod server_stats_models;
pub mod server_stats_service;
pub mod server_stats_store;

pub use server_stats_models::{ActivityStats, GuildStats, StatsPeriod, StatsScope, StatsSettings};
pub use server_stats_service::{ServerStatsError, ServerStatsService, StatsReading};
pub use server_stats_store::{ServerStatsStore, StoreError};
