pub mod level_messages;
pub mod leveling_models;
pub mod leveling_service;
pub mod leveling_store;
pub mod progression;

pub use leveling_models::{
    AdminChange, ConfigUpdate, GuildConfig, LevelUpEvent, MemberState, MemberTierChange, MessageMeta,
    RoleTier, TierChange, DEFAULT_TIER_DESCRIPTION, NO_TIER_LABEL,
};
pub use leveling_service::{LevelingError, LevelingService};
pub use leveling_store::LevelingStore;
