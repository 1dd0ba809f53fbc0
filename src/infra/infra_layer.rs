// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "leveling/leveling_store.rs"]
pub mod leveling;

#[path = "image_cooldown/mod.rs"]
pub mod image_cooldown;

#[path = "server_stats/mod.rs"]
pub mod server_stats;
