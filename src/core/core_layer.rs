// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "leveling/mod.rs"]
pub mod leveling;

#[path = "image_cooldown/mod.rs"]
pub mod image_cooldown;

#[path = "server_stats/mod.rs"]
pub mod server_stats;
