// Discord commands module.
// Each feature gets its own command file.

pub mod leveling;

pub mod lvladmin;

pub mod image_cooldown;

pub mod server_stats;
