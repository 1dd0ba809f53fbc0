// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "leveling/leveling_announcements.rs"]
pub mod leveling_announcements;

#[path = "image_cooldown/attachment_handler.rs"]
pub mod image_cooldown;

// Re-export command types for convenience
pub use commands::leveling::{Context, Data, Error};
