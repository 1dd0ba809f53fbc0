pub mod image_cooldown_models;
pub mod image_cooldown_service;

pub use image_cooldown_models::{AttachmentPost, AttachmentVerdict, BlockReason, ImageCooldownConfig};
pub use image_cooldown_service::{ImageCooldownError, ImageCooldownService, ImageCooldownStore};
