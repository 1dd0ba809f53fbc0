// Image cooldown service - decides whether an attachment post may stay.
//
// NO Discord dependencies here. The event handler passes in an
// AttachmentPost and deletes the message when the verdict says so.

use super::image_cooldown_models::{evaluate, AttachmentPost, AttachmentVerdict, ImageCooldownConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ImageCooldownError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid setting: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait ImageCooldownStore: Send + Sync {
    async fn get_config(&self, guild_id: u64)
        -> Result<Option<ImageCooldownConfig>, ImageCooldownError>;

    async fn save_config(
        &self,
        guild_id: u64,
        config: &ImageCooldownConfig,
    ) -> Result<(), ImageCooldownError>;

    /// When the member last posted an allowed attachment.
    async fn get_last_post(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<Option<DateTime<Utc>>, ImageCooldownError>;

    async fn set_last_post(
        &self,
        guild_id: u64,
        member_id: u64,
        at: DateTime<Utc>,
    ) -> Result<(), ImageCooldownError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ImageCooldownService<S: ImageCooldownStore> {
    store: S,
    member_locks: DashMap<(u64, u64), Arc<Mutex<()>>>,
    guild_locks: DashMap<u64, Arc<Mutex<()>>>,
}

impl<S: ImageCooldownStore> ImageCooldownService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            member_locks: DashMap::new(),
            guild_locks: DashMap::new(),
        }
    }

    pub async fn config(&self, guild_id: u64) -> Result<ImageCooldownConfig, ImageCooldownError> {
        Ok(self.store.get_config(guild_id).await?.unwrap_or_default())
    }

    /// Check an attachment post and start the member's cooldown if it's allowed.
    pub async fn check_post(
        &self,
        guild_id: u64,
        post: &AttachmentPost<'_>,
        now: DateTime<Utc>,
    ) -> Result<AttachmentVerdict, ImageCooldownError> {
        let config = self.config(guild_id).await?;

        let lock = self
            .member_locks
            .entry((guild_id, post.member_id))
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let last = self.store.get_last_post(guild_id, post.member_id).await?;
        let verdict = evaluate(&config, post, last, now);

        if verdict == AttachmentVerdict::Allowed {
            self.store.set_last_post(guild_id, post.member_id, now).await?;
        }

        Ok(verdict)
    }

    async fn modify_config<F>(
        &self,
        guild_id: u64,
        change: F,
    ) -> Result<ImageCooldownConfig, ImageCooldownError>
    where
        F: FnOnce(&mut ImageCooldownConfig),
    {
        let lock = self.guild_locks.entry(guild_id).or_default().clone();
        let _guard = lock.lock().await;

        let mut config = self.config(guild_id).await?;
        change(&mut config);
        self.store.save_config(guild_id, &config).await?;
        Ok(config)
    }

    /// Flip the active flag. Returns the new value.
    pub async fn toggle_active(&self, guild_id: u64) -> Result<bool, ImageCooldownError> {
        let config = self
            .modify_config(guild_id, |c| c.active = !c.active)
            .await?;
        Ok(config.active)
    }

    pub async fn set_cooldown(&self, guild_id: u64, seconds: u64) -> Result<(), ImageCooldownError> {
        if seconds == 0 {
            return Err(ImageCooldownError::InvalidConfig(
                "cooldown must be at least one second".into(),
            ));
        }
        self.modify_config(guild_id, |c| c.cooldown_secs = seconds)
            .await?;
        Ok(())
    }

    pub async fn set_attachment_limit(
        &self,
        guild_id: u64,
        limit: usize,
    ) -> Result<(), ImageCooldownError> {
        if limit == 0 {
            return Err(ImageCooldownError::InvalidConfig(
                "attachment limit must be at least 1".into(),
            ));
        }
        self.modify_config(guild_id, |c| c.attachment_limit = limit)
            .await?;
        Ok(())
    }

    /// Returns true if the channel is watched after the call.
    pub async fn toggle_watched_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
    ) -> Result<bool, ImageCooldownError> {
        let config = self
            .modify_config(guild_id, |c| toggle(&mut c.watched_channels, channel_id))
            .await?;
        Ok(config.watched_channels.contains(&channel_id))
    }

    /// Returns true if the member is exempt after the call.
    pub async fn toggle_exempt_member(
        &self,
        guild_id: u64,
        member_id: u64,
    ) -> Result<bool, ImageCooldownError> {
        let config = self
            .modify_config(guild_id, |c| toggle(&mut c.exempt_members, member_id))
            .await?;
        Ok(config.exempt_members.contains(&member_id))
    }

    /// Returns true if the role is exempt after the call.
    pub async fn toggle_exempt_role(
        &self,
        guild_id: u64,
        role_id: u64,
    ) -> Result<bool, ImageCooldownError> {
        let config = self
            .modify_config(guild_id, |c| toggle(&mut c.exempt_roles, role_id))
            .await?;
        Ok(config.exempt_roles.contains(&role_id))
    }
}

fn toggle(ids: &mut Vec<u64>, id: u64) {
    if let Some(pos) = ids.iter().position(|x| *x == id) {
        ids.remove(pos);
    } else {
        ids.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image_cooldown::BlockReason;
    use crate::infra::image_cooldown::JsonImageCooldownStore;
    use chrono::Duration;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> ImageCooldownService<JsonImageCooldownStore> {
        let store = JsonImageCooldownStore::new(dir.path().join("image_cooldown.json"));
        ImageCooldownService::new(store)
    }

    fn post(count: usize) -> AttachmentPost<'static> {
        AttachmentPost {
            member_id: 1,
            channel_id: 5,
            role_ids: &[],
            attachment_count: count,
        }
    }

    #[tokio::test]
    async fn second_post_inside_cooldown_is_blocked() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        assert!(service.toggle_watched_channel(1, 5).await.unwrap());

        let now = Utc::now();
        assert_eq!(
            service.check_post(1, &post(1), now).await.unwrap(),
            AttachmentVerdict::Allowed
        );
        assert!(service
            .check_post(1, &post(1), now + Duration::seconds(5))
            .await
            .unwrap()
            .is_blocked());
        assert_eq!(
            service
                .check_post(1, &post(1), now + Duration::seconds(31))
                .await
                .unwrap(),
            AttachmentVerdict::Allowed
        );
    }

    #[tokio::test]
    async fn blocked_posts_do_not_restart_the_cooldown() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.toggle_watched_channel(1, 5).await.unwrap();
        service.set_attachment_limit(1, 2).await.unwrap();

        let now = Utc::now();
        assert_eq!(
            service.check_post(1, &post(3), now).await.unwrap(),
            AttachmentVerdict::Blocked(BlockReason::TooManyAttachments { count: 3, limit: 2 })
        );
        assert_eq!(
            service.check_post(1, &post(2), now).await.unwrap(),
            AttachmentVerdict::Allowed
        );
    }

    #[tokio::test]
    async fn settings_are_validated_and_persisted() {
        let dir = TempDir::new().unwrap();
        {
            let service = service(&dir);
            assert!(service.set_cooldown(1, 0).await.is_err());
            assert!(service.set_attachment_limit(1, 0).await.is_err());
            service.set_cooldown(1, 90).await.unwrap();
            assert!(!service.toggle_active(1).await.unwrap());
            assert!(service.toggle_exempt_role(1, 7).await.unwrap());
            assert!(service.toggle_exempt_member(1, 8).await.unwrap());
            assert!(!service.toggle_exempt_member(1, 8).await.unwrap());
        }

        let reloaded = service(&dir).config(1).await.unwrap();
        assert_eq!(reloaded.cooldown_secs, 90);
        assert!(!reloaded.active);
        assert_eq!(reloaded.exempt_roles, vec![7]);
        assert!(reloaded.exempt_members.is_empty());
    }
}
