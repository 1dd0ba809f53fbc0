// Image cooldown domain models.
//
// Limits how often a member may post attachments in watched channels, and
// how many attachments fit in one message. Pure data and one pure function;
// the Discord layer decides how to delete and notify.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-guild image cooldown settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCooldownConfig {
    pub active: bool,
    pub cooldown_secs: u64,
    /// Most attachments allowed in a single message.
    pub attachment_limit: usize,
    /// The cooldown only applies in these channels.
    pub watched_channels: Vec<u64>,
    pub exempt_roles: Vec<u64>,
    pub exempt_members: Vec<u64>,
}

impl Default for ImageCooldownConfig {
    fn default() -> Self {
        Self {
            active: true,
            cooldown_secs: 30,
            attachment_limit: 5,
            watched_channels: Vec::new(),
            exempt_roles: Vec::new(),
            exempt_members: Vec::new(),
        }
    }
}

/// A message with attachments, reduced to what the check needs.
#[derive(Debug, Clone)]
pub struct AttachmentPost<'a> {
    pub member_id: u64,
    pub channel_id: u64,
    pub role_ids: &'a [u64],
    pub attachment_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    TooSoon { remaining: Duration },
    TooManyAttachments { count: usize, limit: usize },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::TooSoon { remaining } => {
                write!(f, "slow down, you can post images again in {}s", remaining.as_secs().max(1))
            }
            BlockReason::TooManyAttachments { count, limit } => {
                write!(f, "{count} attachments in one message (limit is {limit})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentVerdict {
    /// Not subject to the cooldown (inactive, unwatched channel, exempt,
    /// or no attachments).
    Ignored,
    /// Allowed; the member's cooldown starts now.
    Allowed,
    Blocked(BlockReason),
}

impl AttachmentVerdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, AttachmentVerdict::Blocked(_))
    }
}

/// Decide what to do with an attachment post.
///
/// `last_post` is the member's last allowed attachment post in this guild.
pub fn evaluate(
    config: &ImageCooldownConfig,
    post: &AttachmentPost<'_>,
    last_post: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> AttachmentVerdict {
    if !config.active
        || post.attachment_count == 0
        || !config.watched_channels.contains(&post.channel_id)
        || config.exempt_members.contains(&post.member_id)
        || post.role_ids.iter().any(|r| config.exempt_roles.contains(r))
    {
        return AttachmentVerdict::Ignored;
    }

    if let Some(last) = last_post {
        let window = Duration::from_secs(config.cooldown_secs);
        let elapsed = (now - last).to_std().unwrap_or_default();
        if elapsed <= window {
            return AttachmentVerdict::Blocked(BlockReason::TooSoon {
                remaining: window - elapsed,
            });
        }
    }

    if post.attachment_count > config.attachment_limit {
        return AttachmentVerdict::Blocked(BlockReason::TooManyAttachments {
            count: post.attachment_count,
            limit: config.attachment_limit,
        });
    }

    AttachmentVerdict::Allowed
}
