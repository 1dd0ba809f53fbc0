// Discord side of the image cooldown: turns a verdict into a deleted
// message and a short-lived notice.

use crate::core::image_cooldown::{AttachmentPost, AttachmentVerdict, ImageCooldownService, ImageCooldownStore};
use crate::discord::Error;
use poise::serenity_prelude as serenity;
use std::time::Duration;

/// How long the "slow down" notice stays in the channel.
const NOTICE_LIFETIME: Duration = Duration::from_secs(10);

/// Check a message's attachments and delete it when it breaks the cooldown.
///
/// Returns `true` if the message was blocked.
pub async fn handle_message_attachments<S: ImageCooldownStore>(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    service: &ImageCooldownService<S>,
) -> Result<bool, Error> {
    if msg.author.bot || msg.attachments.is_empty() {
        return Ok(false);
    }
    let Some(guild_id) = msg.guild_id else {
        return Ok(false);
    };

    let role_ids: Vec<u64> = msg
        .member
        .as_ref()
        .map(|m| m.roles.iter().map(|r| r.get()).collect())
        .unwrap_or_default();

    let post = AttachmentPost {
        member_id: msg.author.id.get(),
        channel_id: msg.channel_id.get(),
        role_ids: &role_ids,
        attachment_count: msg.attachments.len(),
    };

    let verdict = service
        .check_post(guild_id.get(), &post, chrono::Utc::now())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let AttachmentVerdict::Blocked(reason) = verdict else {
        return Ok(false);
    };

    if let Err(e) = msg.delete(&ctx.http).await {
        tracing::warn!("Failed to delete message over the image cooldown: {}", e);
    }

    let notice = format!("<@{}> {}", msg.author.id, reason);
    match msg.channel_id.say(&ctx.http, notice).await {
        Ok(sent) => {
            let http = ctx.http.clone();
            tokio::spawn(async move {
                tokio::time::sleep(NOTICE_LIFETIME).await;
                if let Err(e) = sent.delete(&http).await {
                    tracing::debug!("Failed to clean up image cooldown notice: {}", e);
                }
            });
        }
        Err(e) => tracing::warn!("Failed to send image cooldown notice: {}", e),
    }

    Ok(true)
}
