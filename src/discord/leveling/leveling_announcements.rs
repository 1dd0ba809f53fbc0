use crate::core::leveling::level_messages::{level_up_announcement, TemplateVars};
use crate::core::leveling::{GuildConfig, LevelUpEvent, RoleTier, TierChange};
use poise::serenity_prelude::{self as serenity, builder::CreateMessage};
use rand::seq::SliceRandom;

/// Post the guild's level-up message in the channel the member leveled up in.
///
/// Does nothing when announcements are off or both templates are empty.
pub async fn send_level_up_embed(
    ctx: &serenity::Context,
    message: &serenity::Message,
    config: &GuildConfig,
    level_up: &LevelUpEvent,
) -> Result<(), serenity::Error> {
    let mention = format!("<@{}>", level_up.member_id);
    let vars = TemplateVars::for_event(level_up, &mention);
    let Some(text) = level_up_announcement(config, &vars) else {
        return Ok(());
    };

    let progress = level_up.exp as f64 / level_up.goal.max(1) as f64;
    let embed = serenity::CreateEmbed::new()
        .title("Level Up!")
        .description(text)
        .color(level_color(level_up.new_level))
        .field(
            "Progress",
            format!(
                "{}/{} XP\n{}",
                level_up.exp,
                level_up.goal,
                build_progress_bar(progress, 18)
            ),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(random_flavor_line()));

    message
        .channel_id
        .send_message(ctx, CreateMessage::new().embed(embed))
        .await
        .map(|_| ())
}

/// Swap the member's tier role on Discord.
///
/// Every configured tier role the member holds, other than the new one, is
/// removed. Failures are logged; the stored role name is already updated
/// and stays that way.
pub async fn apply_tier_change(
    http: &serenity::Http,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
    held_roles: &[serenity::RoleId],
    tiers: &[RoleTier],
    change: &TierChange,
) {
    let new_role = change
        .current
        .as_ref()
        .map(|tier| serenity::RoleId::new(tier.role_id));

    for tier in tiers {
        let role_id = serenity::RoleId::new(tier.role_id);
        if Some(role_id) == new_role || !held_roles.contains(&role_id) {
            continue;
        }
        if let Err(e) = http
            .remove_member_role(guild_id, user_id, role_id, Some("Level tier changed"))
            .await
        {
            tracing::warn!(
                "Failed to remove tier role {} from {}: {}",
                tier.role_name,
                user_id,
                e
            );
        }
    }

    if let Some(role_id) = new_role.filter(|id| !held_roles.contains(id)) {
        if let Err(e) = http
            .add_member_role(guild_id, user_id, role_id, Some("Reached level tier"))
            .await
        {
            tracing::warn!(
                "Failed to add tier role {:?} to {}: {}",
                change.current_name(),
                user_id,
                e
            );
        }
    }
}

pub fn level_color(level: u32) -> serenity::Colour {
    if level >= 50 {
        serenity::Colour::DARK_PURPLE
    } else if level >= 25 {
        serenity::Colour::ORANGE
    } else if level >= 10 {
        serenity::Colour::GOLD
    } else if level >= 5 {
        serenity::Colour::BLURPLE
    } else {
        serenity::Colour::LIGHT_GREY
    }
}

pub fn build_progress_bar(progress: f64, length: usize) -> String {
    let clamped = progress.clamp(0.0, 1.0);
    let mut filled = (clamped * length as f64).round() as usize;
    if clamped > 0.0 && filled == 0 {
        filled = 1;
    }
    filled = filled.min(length);
    let bar = "▰".repeat(filled) + &"▱".repeat(length - filled);
    format!("{} ({}%)", bar, (clamped * 100.0).round() as u32)
}

fn random_flavor_line() -> &'static str {
    const FLAVOR_LINES: [&str; 4] = [
        "Keep the conversation going!",
        "Every message counts.",
        "Another level, another badge of chattiness.",
        "That XP bar never stood a chance.",
    ];

    FLAVOR_LINES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FLAVOR_LINES[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_shows_some_fill_for_any_progress() {
        assert_eq!(build_progress_bar(0.0, 4), "▱▱▱▱ (0%)");
        assert_eq!(build_progress_bar(0.01, 4), "▰▱▱▱ (1%)");
        assert_eq!(build_progress_bar(2.0, 4), "▰▰▰▰ (100%)");
    }
}
