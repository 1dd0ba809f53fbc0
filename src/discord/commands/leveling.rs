// Discord commands for the leveling system.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call core service
// 3. Format the response based on the result
//
// This layer is THIN - no business logic, just translation.

use crate::core::image_cooldown::ImageCooldownService;
use crate::core::leveling::{LevelingService, MemberState};
use crate::core::server_stats::ServerStatsService;
use crate::discord::leveling_announcements::{build_progress_bar, level_color};
use crate::infra::image_cooldown::JsonImageCooldownStore;
use crate::infra::leveling::SqliteLevelingStore;
use crate::infra::server_stats::JsonServerStatsStore;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Show your current level and tier role.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn lvl(
    ctx: Context<'_>,
    #[description = "Member to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let target_user = user.as_ref().unwrap_or_else(|| ctx.author());
    let Some(state) = fetch_state(ctx, target_user).await? else {
        return Ok(());
    };

    let progress = state.exp as f64 / state.goal.max(1) as f64;
    let embed = serenity::CreateEmbed::new()
        .title(format!("Level of {}", target_user.name))
        .color(level_color(state.level))
        .thumbnail(target_user.face())
        .field("Level", format!("**{}**", state.level), true)
        .field("Role", state.role_label(), true)
        .field(
            "Progress",
            format!(
                "{}/{} XP\n{}",
                state.exp,
                state.goal,
                build_progress_bar(progress, 15)
            ),
            false,
        )
        .field("Messages", state.message_count.to_string(), true)
        .field("Messages that gave XP", state.xp_message_count.to_string(), true);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show your XP inside the current level and what's left until the next one.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn xp(
    ctx: Context<'_>,
    #[description = "Member to check (defaults to you)"] user: Option<serenity::User>,
) -> Result<(), Error> {
    let target_user = user.as_ref().unwrap_or_else(|| ctx.author());
    let Some(state) = fetch_state(ctx, target_user).await? else {
        return Ok(());
    };

    ctx.say(format!(
        "Current experience of {}: {}. Next goal: {}. Needed: {}",
        target_user.name,
        state.exp,
        state.goal,
        state.xp_needed()
    ))
    .await?;
    Ok(())
}

/// Load a member's progress, replying for bots and members without any.
async fn fetch_state(
    ctx: Context<'_>,
    user: &serenity::User,
) -> Result<Option<MemberState>, Error> {
    if user.bot {
        ctx.say("Bots don't earn XP! 🤖").await?;
        return Ok(None);
    }

    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let state = ctx
        .data()
        .leveling
        .member_state(guild_id, user.id.get())
        .await?;
    if state.is_none() {
        ctx.say(format!("{} hasn't earned any XP yet.", user.name))
            .await?;
    }
    Ok(state)
}

/// Show the server's XP leaderboard.
#[poise::command(slash_command, prefix_command, guild_only)]
pub async fn leaderboard(
    ctx: Context<'_>,
    #[description = "Page number (default: 1)"]
    #[min = 1]
    page: Option<usize>,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let profiles = ctx.data().leveling.leaderboard(guild_id).await?;
    if profiles.is_empty() {
        ctx.say("No one has earned XP yet! Start chatting to get on the leaderboard! 💬")
            .await?;
        return Ok(());
    }

    let total_pages = profiles.len().div_ceil(PER_PAGE);
    let mut current_page = page.unwrap_or(1).clamp(1, total_pages);

    let msg = ctx
        .send(render_page(&ctx, guild_id, &profiles, current_page, total_pages))
        .await?;
    let msg_id = msg.message().await?.id;

    while let Some(mci) = serenity::ComponentInteractionCollector::new(ctx)
        .author_id(ctx.author().id)
        .channel_id(ctx.channel_id())
        .timeout(std::time::Duration::from_secs(60 * 2))
        .filter(move |mci| mci.message.id == msg_id)
        .await
    {
        match mci.data.custom_id.as_str() {
            "prev" => current_page = current_page.saturating_sub(1).max(1),
            "next" => current_page = (current_page + 1).min(total_pages),
            "find_me" => {
                let user_id = ctx.author().id.get();
                if let Some(idx) = profiles.iter().position(|p| p.member_id == user_id) {
                    current_page = idx / PER_PAGE + 1;
                } else {
                    if let Err(e) = mci
                        .create_response(
                            &ctx,
                            serenity::CreateInteractionResponse::Message(
                                serenity::CreateInteractionResponseMessage::new()
                                    .content("You are not on the leaderboard yet!")
                                    .ephemeral(true),
                            ),
                        )
                        .await
                    {
                        tracing::warn!("Error sending ephemeral response: {:?}", e);
                    }
                    continue;
                }
            }
            _ => {}
        }

        // Defer the update to prevent "Unknown interaction" errors if rendering takes > 3s
        if let Err(e) = mci.defer(&ctx.http()).await {
            tracing::warn!("Error deferring interaction: {:?}", e);
            continue;
        }

        if let Err(e) = msg
            .edit(
                ctx,
                render_page(&ctx, guild_id, &profiles, current_page, total_pages),
            )
            .await
        {
            tracing::warn!("Error updating leaderboard: {:?}", e);
        }
    }

    // Remove the buttons once nobody can press them anymore
    let _ = msg
        .edit(ctx, poise::CreateReply::default().components(vec![]))
        .await;

    Ok(())
}

const PER_PAGE: usize = 5;

fn render_page(
    ctx: &Context<'_>,
    guild_id: u64,
    profiles: &[MemberState],
    current_page: usize,
    total_pages: usize,
) -> poise::CreateReply {
    let user_id = ctx.author().id.get();
    let offset = (current_page - 1) * PER_PAGE;
    let mut description = String::new();

    match profiles.iter().position(|p| p.member_id == user_id) {
        Some(idx) => description.push_str(&format!("Your rank: **#{}**\n\n", idx + 1)),
        None => description.push_str("You are not ranked yet.\n\n"),
    }

    for (index, state) in profiles.iter().skip(offset).take(PER_PAGE).enumerate() {
        let rank = offset + index + 1;
        let medal = match rank {
            1 => "🥇",
            2 => "🥈",
            3 => "🥉",
            _ => "  ",
        };

        let user_name = resolve_display_name_cached(ctx, guild_id, state);
        let name_display = if state.member_id == user_id {
            format!("**{}** (You)", user_name)
        } else {
            user_name
        };

        let bar = build_progress_bar(state.exp as f64 / state.goal.max(1) as f64, 10);
        description.push_str(&format!(
            "{} **#{}** {}\nLevel {} | {}/{} XP | {}\n{}\n\n",
            medal,
            rank,
            name_display,
            state.level,
            state.exp,
            state.goal,
            state.role_label(),
            bar
        ));
    }

    let embed = serenity::CreateEmbed::new()
        .title("📊 Leaderboard")
        .description(description)
        .color(0xffd700)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Page {}/{}",
            current_page, total_pages
        )));

    let components = vec![serenity::CreateActionRow::Buttons(vec![
        serenity::CreateButton::new("prev")
            .label("◀ Previous")
            .style(serenity::ButtonStyle::Primary)
            .disabled(current_page == 1),
        serenity::CreateButton::new("next")
            .label("Next ▶")
            .style(serenity::ButtonStyle::Primary)
            .disabled(current_page == total_pages),
        serenity::CreateButton::new("find_me")
            .label("🔍 Find Me")
            .style(serenity::ButtonStyle::Secondary),
    ])];

    poise::CreateReply::default()
        .embed(embed)
        .components(components)
}

/// Resolve a display name from the cache, falling back to the name stored
/// with the member's progress. Never makes HTTP calls.
pub fn resolve_display_name_cached(ctx: &Context<'_>, guild_id: u64, state: &MemberState) -> String {
    let guild_id_s = serenity::GuildId::from(guild_id);
    let user_id_s = serenity::UserId::from(state.member_id);

    if let Some(guild) = ctx.serenity_context().cache.guild(guild_id_s) {
        if let Some(member) = guild.members.get(&user_id_s) {
            // display_name() prefers nick over username
            return member.display_name().to_string();
        }
    }

    if !state.username.is_empty() {
        return state.username.clone();
    }

    format!("<@{}>", state.member_id)
}

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands.
/// This is where we store our services and configuration.
pub struct Data {
    pub leveling: Arc<LevelingService<SqliteLevelingStore>>,
    pub image_cooldown: Arc<ImageCooldownService<JsonImageCooldownStore>>,
    pub server_stats: Arc<ServerStatsService<JsonServerStatsStore>>,
    /// Messages starting with this are commands and never earn XP.
    pub command_prefix: String,
}
