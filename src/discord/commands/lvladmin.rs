// Leveling administration: tier roles, guild-wide resets and ignores,
// per-member overrides, and guild settings.

use crate::core::leveling::{
    AdminChange, ConfigUpdate, GuildConfig, LevelingError, MemberTierChange, RoleTier,
    DEFAULT_TIER_DESCRIPTION,
};
use crate::discord::leveling_announcements::apply_tier_change;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Leveling administration.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    aliases("la"),
    required_permissions = "ADMINISTRATOR",
    subcommands("roles", "guild", "member", "config"),
    subcommand_required
)]
pub async fn lvladmin(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn guild_id(ctx: &Context<'_>) -> Result<u64, Error> {
    Ok(ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get())
}

// ============================================================================
// ROLE TIERS
// ============================================================================

/// Roles granted automatically at a level.
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("roles_list", "roles_add", "roles_remove"),
    subcommand_required
)]
pub async fn roles(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show all configured level roles.
#[poise::command(slash_command, prefix_command, rename = "list")]
pub async fn roles_list(ctx: Context<'_>) -> Result<(), Error> {
    let tiers = ctx.data().leveling.tiers(guild_id(&ctx)?).await?;

    let mut embed = serenity::CreateEmbed::new()
        .title("Configured Roles:")
        .footer(serenity::CreateEmbedFooter::new(format!(
            "use {}lvladmin roles add <role> <level> [description] to add more",
            ctx.data().command_prefix
        )));

    if tiers.is_empty() {
        embed = embed.description("No level roles have been defined in this server yet.");
    }
    for tier in &tiers {
        embed = embed.field(
            format!("Level {} - {}", tier.level, tier.role_name),
            &tier.description,
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Grant a role automatically once members reach a level.
#[poise::command(slash_command, prefix_command, rename = "add")]
pub async fn roles_add(
    ctx: Context<'_>,
    #[description = "Role to grant"] role: serenity::Role,
    #[description = "Level at which the role is earned"] level: u32,
    #[description = "Shown in the role list"]
    #[rest]
    description: Option<String>,
) -> Result<(), Error> {
    let tier = RoleTier {
        role_id: role.id.get(),
        role_name: role.name.clone(),
        level,
        description: description.unwrap_or_else(|| DEFAULT_TIER_DESCRIPTION.to_string()),
    };

    let guild = guild_id(&ctx)?;
    match ctx.data().leveling.add_tier(guild, tier).await {
        Ok(moved) => {
            ctx.say(format!(
                "{} will be automatically earned at level {}",
                role.name, level
            ))
            .await?;
            let tiers = ctx.data().leveling.tiers(guild).await?;
            apply_moved_tiers(ctx, &tiers, &moved).await?;
        }
        Err(e @ LevelingError::DuplicateTier { .. }) => {
            ctx.say(e.to_string()).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Stop granting a role automatically.
#[poise::command(slash_command, prefix_command, rename = "remove", aliases("rm"))]
pub async fn roles_remove(
    ctx: Context<'_>,
    #[description = "Role to remove from the level roles"] role: serenity::Role,
) -> Result<(), Error> {
    let guild = guild_id(&ctx)?;
    match ctx.data().leveling.remove_tier(guild, role.id.get()).await {
        Ok((removed, moved)) => {
            ctx.say(format!("The role {} has been removed", removed.role_name))
                .await?;
            // Keep the removed role in the list so it gets taken away too
            let mut tiers = ctx.data().leveling.tiers(guild).await?;
            tiers.push(removed);
            apply_moved_tiers(ctx, &tiers, &moved).await?;
        }
        Err(LevelingError::TierNotFound) => {
            ctx.say("Role not found in the level roles").await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Swap Discord roles for stored members a tier table edit moved.
async fn apply_moved_tiers(
    ctx: Context<'_>,
    tiers: &[RoleTier],
    moved: &[MemberTierChange],
) -> Result<(), Error> {
    let guild = ctx.guild_id().ok_or("This command only works in servers")?;
    for entry in moved {
        let user_id = serenity::UserId::new(entry.member_id);
        match guild.member(ctx.serenity_context(), user_id).await {
            Ok(member) => {
                apply_tier_change(ctx.http(), guild, user_id, &member.roles, tiers, &entry.change)
                    .await
            }
            // Left the server, most likely
            Err(e) => tracing::warn!("Couldn't fetch member {} to sync tier roles: {}", user_id, e),
        }
    }
    Ok(())
}

// ============================================================================
// GUILD
// ============================================================================

/// Server-wide leveling options.
#[poise::command(
    slash_command,
    prefix_command,
    subcommands(
        "guild_reset",
        "guild_levelboard",
        "guild_channelignore",
        "guild_roleignore",
        "guild_memberignore"
    ),
    subcommand_required
)]
pub async fn guild(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Delete ALL member progress in this server. Does not ask for confirmation.
#[poise::command(slash_command, prefix_command, rename = "reset")]
pub async fn guild_reset(ctx: Context<'_>) -> Result<(), Error> {
    let removed = ctx
        .data()
        .leveling
        .reset_guild_members(guild_id(&ctx)?)
        .await?;
    ctx.say(format!(
        "The server's leveling data has been wiped ({} members).",
        removed
    ))
    .await?;
    Ok(())
}

/// Leaderboard with message counts, for tuning cooldown and XP settings.
///
/// Shows `xp messages / messages`: how many of a member's messages were sent
/// off cooldown and earned XP.
#[poise::command(
    slash_command,
    prefix_command,
    rename = "levelboard",
    aliases("lb", "lvlboard")
)]
pub async fn guild_levelboard(ctx: Context<'_>) -> Result<(), Error> {
    let members = ctx.data().leveling.leaderboard(guild_id(&ctx)?).await?;
    if members.is_empty() {
        ctx.say("No member activity registered.").await?;
        return Ok(());
    }

    let member_list = members
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "#{} <@{}> - Level: {} - Messages: {}/{}",
                i + 1,
                m.member_id,
                m.level,
                m.xp_message_count,
                m.message_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    // Embed descriptions cap out at 4096 characters
    if member_list.len() > 4096 {
        ctx.say(format!(
            "The list is too long. Please set a lower limit with `{}lvladmin config set leaderboard_max <n>`",
            ctx.data().command_prefix
        ))
        .await?;
        return Ok(());
    }

    let guild_name = ctx
        .guild()
        .map(|g| g.name.clone())
        .unwrap_or_else(|| "Server".to_string());
    let embed = serenity::CreateEmbed::new()
        .title(format!("{} Leaderboard", guild_name))
        .description(member_list)
        .color(0xffd700);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Toggle whether messages in a channel earn XP.
#[poise::command(
    slash_command,
    prefix_command,
    rename = "channelignore",
    aliases("chignore", "ci")
)]
pub async fn guild_channelignore(
    ctx: Context<'_>,
    #[description = "Channel to toggle (defaults to this one)"] channel: Option<
        serenity::GuildChannel,
    >,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    let ignored = ctx
        .data()
        .leveling
        .toggle_ignored_channel(guild_id(&ctx)?, channel_id.get())
        .await?;

    let reply = if ignored {
        format!("Channel <#{}> will now be ignored.", channel_id)
    } else {
        format!("Channel <#{}> is no longer being ignored.", channel_id)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Toggle whether members with a role earn XP.
#[poise::command(slash_command, prefix_command, rename = "roleignore")]
pub async fn guild_roleignore(
    ctx: Context<'_>,
    #[description = "Role to toggle"] role: serenity::Role,
) -> Result<(), Error> {
    let ignored = ctx
        .data()
        .leveling
        .toggle_ignored_role(guild_id(&ctx)?, role.id.get())
        .await?;

    let reply = if ignored {
        format!("Members with **{}** will no longer earn XP.", role.name)
    } else {
        format!("Members with **{}** earn XP again.", role.name)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Toggle whether a member earns XP.
#[poise::command(slash_command, prefix_command, rename = "memberignore")]
pub async fn guild_memberignore(
    ctx: Context<'_>,
    #[description = "Member to toggle"] user: serenity::User,
) -> Result<(), Error> {
    let ignored = ctx
        .data()
        .leveling
        .toggle_ignored_member(guild_id(&ctx)?, user.id.get())
        .await?;

    let reply = if ignored {
        format!("{} will no longer earn XP.", user.name)
    } else {
        format!("{} earns XP again.", user.name)
    };
    ctx.say(reply).await?;
    Ok(())
}

// ============================================================================
// MEMBER
// ============================================================================

/// Per-member overrides.
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("member_reset", "member_setlevel", "member_givexp"),
    subcommand_required
)]
pub async fn member(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Delete ALL stored progress of a member. Does not ask for confirmation.
#[poise::command(slash_command, prefix_command, rename = "reset")]
pub async fn member_reset(
    ctx: Context<'_>,
    #[description = "Member whose data should be deleted"] user: serenity::User,
) -> Result<(), Error> {
    match ctx
        .data()
        .leveling
        .reset_member(guild_id(&ctx)?, user.id.get())
        .await
    {
        Ok(()) => {
            ctx.say(format!("Data for <@{}> has been deleted!", user.id))
                .await?;
        }
        Err(LevelingError::MemberNotFound) => {
            ctx.say(format!("No data for <@{}> has been found", user.id))
                .await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Change a member's level. Their XP inside the level is reset to 0.
#[poise::command(
    slash_command,
    prefix_command,
    rename = "setlevel",
    aliases("lvl", "level")
)]
pub async fn member_setlevel(
    ctx: Context<'_>,
    #[description = "Member to change"] member: serenity::Member,
    #[description = "New level"] level: i64,
) -> Result<(), Error> {
    if member.user.bot {
        ctx.say("Bots don't earn XP! 🤖").await?;
        return Ok(());
    }

    let change = match ctx
        .data()
        .leveling
        .set_level(
            guild_id(&ctx)?,
            member.user.id.get(),
            member.display_name(),
            level,
        )
        .await
    {
        Ok(change) => change,
        Err(e @ LevelingError::InvalidLevel(_)) => {
            ctx.say(e.to_string()).await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    sync_roles(ctx, &member, &change).await?;
    ctx.say(format!(
        "Level of <@{}> has been changed to {}",
        member.user.id, change.state.level
    ))
    .await?;
    Ok(())
}

/// Give (or with a negative amount, take) XP. Levels and roles follow.
#[poise::command(slash_command, prefix_command, rename = "givexp", aliases("xp"))]
pub async fn member_givexp(
    ctx: Context<'_>,
    #[description = "Member to award"] member: serenity::Member,
    #[description = "Amount of XP"] amount: i64,
    #[description = "Why they deserve it"]
    #[rest]
    reason: Option<String>,
) -> Result<(), Error> {
    if member.user.bot {
        ctx.say("You can't give XP to bots!").await?;
        return Ok(());
    }

    let change = ctx
        .data()
        .leveling
        .give_xp(
            guild_id(&ctx)?,
            member.user.id.get(),
            member.display_name(),
            amount,
        )
        .await?;
    sync_roles(ctx, &member, &change).await?;

    let reason = reason.map(|r| format!(" for {}", r)).unwrap_or_default();
    let mut reply = format!("<@{}> has received {} xp{}!", member.user.id, amount, reason);
    if change.levels_gained > 0 {
        reply.push_str(&format!(
            "\n{} {} earned by that. New shiny level: {}",
            change.levels_gained,
            if change.levels_gained == 1 {
                "level was"
            } else {
                "levels were"
            },
            change.state.level
        ));
    }
    ctx.say(reply).await?;
    Ok(())
}

async fn sync_roles(
    ctx: Context<'_>,
    member: &serenity::Member,
    change: &AdminChange,
) -> Result<(), Error> {
    let Some(tier_change) = &change.tier_change else {
        return Ok(());
    };
    let tiers = ctx.data().leveling.tiers(guild_id(&ctx)?).await?;
    apply_tier_change(
        ctx.http(),
        member.guild_id,
        member.user.id,
        &member.roles,
        &tiers,
        tier_change,
    )
    .await;
    Ok(())
}

// ============================================================================
// CONFIG
// ============================================================================

/// Leveling settings for this server.
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("config_show", "config_set", "config_reset"),
    subcommand_required
)]
pub async fn config(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the current settings.
#[poise::command(slash_command, prefix_command, rename = "show", aliases("get"))]
pub async fn config_show(ctx: Context<'_>) -> Result<(), Error> {
    let config = ctx.data().leveling.guild_config(guild_id(&ctx)?).await?;
    ctx.send(poise::CreateReply::default().embed(config_embed(&config)))
        .await?;
    Ok(())
}

/// Change a setting.
///
/// Keys: goal, gainfactor, minxp, maxxp, cooldown, leaderboard_max, announce,
/// active, lvlmessage, rolemessage. Message templates take `none` to turn
/// the message off.
#[poise::command(slash_command, prefix_command, rename = "set")]
pub async fn config_set(
    ctx: Context<'_>,
    #[description = "Setting name"] key: String,
    #[description = "New value"]
    #[rest]
    value: String,
) -> Result<(), Error> {
    let update = match ConfigUpdate::parse(&key, &value) {
        Ok(update) => update,
        Err(msg) => {
            ctx.say(msg).await?;
            return Ok(());
        }
    };

    match ctx
        .data()
        .leveling
        .update_config(guild_id(&ctx)?, update)
        .await
    {
        Ok(_) => {
            ctx.say(format!("`{}` updated", key)).await?;
        }
        Err(e @ LevelingError::InvalidConfig(_)) => {
            ctx.say(e.to_string()).await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Reset ALL settings (including level roles and ignores) to defaults.
#[poise::command(slash_command, prefix_command, rename = "reset")]
pub async fn config_reset(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().leveling.reset_config(guild_id(&ctx)?).await?;
    ctx.say("Leveling settings have been reset to defaults.")
        .await?;
    Ok(())
}

fn config_embed(config: &GuildConfig) -> serenity::CreateEmbed {
    let or_off = |template: &str| {
        if template.is_empty() {
            "*off*".to_string()
        } else {
            format!("`{}`", template)
        }
    };

    serenity::CreateEmbed::new()
        .title("Leveling settings")
        .color(if config.active { 0x00FF00 } else { 0xFF0000 })
        .field("Active", config.active.to_string(), true)
        .field("Announcements", config.make_announcements.to_string(), true)
        .field("Cooldown", format!("{}s", config.cooldown_secs), true)
        .field(
            "XP per message",
            format!("{} - {}", config.xp_min, config.xp_max),
            true,
        )
        .field("Gain factor", config.xp_gain_factor.to_string(), true)
        .field("Goal base", config.xp_goal_base.to_string(), true)
        .field("Leaderboard max", config.leaderboard_max.to_string(), true)
        .field("Level roles", config.role_tiers.len().to_string(), true)
        .field(
            "Ignored",
            format!(
                "{} channels, {} roles, {} members",
                config.ignored_channels.len(),
                config.ignored_roles.len(),
                config.ignored_members.len()
            ),
            true,
        )
        .field("Level message", or_off(&config.level_up_message), false)
        .field("Role message", or_off(&config.role_change_message), false)
}
