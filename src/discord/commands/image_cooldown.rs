// Image cooldown configuration commands.

use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Limit how often members can post images in watched channels.
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    rename = "imagecooldown",
    aliases("imgcd"),
    required_permissions = "MANAGE_MESSAGES",
    subcommands(
        "status",
        "toggle",
        "cooldown",
        "limit",
        "watch",
        "exempt_member",
        "exempt_role"
    ),
    subcommand_required
)]
pub async fn image_cooldown(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn guild_id(ctx: &Context<'_>) -> Result<u64, Error> {
    Ok(ctx.guild_id().ok_or("Must be used in a server")?.get())
}

fn mention_list(ids: &[u64], prefix: &str) -> String {
    if ids.is_empty() {
        "None".to_string()
    } else {
        ids.iter()
            .map(|id| format!("<{}{}>", prefix, id))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Show the current image cooldown settings.
#[poise::command(slash_command, prefix_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let config = ctx
        .data()
        .image_cooldown
        .config(guild_id(&ctx)?)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let embed = serenity::CreateEmbed::new()
        .title("🖼️ Image Cooldown")
        .color(if config.active { 0x00FF00 } else { 0xFF0000 })
        .field(
            "Status",
            if config.active { "✅ Enabled" } else { "❌ Disabled" },
            true,
        )
        .field("Cooldown", format!("{} seconds", config.cooldown_secs), true)
        .field(
            "Attachment limit",
            format!("{} per message", config.attachment_limit),
            true,
        )
        .field(
            "Watched channels",
            mention_list(&config.watched_channels, "#"),
            false,
        )
        .field("Exempt roles", mention_list(&config.exempt_roles, "@&"), false)
        .field(
            "Exempt members",
            mention_list(&config.exempt_members, "@"),
            false,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Turn the image cooldown on or off.
#[poise::command(slash_command, prefix_command)]
pub async fn toggle(ctx: Context<'_>) -> Result<(), Error> {
    let active = ctx
        .data()
        .image_cooldown
        .toggle_active(guild_id(&ctx)?)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    ctx.say(if active {
        "✅ Image cooldown enabled."
    } else {
        "❌ Image cooldown disabled."
    })
    .await?;
    Ok(())
}

/// Set the time members must wait between image posts.
#[poise::command(slash_command, prefix_command)]
pub async fn cooldown(
    ctx: Context<'_>,
    #[description = "Seconds between image posts"]
    #[min = 1]
    seconds: u64,
) -> Result<(), Error> {
    ctx.data()
        .image_cooldown
        .set_cooldown(guild_id(&ctx)?, seconds)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    ctx.say(format!("Image cooldown set to {} seconds.", seconds))
        .await?;
    Ok(())
}

/// Set how many attachments fit in one message.
#[poise::command(slash_command, prefix_command)]
pub async fn limit(
    ctx: Context<'_>,
    #[description = "Attachments allowed per message"]
    #[min = 1]
    attachments: usize,
) -> Result<(), Error> {
    ctx.data()
        .image_cooldown
        .set_attachment_limit(guild_id(&ctx)?, attachments)
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    ctx.say(format!(
        "Members can now post up to {} attachments per message.",
        attachments
    ))
    .await?;
    Ok(())
}

/// Toggle whether the cooldown applies in a channel.
#[poise::command(slash_command, prefix_command)]
pub async fn watch(
    ctx: Context<'_>,
    #[description = "Channel to toggle (defaults to this one)"] channel: Option<
        serenity::GuildChannel,
    >,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    let watched = ctx
        .data()
        .image_cooldown
        .toggle_watched_channel(guild_id(&ctx)?, channel_id.get())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let reply = if watched {
        format!("Image cooldown now applies in <#{}>.", channel_id)
    } else {
        format!("<#{}> is no longer watched.", channel_id)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Toggle a member's exemption from the cooldown.
#[poise::command(slash_command, prefix_command, rename = "exempt_member")]
pub async fn exempt_member(
    ctx: Context<'_>,
    #[description = "Member to toggle"] user: serenity::User,
) -> Result<(), Error> {
    let exempt = ctx
        .data()
        .image_cooldown
        .toggle_exempt_member(guild_id(&ctx)?, user.id.get())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let reply = if exempt {
        format!("{} is now exempt from the image cooldown.", user.name)
    } else {
        format!("{} is subject to the image cooldown again.", user.name)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Toggle a role's exemption from the cooldown.
#[poise::command(slash_command, prefix_command, rename = "exempt_role")]
pub async fn exempt_role(
    ctx: Context<'_>,
    #[description = "Role to toggle"] role: serenity::Role,
) -> Result<(), Error> {
    let exempt = ctx
        .data()
        .image_cooldown
        .toggle_exempt_role(guild_id(&ctx)?, role.id.get())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let reply = if exempt {
        format!("Members with **{}** are now exempt.", role.name)
    } else {
        format!("Members with **{}** are subject to the cooldown again.", role.name)
    };
    ctx.say(reply).await?;
    Ok(())
}
