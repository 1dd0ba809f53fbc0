use crate::core::server_stats::{StatsPeriod, StatsReading, StatsScope};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum PeriodChoice {
    #[name = "day"]
    Day,
    #[name = "month"]
    Month,
    #[name = "total"]
    Total,
}

impl PeriodChoice {
    fn with_offset(self, ago: u32) -> StatsPeriod {
        match self {
            PeriodChoice::Day => StatsPeriod::Day { days_ago: ago },
            PeriodChoice::Month => StatsPeriod::Month { months_ago: ago },
            PeriodChoice::Total => StatsPeriod::Total,
        }
    }
}

/// Message statistics for this server
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    aliases("stats"),
    required_permissions = "ADMINISTRATOR",
    subcommands("guild", "channel", "member", "register", "toggle", "ignore"),
    subcommand_required
)]
pub async fn serverstats(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn guild_id(ctx: &Context<'_>) -> Result<u64, Error> {
    Ok(ctx.guild_id().ok_or("Must be in a guild")?.get())
}

async fn reply_with_reading(
    ctx: Context<'_>,
    subject: &str,
    scope: StatsScope,
    period: PeriodChoice,
    ago: Option<u32>,
) -> Result<(), Error> {
    let today = chrono::Utc::now().date_naive();
    let reading = ctx
        .data()
        .server_stats
        .query(guild_id(&ctx)?, scope, period.with_offset(ago.unwrap_or(0)), today)
        .await?;

    let message = match reading {
        StatsReading::Day { date, count } => {
            format!("Message count for {} on {}: {}", subject, date, count)
        }
        StatsReading::Month { month, count } => format!(
            "Message count for {} in {}: {}",
            subject,
            month.format("%B %Y"),
            count
        ),
        StatsReading::Total(count) => format!("Total message count for {}: {}", subject, count),
        StatsReading::NoData => "No data found for the requested period".to_string(),
        StatsReading::TooOld => {
            "The requested period is too old and has already been overwritten".to_string()
        }
    };

    ctx.say(message).await?;
    Ok(())
}

/// Messages sent in the whole server
#[poise::command(slash_command, prefix_command)]
pub async fn guild(
    ctx: Context<'_>,
    #[description = "day, month or total"] period: PeriodChoice,
    #[description = "How many days/months back (default: 0)"] ago: Option<u32>,
) -> Result<(), Error> {
    let name = ctx
        .guild()
        .map(|g| g.name.clone())
        .unwrap_or_else(|| "this server".to_string());
    reply_with_reading(ctx, &name, StatsScope::Guild, period, ago).await
}

/// Messages sent in one channel
#[poise::command(slash_command, prefix_command)]
pub async fn channel(
    ctx: Context<'_>,
    #[description = "Channel to inspect"] channel: serenity::GuildChannel,
    #[description = "day, month or total"] period: PeriodChoice,
    #[description = "How many days/months back (default: 0)"] ago: Option<u32>,
) -> Result<(), Error> {
    let subject = format!("#{}", channel.name);
    reply_with_reading(ctx, &subject, StatsScope::Channel(channel.id.get()), period, ago).await
}

/// Messages sent by one member
#[poise::command(slash_command, prefix_command)]
pub async fn member(
    ctx: Context<'_>,
    #[description = "Member to inspect"] user: serenity::User,
    #[description = "day, month or total"] period: PeriodChoice,
    #[description = "How many days/months back (default: 0)"] ago: Option<u32>,
) -> Result<(), Error> {
    reply_with_reading(ctx, &user.name, StatsScope::Member(user.id.get()), period, ago).await
}

/// Fold every finished day into monthly and total counts now
#[poise::command(slash_command, prefix_command)]
pub async fn register(ctx: Context<'_>) -> Result<(), Error> {
    let today = chrono::Utc::now().date_naive();
    let guilds = ctx
        .data()
        .server_stats
        .register_finished_days(today)
        .await?;
    ctx.say(format!("Statistics registered manually ({} servers updated).", guilds))
        .await?;
    Ok(())
}

/// Turn message counting on or off
#[poise::command(slash_command, prefix_command)]
pub async fn toggle(ctx: Context<'_>) -> Result<(), Error> {
    let enabled = ctx
        .data()
        .server_stats
        .toggle_enabled(guild_id(&ctx)?)
        .await?;
    ctx.say(if enabled {
        "✅ Message statistics enabled."
    } else {
        "❌ Message statistics disabled."
    })
    .await?;
    Ok(())
}

/// Toggle whether a channel's messages are counted
#[poise::command(slash_command, prefix_command)]
pub async fn ignore(
    ctx: Context<'_>,
    #[description = "Channel to toggle (defaults to this one)"] channel: Option<
        serenity::GuildChannel,
    >,
) -> Result<(), Error> {
    let channel_id = channel.map(|c| c.id).unwrap_or_else(|| ctx.channel_id());
    let ignored = ctx
        .data()
        .server_stats
        .toggle_ignored_channel(guild_id(&ctx)?, channel_id.get())
        .await?;

    let reply = if ignored {
        format!("Messages in <#{}> are no longer counted.", channel_id)
    } else {
        format!("Messages in <#{}> are counted again.", channel_id)
    };
    ctx.say(reply).await?;
    Ok(())
}
