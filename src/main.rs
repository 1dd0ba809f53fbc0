// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, files)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands, event handlers and background tasks

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::image_cooldown::ImageCooldownService;
use crate::core::leveling::{LevelingError, LevelingService, MessageMeta};
use crate::core::server_stats::server_stats_models::until_next_midnight;
use crate::core::server_stats::ServerStatsService;
use crate::discord::image_cooldown::handle_message_attachments;
use crate::discord::leveling_announcements::{apply_tier_change, send_level_up_embed};
use crate::discord::{Data, Error};
use crate::infra::image_cooldown::JsonImageCooldownStore;
use crate::infra::leveling::SqliteLevelingStore;
use crate::infra::server_stats::JsonServerStatsStore;
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How often buffered message statistics are written to disk.
const STATS_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            // Ignore bot messages (including our own)
            if new_message.author.bot {
                return Ok(());
            }
            // Only guild messages are tracked
            let Some(guild_id) = new_message.guild_id else {
                return Ok(());
            };

            let is_command = !data.command_prefix.is_empty()
                && new_message.content.starts_with(&data.command_prefix);
            if !is_command {
                if let Err(e) = data
                    .server_stats
                    .record_message(
                        guild_id.get(),
                        new_message.channel_id.get(),
                        new_message.author.id.get(),
                        Utc::now(),
                    )
                    .await
                {
                    tracing::error!("Failed to record message stats: {}", e);
                }
            }

            match handle_message_attachments(ctx, new_message, &data.image_cooldown).await {
                // Deleted, so it shouldn't earn XP either
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => tracing::error!("Image cooldown check failed: {}", e),
            }

            award_message_xp(ctx, new_message, data, guild_id).await;
        }
        serenity::FullEvent::GuildMemberUpdate { event, .. } => {
            let name = event
                .nick
                .clone()
                .unwrap_or_else(|| event.user.display_name().to_string());
            if let Err(e) = data
                .leveling
                .rename_member(event.guild_id.get(), event.user.id.get(), &name)
                .await
            {
                tracing::warn!("Failed to update stored member name: {}", e);
            }
        }

        _ => {}
    }

    Ok(())
}

/// Run a qualifying message through the leveling service and act on a
/// level-up: swap tier roles and post the announcement.
async fn award_message_xp(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
    guild_id: serenity::GuildId,
) {
    let config = match data.leveling.guild_config(guild_id.get()).await {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load leveling config: {}", e);
            return;
        }
    };

    let held_roles: Vec<serenity::RoleId> = msg
        .member
        .as_ref()
        .map(|m| m.roles.clone())
        .unwrap_or_default();
    let role_ids: Vec<u64> = held_roles.iter().map(|r| r.get()).collect();

    let meta = MessageMeta {
        author_id: msg.author.id.get(),
        author_is_bot: msg.author.bot,
        channel_id: msg.channel_id.get(),
        role_ids: &role_ids,
        content: &msg.content,
    };
    if !config.accepts_message(&meta, &data.command_prefix) {
        return;
    }

    let username = msg
        .member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .unwrap_or_else(|| msg.author.display_name().to_string());

    match data
        .leveling
        .process_message(guild_id.get(), msg.author.id.get(), &username, Utc::now())
        .await
    {
        Ok(Some(level_up)) => {
            if let Some(change) = &level_up.tier_change {
                apply_tier_change(
                    &ctx.http,
                    guild_id,
                    msg.author.id,
                    &held_roles,
                    &config.role_tiers,
                    change,
                )
                .await;
            }

            // A tier change alone (first message, edited tier table) is silent
            if !level_up.leveled_up() {
                return;
            }
            tracing::info!(
                member_id = level_up.member_id,
                guild_id = level_up.guild_id,
                old_level = level_up.old_level,
                new_level = level_up.new_level,
                "Member leveled up"
            );
            if let Err(err) = send_level_up_embed(ctx, msg, &config, &level_up).await {
                tracing::warn!("Failed to send level-up embed: {err}");
            }
        }
        Ok(None) => {
            // XP was awarded but nothing else changed
        }
        Err(LevelingError::OnCooldown(_)) | Err(LevelingError::Inactive) => {}
        Err(e) => {
            // Log it but don't crash
            tracing::error!("Error processing XP for message: {}", e);
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );
    let command_prefix = std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".to_string());

    // Keep runtime data in a dedicated folder so the repo root stays tidy.
    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let leveling_store = SqliteLevelingStore::new(&data_dir.join("leveling.db").to_string_lossy())
        .await
        .expect("Failed to initialize SQLite leveling store");
    let leveling_service = Arc::new(LevelingService::new(leveling_store));

    let cooldown_store = JsonImageCooldownStore::new(data_dir.join("image_cooldown.json"));
    let image_cooldown_service = Arc::new(ImageCooldownService::new(cooldown_store));

    let stats_store = JsonServerStatsStore::new(data_dir.join("server_stats.json"));
    let stats_service = Arc::new(ServerStatsService::new(stats_store));

    let data = Data {
        leveling: Arc::clone(&leveling_service),
        image_cooldown: Arc::clone(&image_cooldown_service),
        server_stats: Arc::clone(&stats_service),
        command_prefix: command_prefix.clone(),
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::commands::leveling::lvl(),
                discord::commands::leveling::xp(),
                discord::commands::leveling::leaderboard(),
                discord::commands::lvladmin::lvladmin(),
                discord::commands::image_cooldown::image_cooldown(),
                discord::commands::server_stats::serverstats(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(command_prefix),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                // Global registration can take up to an hour to propagate
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");

                // Midnight rollover. The first pass catches up on days missed
                // while the bot was offline.
                let stats = Arc::clone(&data.server_stats);
                tokio::spawn(async move {
                    loop {
                        let today = Utc::now().date_naive();
                        match stats.register_finished_days(today).await {
                            Ok(guilds) => {
                                tracing::info!(guilds, %today, "Message statistics registered")
                            }
                            Err(err) => tracing::warn!("Statistics registration failed: {}", err),
                        }

                        let wait = until_next_midnight(Utc::now());
                        tracing::debug!("Next statistics registration in {:?}", wait);
                        // A second of slack so we wake up on the new date
                        tokio::time::sleep(wait + Duration::from_secs(1)).await;
                    }
                });

                let stats = Arc::clone(&data.server_stats);
                tokio::spawn(async move {
                    loop {
                        tokio::time::sleep(STATS_FLUSH_INTERVAL).await;
                        if let Err(err) = stats.flush().await {
                            tracing::warn!("Failed to write message statistics: {}", err);
                        }
                    }
                });

                tracing::info!("Bot is ready!");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
