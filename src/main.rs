//! Warden Discord bot entry point.
//!
//! Wires the protection engine, slash command handler, database, and health
//! server to the serenity gateway client.

use std::sync::Arc;

use serenity::model::application::Interaction;
use serenity::model::gateway::Ready;
use serenity::model::guild::Member;
use serenity::model::id::GuildId;
use serenity::model::user::User;
use serenity::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use warden::commands::SlashCommandHandler;
use warden::config::WardenConfig;
use warden::database::Database;
use warden::error::{Result, WardenError};
use warden::events::ProtectionEngine;
use warden::health::spawn_health_server;
use warden::logs::ProtectionLogger;

/// Main event handler for the bot.
struct WardenHandler {
    engine: Arc<ProtectionEngine>,
    command_handler: Arc<SlashCommandHandler>,
}

#[serenity::async_trait]
impl EventHandler for WardenHandler {
    async fn guild_ban_addition(&self, _ctx: Context, guild_id: GuildId, banned_user: User) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.on_ban_added(guild_id, &banned_user).await;
        });
    }

    async fn guild_ban_removal(&self, _ctx: Context, guild_id: GuildId, unbanned_user: User) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.on_ban_removed(guild_id, &unbanned_user).await;
        });
    }

    async fn guild_member_addition(&self, _ctx: Context, new_member: Member) {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.on_member_joined(&new_member).await;
        });
    }

    async fn guild_member_removal(
        &self,
        _ctx: Context,
        guild_id: GuildId,
        user: User,
        _member_data: Option<Member>,
    ) {
        // Spawned off the dispatch path: the kick pipeline sleeps before its
        // audit query and must not delay later gateway events.
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.on_member_removed(guild_id, &user).await;
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = self.command_handler.handle_command(&ctx, &command).await {
                tracing::error!(error = %e, "Failed to handle slash command");
            }
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(
            user = %ready.user.name,
            build = env!("BUILD_TIMESTAMP"),
            "Warden bot connected"
        );
        self.engine.set_bot_user_id(ready.user.id);

        // Register slash commands globally
        let commands = SlashCommandHandler::register_commands();
        if let Err(e) = serenity::all::Command::set_global_commands(&ctx.http, commands).await {
            tracing::error!(error = %e, "Failed to register slash commands");
        } else {
            tracing::info!("Slash commands registered");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // RUST_LOG controls verbosity, e.g. RUST_LOG=warden=debug
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Warden bot starting...");

    let config = WardenConfig::from_env()?;
    tracing::info!("Configuration loaded");

    let db = Database::new(&config.database_path).await?;
    tracing::info!(path = %config.database_path, "Database initialized");

    spawn_health_server(config.health_port, db.clone());

    let http = Arc::new(serenity::http::Http::new(&config.discord_token));
    let logger = Arc::new(ProtectionLogger::new(http.clone(), db.clone()));
    let engine = Arc::new(ProtectionEngine::new(http, logger)?);
    tracing::info!("Protection engine initialized");

    let command_handler = Arc::new(SlashCommandHandler::new(engine.clone()));

    let handler = WardenHandler {
        engine,
        command_handler,
    };

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS | GatewayIntents::GUILD_MODERATION;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| WardenError::DiscordApi(Box::new(e)))?;

    tracing::info!("Starting Discord client...");

    client
        .start()
        .await
        .map_err(|e| WardenError::DiscordApi(Box::new(e)))?;

    Ok(())
}
