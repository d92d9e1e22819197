//! Slash command registration and dispatch.
//!
//! Protection commands (/antiraid, /banprotection, /kickprotection,
//! /protectionlog) are owner-only. Moderation commands (/ban, /kick, /mute,
//! /unmute, /clear) are gated on the member's Discord permissions.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serenity::all::{
    CommandDataOption, CommandDataOptionValue, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditMember, GetMessages, Permissions,
};
use serenity::model::id::UserId;

use crate::abuse::{AbuseDetector, DetectorConfig};
use crate::error::{Result, WardenError};
use crate::events::ProtectionEngine;
use crate::logs::ProtectionSystem;
use crate::punish::Punishment;
use crate::raid::RaidConfig;

const DEFAULT_RAID_USER_LIMIT: i64 = 5;
const DEFAULT_RAID_WINDOW_SECS: i64 = 30;
const DEFAULT_BAN_LIMIT: i64 = 3;
const DEFAULT_BAN_WINDOW_MINUTES: i64 = 3;
const DEFAULT_MUTE_MINUTES: i64 = 60;
const HISTORY_LIMIT: usize = 10;

/// Bulk deletion only works on messages younger than this.
const BULK_DELETE_MAX_AGE_DAYS: i64 = 14;

/// Slash command handler.
pub struct SlashCommandHandler {
    engine: Arc<ProtectionEngine>,
}

impl SlashCommandHandler {
    pub fn new(engine: Arc<ProtectionEngine>) -> Self {
        Self { engine }
    }

    /// Register all slash commands with Discord.
    pub fn register_commands() -> Vec<CreateCommand> {
        vec![
            Self::create_antiraid_command(),
            Self::create_banprotection_command(),
            Self::create_kickprotection_command(),
            Self::create_protectionlog_command(),
            Self::create_ban_command(),
            Self::create_kick_command(),
            Self::create_mute_command(),
            Self::create_unmute_command(),
            Self::create_clear_command(),
        ]
    }

    fn create_antiraid_command() -> CreateCommand {
        CreateCommand::new("antiraid")
            .description("Anti-raid join monitoring")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "enable",
                    "Enable anti-raid protection",
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Integer,
                        "user-limit",
                        "Joins within the window that trigger an alert (default 5)",
                    )
                    .min_int_value(3)
                    .max_int_value(20)
                    .required(false),
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Integer,
                        "window-seconds",
                        "Window length in seconds (default 30)",
                    )
                    .min_int_value(10)
                    .max_int_value(300)
                    .required(false),
                ),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "disable",
                "Disable anti-raid protection",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "status",
                "Show anti-raid configuration and recent joins",
            ))
    }

    fn create_banprotection_command() -> CreateCommand {
        CreateCommand::new("banprotection")
            .description("Ban-abuse monitoring for moderators")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "enable",
                    "Enable ban-abuse protection",
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Integer,
                        "ban-limit",
                        "Bans within the window that flag a moderator (default 3)",
                    )
                    .min_int_value(2)
                    .max_int_value(10)
                    .required(false),
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Integer,
                        "window-minutes",
                        "Window length in minutes (default 3)",
                    )
                    .min_int_value(1)
                    .max_int_value(60)
                    .required(false),
                )
                .add_sub_option(punishment_option(false)),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "disable",
                "Disable ban-abuse protection",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "status",
                "Show ban-abuse configuration",
            ))
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "history",
                    "Show recorded ban activity",
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::User,
                        "user",
                        "Show one moderator's recent bans",
                    )
                    .required(false),
                ),
            )
    }

    fn create_kickprotection_command() -> CreateCommand {
        CreateCommand::new("kickprotection")
            .description("Kick-abuse monitoring for moderators")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "enable",
                    "Enable kick-abuse protection",
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Integer,
                        "kick-limit",
                        "Kicks within the window that flag a moderator",
                    )
                    .min_int_value(1)
                    .max_int_value(20)
                    .required(true),
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Integer,
                        "window-minutes",
                        "Window length in minutes",
                    )
                    .min_int_value(1)
                    .max_int_value(60)
                    .required(true),
                )
                .add_sub_option(punishment_option(true)),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "disable",
                "Disable kick-abuse protection",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "status",
                "Show kick-abuse configuration",
            ))
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "history",
                    "Show recorded kick activity",
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::User,
                        "user",
                        "Show one moderator's recent kicks",
                    )
                    .required(false),
                ),
            )
    }

    fn create_protectionlog_command() -> CreateCommand {
        CreateCommand::new("protectionlog")
            .description("Route protection logs to channels")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "set",
                    "Route a protection system's logs to a channel",
                )
                .add_sub_option(system_option())
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Channel,
                        "channel",
                        "Channel to send logs to",
                    )
                    .required(true),
                ),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "remove",
                    "Remove a protection system's log route",
                )
                .add_sub_option(system_option()),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "list",
                "List configured log routes",
            ))
    }

    fn create_ban_command() -> CreateCommand {
        CreateCommand::new("ban")
            .description("Ban a member")
            .default_member_permissions(Permissions::BAN_MEMBERS)
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "Member to ban")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "reason", "Reason for the ban")
                    .required(false),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Integer,
                    "delete-message-days",
                    "Days of the member's messages to delete (0-7)",
                )
                .min_int_value(0)
                .max_int_value(7)
                .required(false),
            )
    }

    fn create_kick_command() -> CreateCommand {
        CreateCommand::new("kick")
            .description("Kick a member")
            .default_member_permissions(Permissions::KICK_MEMBERS)
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "Member to kick")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "reason",
                    "Reason for the kick",
                )
                .required(false),
            )
    }

    fn create_mute_command() -> CreateCommand {
        CreateCommand::new("mute")
            .description("Timeout a member")
            .default_member_permissions(Permissions::MODERATE_MEMBERS)
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "Member to mute")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Integer,
                    "minutes",
                    "Timeout length in minutes (default 60)",
                )
                .min_int_value(1)
                .max_int_value(10080)
                .required(false),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "reason",
                    "Reason for the mute",
                )
                .required(false),
            )
    }

    fn create_unmute_command() -> CreateCommand {
        CreateCommand::new("unmute")
            .description("Lift a member's timeout")
            .default_member_permissions(Permissions::MODERATE_MEMBERS)
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "Member to unmute")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "reason",
                    "Reason for the unmute",
                )
                .required(false),
            )
    }

    fn create_clear_command() -> CreateCommand {
        CreateCommand::new("clear")
            .description("Bulk delete recent messages in this channel")
            .default_member_permissions(Permissions::MANAGE_MESSAGES)
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Integer,
                    "count",
                    "How many messages to delete (1-100)",
                )
                .min_int_value(1)
                .max_int_value(100)
                .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::User,
                    "user",
                    "Only delete this member's messages",
                )
                .required(false),
            )
    }

    /// Handle an incoming slash command interaction.
    pub async fn handle_command(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        match command.data.name.as_str() {
            "antiraid" => self.handle_antiraid(ctx, command).await,
            "banprotection" => {
                self.handle_abuse_protection(ctx, command, &self.engine.ban_detector, "ban")
                    .await
            }
            "kickprotection" => {
                self.handle_abuse_protection(ctx, command, &self.engine.kick_detector, "kick")
                    .await
            }
            "protectionlog" => self.handle_protectionlog(ctx, command).await,
            "ban" => self.handle_ban(ctx, command).await,
            "kick" => self.handle_kick(ctx, command).await,
            "mute" => self.handle_mute(ctx, command).await,
            "unmute" => self.handle_unmute(ctx, command).await,
            "clear" => self.handle_clear(ctx, command).await,
            _ => self.respond_error(ctx, command, "Unknown command.").await,
        }
    }

    /// Protection commands may only be used by the guild owner.
    async fn require_owner(&self, ctx: &Context, command: &CommandInteraction) -> Result<bool> {
        let guild_id = command
            .guild_id
            .ok_or_else(|| WardenError::Config("Command must be used in a server".to_string()))?;

        let guild = ctx
            .http
            .get_guild(guild_id)
            .await
            .map_err(|e| WardenError::DiscordApi(Box::new(e)))?;

        if guild.owner_id != command.user.id {
            self.respond_error(
                ctx,
                command,
                "Only the server owner can configure protection systems.",
            )
            .await?;
            return Ok(false);
        }
        Ok(true)
    }

    fn has_permission(command: &CommandInteraction, required: Permissions) -> bool {
        command
            .member
            .as_ref()
            .and_then(|m| m.permissions)
            .unwrap_or(Permissions::empty())
            .contains(required)
    }

    async fn handle_antiraid(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        if !self.require_owner(ctx, command).await? {
            return Ok(());
        }
        let guild_id = command
            .guild_id
            .ok_or_else(|| WardenError::Config("Command must be used in a server".to_string()))?;

        let (subcommand, options) = subcommand_of(command);
        match subcommand {
            "enable" => {
                let user_limit = find_i64(options, "user-limit").unwrap_or(DEFAULT_RAID_USER_LIMIT);
                let window_secs =
                    find_i64(options, "window-seconds").unwrap_or(DEFAULT_RAID_WINDOW_SECS);

                self.engine
                    .raid_detector
                    .enable(
                        guild_id.get(),
                        RaidConfig {
                            user_limit: user_limit as u32,
                            window_secs: window_secs as u64,
                        },
                    )
                    .await;

                self.respond_message(
                    ctx,
                    command,
                    &format!(
                        "🛡️ **Anti-raid enabled.**\nAlert when **{user_limit}** members join \
                         within **{window_secs}s**. Suspicious new accounts are reviewed \
                         automatically."
                    ),
                )
                .await
            }
            "disable" => {
                if self.engine.raid_detector.disable(guild_id.get()).await {
                    self.respond_message(ctx, command, "🛡️ Anti-raid protection disabled.")
                        .await
                } else {
                    self.respond_message(ctx, command, "Anti-raid protection is already disabled.")
                        .await
                }
            }
            "status" => {
                match self
                    .engine
                    .raid_detector
                    .status(guild_id.get(), Utc::now())
                    .await
                {
                    Some(status) => {
                        self.respond_message(
                            ctx,
                            command,
                            &format!(
                                "🛡️ **Anti-raid status**\n\
                                 • User limit: {}\n\
                                 • Window: {}s\n\
                                 • Joins in current window: {}",
                                status.config.user_limit,
                                status.config.window_secs,
                                status.recent_joins,
                            ),
                        )
                        .await
                    }
                    None => {
                        self.respond_message(ctx, command, "Anti-raid protection is disabled.")
                            .await
                    }
                }
            }
            _ => self.respond_error(ctx, command, "Unknown subcommand.").await,
        }
    }

    /// Shared handler for /banprotection and /kickprotection; the two
    /// commands differ only in the detector, the limit option name, and
    /// whether enable options are required.
    async fn handle_abuse_protection(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        detector: &AbuseDetector,
        action_noun: &str,
    ) -> Result<()> {
        if !self.require_owner(ctx, command).await? {
            return Ok(());
        }
        let guild_id = command
            .guild_id
            .ok_or_else(|| WardenError::Config("Command must be used in a server".to_string()))?;

        let (subcommand, options) = subcommand_of(command);
        match subcommand {
            "enable" => {
                let limit_name = format!("{action_noun}-limit");
                let Some(threshold) = find_i64(options, &limit_name)
                    .or_else(|| (action_noun == "ban").then_some(DEFAULT_BAN_LIMIT))
                else {
                    return self
                        .respond_error(ctx, command, &format!("Please provide {limit_name}."))
                        .await;
                };
                let Some(window_minutes) = find_i64(options, "window-minutes")
                    .or_else(|| (action_noun == "ban").then_some(DEFAULT_BAN_WINDOW_MINUTES))
                else {
                    return self
                        .respond_error(ctx, command, "Please provide window-minutes.")
                        .await;
                };
                let punishment = find_str(options, "punishment")
                    .and_then(|s| Punishment::from_str(s).ok())
                    .unwrap_or(Punishment::Warn);

                detector
                    .enable(
                        guild_id.get(),
                        DetectorConfig {
                            threshold: threshold as u32,
                            window_secs: window_minutes as u64 * 60,
                            punishment,
                        },
                    )
                    .await;

                self.respond_message(
                    ctx,
                    command,
                    &format!(
                        "🛡️ **{} protection enabled.**\n\
                         Moderators issuing **{threshold}** {action_noun}s within \
                         **{window_minutes} minute(s)** will be flagged.\n\
                         Punishment: {}",
                        capitalize(action_noun),
                        punishment.label(),
                    ),
                )
                .await
            }
            "disable" => {
                if detector.disable(guild_id.get()).await {
                    self.respond_message(
                        ctx,
                        command,
                        &format!("🛡️ {} protection disabled.", capitalize(action_noun)),
                    )
                    .await
                } else {
                    self.respond_message(
                        ctx,
                        command,
                        &format!("{} protection is already disabled.", capitalize(action_noun)),
                    )
                    .await
                }
            }
            "status" => match detector.config(guild_id.get()).await {
                Some(config) => {
                    self.respond_message(
                        ctx,
                        command,
                        &format!(
                            "🛡️ **{} protection status**\n\
                             • Limit: {} {action_noun}s\n\
                             • Window: {} minute(s)\n\
                             • Punishment: {}",
                            capitalize(action_noun),
                            config.threshold,
                            config.window_secs / 60,
                            config.punishment.label(),
                        ),
                    )
                    .await
                }
                None => {
                    self.respond_message(
                        ctx,
                        command,
                        &format!("{} protection is disabled.", capitalize(action_noun)),
                    )
                    .await
                }
            },
            "history" => {
                if detector.config(guild_id.get()).await.is_none() {
                    return self
                        .respond_message(
                            ctx,
                            command,
                            &format!("{} protection is disabled.", capitalize(action_noun)),
                        )
                        .await;
                }

                let now = Utc::now();
                let response = match find_user(options, "user") {
                    Some(user_id) => {
                        let (actions, total) = detector
                            .actor_history(guild_id.get(), user_id.get(), HISTORY_LIMIT, now)
                            .await;
                        if actions.is_empty() && total == 0 {
                            format!("No recorded {action_noun}s for <@{user_id}>.")
                        } else {
                            let mut out = format!(
                                "📋 **{} history for <@{}>** — {} total\n",
                                capitalize(action_noun),
                                user_id,
                                total,
                            );
                            for action in &actions {
                                out.push_str(&format!(
                                    "• <@{}> at {}\n",
                                    action.target_id,
                                    action.at.format("%Y-%m-%d %H:%M:%S UTC"),
                                ));
                            }
                            out
                        }
                    }
                    None => {
                        let history = detector.history(guild_id.get(), now).await;
                        if history.is_empty() {
                            format!("No {action_noun}s recorded yet.")
                        } else {
                            let mut out =
                                format!("📋 **{} history**\n", capitalize(action_noun));
                            for entry in history.iter().take(HISTORY_LIMIT) {
                                out.push_str(&format!(
                                    "• <@{}> — {} in window, {} total\n",
                                    entry.actor_id, entry.recent, entry.total,
                                ));
                            }
                            out
                        }
                    }
                };
                self.respond_message(ctx, command, &response).await
            }
            _ => self.respond_error(ctx, command, "Unknown subcommand.").await,
        }
    }

    async fn handle_protectionlog(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
    ) -> Result<()> {
        if !self.require_owner(ctx, command).await? {
            return Ok(());
        }
        let guild_id = command
            .guild_id
            .ok_or_else(|| WardenError::Config("Command must be used in a server".to_string()))?;

        let (subcommand, options) = subcommand_of(command);
        match subcommand {
            "set" => {
                let Some(system) = find_str(options, "system")
                    .and_then(|s| ProtectionSystem::from_str(s).ok())
                else {
                    return self
                        .respond_error(ctx, command, "Please select a protection system.")
                        .await;
                };
                let Some(channel_id) = options
                    .iter()
                    .find(|o| o.name == "channel")
                    .and_then(|o| o.value.as_channel_id())
                else {
                    return self
                        .respond_error(ctx, command, "Please select a channel.")
                        .await;
                };

                self.engine
                    .logger
                    .set_route(guild_id.get(), system, channel_id.get())
                    .await?;
                self.respond_message(
                    ctx,
                    command,
                    &format!("📋 {} logs will go to <#{}>.", system.label(), channel_id),
                )
                .await
            }
            "remove" => {
                let Some(system) = find_str(options, "system")
                    .and_then(|s| ProtectionSystem::from_str(s).ok())
                else {
                    return self
                        .respond_error(ctx, command, "Please select a protection system.")
                        .await;
                };

                if self.engine.logger.remove_route(guild_id.get(), system).await? {
                    self.respond_message(
                        ctx,
                        command,
                        &format!("📋 {} log route removed.", system.label()),
                    )
                    .await
                } else {
                    self.respond_message(
                        ctx,
                        command,
                        &format!("No log route configured for {}.", system.label()),
                    )
                    .await
                }
            }
            "list" => {
                let routes = self.engine.logger.list_routes(guild_id.get()).await?;
                if routes.is_empty() {
                    return self
                        .respond_message(ctx, command, "No log routes configured.")
                        .await;
                }

                let mut response = String::from("📋 **Protection log routes**\n");
                for route in &routes {
                    let label = ProtectionSystem::from_str(&route.system)
                        .map(|s| s.label())
                        .unwrap_or(route.system.as_str());
                    response.push_str(&format!("• {} → <#{}>\n", label, route.channel_id));
                }
                self.respond_message(ctx, command, &response).await
            }
            _ => self.respond_error(ctx, command, "Unknown subcommand.").await,
        }
    }

    async fn handle_ban(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        if !Self::has_permission(command, Permissions::BAN_MEMBERS) {
            return self
                .respond_error(ctx, command, "You need the Ban Members permission.")
                .await;
        }
        let guild_id = command
            .guild_id
            .ok_or_else(|| WardenError::Config("Command must be used in a server".to_string()))?;

        let options = &command.data.options;
        let Some(user_id) = find_user(options, "user") else {
            return self.respond_error(ctx, command, "Please specify a user.").await;
        };
        if user_id == command.user.id {
            return self.respond_error(ctx, command, "You cannot ban yourself.").await;
        }
        let reason = find_str(options, "reason").unwrap_or("No reason provided");
        let delete_days = find_i64(options, "delete-message-days").unwrap_or(0) as u8;

        match ctx
            .http
            .ban_user(guild_id, user_id, delete_days, Some(reason))
            .await
        {
            Ok(()) => {
                tracing::info!(
                    guild_id = %guild_id,
                    moderator_id = %command.user.id,
                    target_id = %user_id,
                    "Member banned via command"
                );
                self.respond_message(
                    ctx,
                    command,
                    &format!("🔨 Banned <@{user_id}>.\nReason: {reason}"),
                )
                .await
            }
            Err(e) => {
                tracing::warn!(
                    guild_id = %guild_id,
                    target_id = %user_id,
                    error = %e,
                    "Ban command rejected by platform"
                );
                self.respond_error(
                    ctx,
                    command,
                    "Could not ban that member. Check the bot's role position and permissions.",
                )
                .await
            }
        }
    }

    async fn handle_kick(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        if !Self::has_permission(command, Permissions::KICK_MEMBERS) {
            return self
                .respond_error(ctx, command, "You need the Kick Members permission.")
                .await;
        }
        let guild_id = command
            .guild_id
            .ok_or_else(|| WardenError::Config("Command must be used in a server".to_string()))?;

        let options = &command.data.options;
        let Some(user_id) = find_user(options, "user") else {
            return self.respond_error(ctx, command, "Please specify a user.").await;
        };
        if user_id == command.user.id {
            return self.respond_error(ctx, command, "You cannot kick yourself.").await;
        }
        let reason = find_str(options, "reason").unwrap_or("No reason provided");

        match ctx.http.kick_member(guild_id, user_id, Some(reason)).await {
            Ok(()) => {
                tracing::info!(
                    guild_id = %guild_id,
                    moderator_id = %command.user.id,
                    target_id = %user_id,
                    "Member kicked via command"
                );
                self.respond_message(
                    ctx,
                    command,
                    &format!("👢 Kicked <@{user_id}>.\nReason: {reason}"),
                )
                .await
            }
            Err(e) => {
                tracing::warn!(
                    guild_id = %guild_id,
                    target_id = %user_id,
                    error = %e,
                    "Kick command rejected by platform"
                );
                self.respond_error(
                    ctx,
                    command,
                    "Could not kick that member. Check the bot's role position and permissions.",
                )
                .await
            }
        }
    }

    async fn handle_mute(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        if !Self::has_permission(command, Permissions::MODERATE_MEMBERS) {
            return self
                .respond_error(ctx, command, "You need the Moderate Members permission.")
                .await;
        }
        let guild_id = command
            .guild_id
            .ok_or_else(|| WardenError::Config("Command must be used in a server".to_string()))?;

        let options = &command.data.options;
        let Some(user_id) = find_user(options, "user") else {
            return self.respond_error(ctx, command, "Please specify a user.").await;
        };
        let minutes = find_i64(options, "minutes").unwrap_or(DEFAULT_MUTE_MINUTES);
        let reason = find_str(options, "reason").unwrap_or("No reason provided");

        let until = Utc::now() + Duration::minutes(minutes);
        let builder = EditMember::new()
            .disable_communication_until(until.to_rfc3339())
            .audit_log_reason(reason);

        match guild_id.edit_member(&ctx.http, user_id, builder).await {
            Ok(_) => {
                tracing::info!(
                    guild_id = %guild_id,
                    moderator_id = %command.user.id,
                    target_id = %user_id,
                    minutes = minutes,
                    "Member muted via command"
                );
                self.respond_message(
                    ctx,
                    command,
                    &format!("🔇 Muted <@{user_id}> for {minutes} minute(s).\nReason: {reason}"),
                )
                .await
            }
            Err(e) => {
                tracing::warn!(
                    guild_id = %guild_id,
                    target_id = %user_id,
                    error = %e,
                    "Mute command rejected by platform"
                );
                self.respond_error(
                    ctx,
                    command,
                    "Could not mute that member. Check the bot's role position and permissions.",
                )
                .await
            }
        }
    }

    async fn handle_unmute(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        if !Self::has_permission(command, Permissions::MODERATE_MEMBERS) {
            return self
                .respond_error(ctx, command, "You need the Moderate Members permission.")
                .await;
        }
        let guild_id = command
            .guild_id
            .ok_or_else(|| WardenError::Config("Command must be used in a server".to_string()))?;

        let options = &command.data.options;
        let Some(user_id) = find_user(options, "user") else {
            return self.respond_error(ctx, command, "Please specify a user.").await;
        };
        let reason = find_str(options, "reason").unwrap_or("No reason provided");

        let mut member = match ctx.http.get_member(guild_id, user_id).await {
            Ok(m) => m,
            Err(_) => {
                return self
                    .respond_error(ctx, command, "That user is not a member of this server.")
                    .await;
            }
        };

        match member.enable_communication(&ctx.http).await {
            Ok(()) => {
                tracing::info!(
                    guild_id = %guild_id,
                    moderator_id = %command.user.id,
                    target_id = %user_id,
                    "Member unmuted via command"
                );
                self.respond_message(
                    ctx,
                    command,
                    &format!("🔊 Unmuted <@{user_id}>.\nReason: {reason}"),
                )
                .await
            }
            Err(e) => {
                tracing::warn!(
                    guild_id = %guild_id,
                    target_id = %user_id,
                    error = %e,
                    "Unmute command rejected by platform"
                );
                self.respond_error(ctx, command, "Could not unmute that member.")
                    .await
            }
        }
    }

    async fn handle_clear(&self, ctx: &Context, command: &CommandInteraction) -> Result<()> {
        if !Self::has_permission(command, Permissions::MANAGE_MESSAGES) {
            return self
                .respond_error(ctx, command, "You need the Manage Messages permission.")
                .await;
        }

        let options = &command.data.options;
        let count = find_i64(options, "count").unwrap_or(0).clamp(1, 100) as usize;
        let filter_user = find_user(options, "user");
        let channel_id = command.channel_id;

        // Fetch extra when filtering by author so the target count can still
        // be reached.
        let fetch_limit: u8 = if filter_user.is_some() { 100 } else { count as u8 };
        let messages = channel_id
            .messages(&ctx.http, GetMessages::new().limit(fetch_limit))
            .await
            .map_err(|e| WardenError::DiscordApi(Box::new(e)))?;

        let bulk_cutoff =
            (Utc::now() - Duration::days(BULK_DELETE_MAX_AGE_DAYS)).timestamp();
        let targets: Vec<_> = messages
            .iter()
            .filter(|m| filter_user.is_none_or(|u| m.author.id == u))
            .filter(|m| m.id.created_at().unix_timestamp() > bulk_cutoff)
            .take(count)
            .map(|m| m.id)
            .collect();

        if targets.is_empty() {
            return self
                .respond_message(
                    ctx,
                    command,
                    "No deletable messages found (bulk deletion only covers the last 14 days).",
                )
                .await;
        }

        let deleted = targets.len();
        if deleted == 1 {
            channel_id
                .delete_message(&ctx.http, targets[0])
                .await
                .map_err(|e| WardenError::DiscordApi(Box::new(e)))?;
        } else {
            channel_id
                .delete_messages(&ctx.http, targets)
                .await
                .map_err(|e| WardenError::DiscordApi(Box::new(e)))?;
        }

        tracing::info!(
            channel_id = %channel_id,
            moderator_id = %command.user.id,
            deleted = deleted,
            "Messages cleared via command"
        );
        self.respond_message(ctx, command, &format!("🧹 Deleted {deleted} message(s)."))
            .await
    }

    /// Send a response message.
    async fn respond_message(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        content: &str,
    ) -> Result<()> {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(content)
                .ephemeral(true),
        );

        match command.create_response(&ctx.http, response).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Discord may timeout or another instance may respond first
                if e.to_string().contains("already been acknowledged") {
                    Ok(())
                } else {
                    Err(WardenError::DiscordApi(Box::new(e)))
                }
            }
        }
    }

    /// Send an error response.
    async fn respond_error(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
        message: &str,
    ) -> Result<()> {
        self.respond_message(ctx, command, &format!("❌ {}", message))
            .await
    }
}

fn punishment_option(required: bool) -> CreateCommandOption {
    CreateCommandOption::new(
        CommandOptionType::String,
        "punishment",
        "What happens to a flagged moderator",
    )
    .required(required)
    .add_string_choice("Warn (log only)", "warn")
    .add_string_choice("Kick", "kick")
    .add_string_choice("Ban", "ban")
    .add_string_choice("Remove all roles", "removeall")
}

fn system_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "system", "Protection system")
        .required(true)
        .add_string_choice("Ban Protection", "banprotection")
        .add_string_choice("Kick Protection", "kickprotection")
        .add_string_choice("Anti-Raid", "antiraid")
}

/// The first subcommand name and its nested options.
fn subcommand_of(command: &CommandInteraction) -> (&str, &[CommandDataOption]) {
    match command.data.options.first() {
        Some(option) => match &option.value {
            CommandDataOptionValue::SubCommand(opts) => (option.name.as_str(), opts.as_slice()),
            _ => (option.name.as_str(), &[]),
        },
        None => ("", &[]),
    }
}

fn find_i64(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_i64())
}

fn find_str<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_str())
}

fn find_user(options: &[CommandDataOption], name: &str) -> Option<UserId> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_user_id())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
