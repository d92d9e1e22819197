//! Protection log routing and formatting.
//!
//! Each protection system can be routed to a guild channel. Routes persist
//! in the database and are cached in memory; log delivery failures are
//! logged and swallowed so a broken route never blocks detection.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use serenity::http::Http;
use serenity::model::id::ChannelId;

use crate::database::{Database, LogChannelRoute};
use crate::error::Result;
use crate::punish::Punishment;
use crate::raid::RaidAlert;

/// The three protection systems that can be routed to a log channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtectionSystem {
    BanProtection,
    KickProtection,
    AntiRaid,
}

impl ProtectionSystem {
    /// Stable identifier used in command options and database rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BanProtection => "banprotection",
            Self::KickProtection => "kickprotection",
            Self::AntiRaid => "antiraid",
        }
    }

    /// Display label for list output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::BanProtection => "Ban Protection",
            Self::KickProtection => "Kick Protection",
            Self::AntiRaid => "Anti-Raid",
        }
    }

    pub fn all() -> [ProtectionSystem; 3] {
        [Self::BanProtection, Self::KickProtection, Self::AntiRaid]
    }
}

impl FromStr for ProtectionSystem {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "banprotection" => Ok(Self::BanProtection),
            "kickprotection" => Ok(Self::KickProtection),
            "antiraid" => Ok(Self::AntiRaid),
            _ => Err(()),
        }
    }
}

/// Routes protection events to their configured guild channels.
pub struct ProtectionLogger {
    http: Arc<Http>,
    db: Database,
    /// (guild_id, system) -> channel_id read-through cache.
    routes: DashMap<(u64, ProtectionSystem), u64>,
}

impl ProtectionLogger {
    pub fn new(http: Arc<Http>, db: Database) -> Self {
        Self {
            http,
            db,
            routes: DashMap::new(),
        }
    }

    /// Route a protection system to a channel.
    pub async fn set_route(
        &self,
        guild_id: u64,
        system: ProtectionSystem,
        channel_id: u64,
    ) -> Result<()> {
        self.db
            .set_log_channel(guild_id, system.as_str(), channel_id)
            .await?;
        self.routes.insert((guild_id, system), channel_id);

        tracing::info!(
            guild_id = guild_id,
            system = system.as_str(),
            channel_id = channel_id,
            "Protection log route set"
        );
        Ok(())
    }

    /// Remove a route. Returns false when none was configured.
    pub async fn remove_route(&self, guild_id: u64, system: ProtectionSystem) -> Result<bool> {
        let removed = self.db.remove_log_channel(guild_id, system.as_str()).await?;
        self.routes.remove(&(guild_id, system));

        if removed {
            tracing::info!(
                guild_id = guild_id,
                system = system.as_str(),
                "Protection log route removed"
            );
        }
        Ok(removed)
    }

    /// All routes configured for a guild.
    pub async fn list_routes(&self, guild_id: u64) -> Result<Vec<LogChannelRoute>> {
        self.db.list_log_channels(guild_id).await
    }

    /// Resolve the channel for a system, reading through to the database on
    /// a cache miss.
    pub async fn channel_for(&self, guild_id: u64, system: ProtectionSystem) -> Option<u64> {
        if let Some(channel) = self.routes.get(&(guild_id, system)) {
            return Some(*channel);
        }

        match self.db.get_log_channel(guild_id, system.as_str()).await {
            Ok(Some(channel)) => {
                self.routes.insert((guild_id, system), channel);
                Some(channel)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    guild_id = guild_id,
                    system = system.as_str(),
                    error = %e,
                    "Failed to read log route"
                );
                None
            }
        }
    }

    /// A moderator banned or unbanned someone (informational line).
    pub async fn log_ban_action(
        &self,
        guild_id: u64,
        actor_id: u64,
        target_id: u64,
        unban: bool,
        reason: Option<&str>,
    ) {
        let verb = if unban { "unbanned" } else { "banned" };
        let content = format!(
            "🔨 **Ban log** — <@{actor_id}> {verb} <@{target_id}>\nReason: {}",
            reason.unwrap_or("No reason provided")
        );
        self.deliver(guild_id, ProtectionSystem::BanProtection, content)
            .await;
    }

    /// A moderator kicked someone (informational line).
    pub async fn log_kick_action(
        &self,
        guild_id: u64,
        actor_id: u64,
        target_id: u64,
        reason: Option<&str>,
    ) {
        let content = format!(
            "👢 **Kick log** — <@{actor_id}> kicked <@{target_id}>\nReason: {}",
            reason.unwrap_or("No reason provided")
        );
        self.deliver(guild_id, ProtectionSystem::KickProtection, content)
            .await;
    }

    /// A moderator crossed the ban-abuse threshold.
    pub async fn log_ban_abuse(
        &self,
        guild_id: u64,
        actor_id: u64,
        count: u32,
        window_secs: u64,
        punishment: Punishment,
        applied: bool,
    ) {
        let content = format!(
            "🚨 **Ban abuse detected** — <@{actor_id}> issued {count} bans in {}\n\
             Punishment: {} — {}",
            format_window(window_secs),
            punishment.label(),
            if applied { "applied" } else { "could not be applied" },
        );
        self.deliver(guild_id, ProtectionSystem::BanProtection, content)
            .await;
    }

    /// A moderator crossed the kick-abuse threshold.
    pub async fn log_kick_abuse(
        &self,
        guild_id: u64,
        actor_id: u64,
        count: u32,
        window_secs: u64,
        punishment: Punishment,
        applied: bool,
    ) {
        let content = format!(
            "🚨 **Kick abuse detected** — <@{actor_id}> issued {count} kicks in {}\n\
             Punishment: {} — {}",
            format_window(window_secs),
            punishment.label(),
            if applied { "applied" } else { "could not be applied" },
        );
        self.deliver(guild_id, ProtectionSystem::KickProtection, content)
            .await;
    }

    /// The join rate crossed the raid threshold.
    pub async fn log_raid_alert(&self, guild_id: u64, alert: &RaidAlert) {
        let mut content = format!(
            "⚠️ **Possible raid** — {} members joined within {} (limit: {})\n\
             Recent joiners:\n",
            alert.join_count,
            format_window(alert.window_secs),
            alert.user_limit,
        );
        for joiner in &alert.recent_joiners {
            content.push_str(&format!("• {} (<@{}>)\n", joiner.username, joiner.user_id));
        }
        content.push_str("Suspicious new accounts are reviewed automatically.");
        self.deliver(guild_id, ProtectionSystem::AntiRaid, content)
            .await;
    }

    /// A suspicious joiner was flagged or ejected during raid review.
    pub async fn log_suspicious_join(
        &self,
        guild_id: u64,
        user_id: u64,
        signals: &str,
        ejected: bool,
    ) {
        let action = if ejected {
            "kicked automatically"
        } else {
            "flagged for review"
        };
        let content =
            format!("🔍 **Suspicious account** — <@{user_id}> {action}\nSignals: {signals}");
        self.deliver(guild_id, ProtectionSystem::AntiRaid, content)
            .await;
    }

    async fn deliver(&self, guild_id: u64, system: ProtectionSystem, content: String) {
        let Some(channel_id) = self.channel_for(guild_id, system).await else {
            return;
        };

        let body = serde_json::json!({ "content": content });
        if let Err(e) = self
            .http
            .send_message(ChannelId::new(channel_id), vec![], &body)
            .await
        {
            tracing::warn!(
                guild_id = guild_id,
                system = system.as_str(),
                channel_id = channel_id,
                error = %e,
                "Failed to deliver protection log"
            );
        }
    }
}

/// Format a window length for log lines: "90s" below two minutes,
/// whole minutes otherwise.
fn format_window(window_secs: u64) -> String {
    if window_secs < 120 {
        format!("{window_secs}s")
    } else {
        format!("{} minutes", window_secs / 60)
    }
}

#[cfg(test)]
mod tests {
    use crate::logs::{format_window, ProtectionSystem};

    #[test]
    fn system_round_trips_through_str() {
        for system in ProtectionSystem::all() {
            assert_eq!(system.as_str().parse::<ProtectionSystem>(), Ok(system));
        }
    }

    #[test]
    fn unknown_system_string_is_rejected() {
        assert!("spamprotection".parse::<ProtectionSystem>().is_err());
        assert!("".parse::<ProtectionSystem>().is_err());
    }

    #[test]
    fn window_formatting() {
        assert_eq!(format_window(30), "30s");
        assert_eq!(format_window(119), "119s");
        assert_eq!(format_window(120), "2 minutes");
        assert_eq!(format_window(600), "10 minutes");
    }
}
