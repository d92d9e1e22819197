//! Gateway event pipelines.
//!
//! `ProtectionEngine` glues the detectors, the audit resolver, the
//! punishment executor, and the protection logger together. Each handler
//! catches its own failures; one bad event never takes down the process or
//! blocks later events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serenity::http::Http;
use serenity::model::guild::Member;
use serenity::model::id::{GuildId, UserId};
use serenity::model::user::User;

use crate::abuse::{AbuseDetector, AbuseKind, Evaluation};
use crate::audit::{AuditActionKind, AuditResolver, Resolution, KICK_AUDIT_DELAY};
use crate::error::{Result, WardenError};
use crate::logs::ProtectionLogger;
use crate::punish::PunishmentExecutor;
use crate::raid::RaidDetector;

/// Audit reason used when a suspicious raid joiner is ejected.
const RAID_EJECT_REASON: &str = "Anti-raid: suspicious new account (automated protection)";

/// Owns the protection subsystems and runs the event pipelines.
pub struct ProtectionEngine {
    http: Arc<Http>,
    pub ban_detector: AbuseDetector,
    pub kick_detector: AbuseDetector,
    pub raid_detector: RaidDetector,
    resolver: AuditResolver,
    executor: PunishmentExecutor,
    pub logger: Arc<ProtectionLogger>,
    bot_user_id: AtomicU64,
}

impl ProtectionEngine {
    pub fn new(http: Arc<Http>, logger: Arc<ProtectionLogger>) -> Result<Self> {
        Ok(Self {
            resolver: AuditResolver::new(Arc::clone(&http)),
            executor: PunishmentExecutor::new(Arc::clone(&http)),
            ban_detector: AbuseDetector::new(AbuseKind::Ban),
            kick_detector: AbuseDetector::new(AbuseKind::Kick),
            raid_detector: RaidDetector::new()?,
            logger,
            http,
            bot_user_id: AtomicU64::new(0),
        })
    }

    /// Record our own user id once the gateway session is ready.
    pub fn set_bot_user_id(&self, user_id: UserId) {
        self.bot_user_id.store(user_id.get(), Ordering::Relaxed);
    }

    fn is_self(&self, user_id: UserId) -> bool {
        self.bot_user_id.load(Ordering::Relaxed) == user_id.get()
    }

    /// A member was banned. Recover the acting moderator from the audit log
    /// and feed the ban-abuse detector.
    pub async fn on_ban_added(&self, guild_id: GuildId, target: &User) {
        if self.is_self(target.id) {
            return;
        }

        if let Err(e) = self.handle_ban_added(guild_id, target).await {
            tracing::error!(
                guild_id = %guild_id,
                target_id = %target.id,
                error = %e,
                "Ban pipeline failed"
            );
        }
    }

    async fn handle_ban_added(&self, guild_id: GuildId, target: &User) -> Result<()> {
        let now = Utc::now();
        let resolution = self
            .resolver
            .resolve(guild_id, target.id, AuditActionKind::BanAdd, now)
            .await?;

        let actor = match resolution {
            Resolution::Actor(actor) => actor,
            Resolution::Automated => {
                tracing::debug!(
                    guild_id = %guild_id,
                    target_id = %target.id,
                    "Ban executed by a bot, not tracked"
                );
                return Ok(());
            }
            Resolution::NotFound => {
                tracing::warn!(
                    guild_id = %guild_id,
                    target_id = %target.id,
                    "No audit entry matched the ban"
                );
                return Ok(());
            }
        };

        self.logger
            .log_ban_action(
                guild_id.get(),
                actor.user_id,
                target.id.get(),
                false,
                actor.reason.as_deref(),
            )
            .await;

        let owner_id = self.guild_owner(guild_id).await?;
        let eval = self
            .ban_detector
            .record_and_evaluate(guild_id.get(), actor.user_id, target.id.get(), owner_id, now)
            .await;

        self.punish_if_violated(guild_id, owner_id, actor.user_id, AbuseKind::Ban, eval)
            .await;
        Ok(())
    }

    /// A ban was lifted. Informational logging only.
    pub async fn on_ban_removed(&self, guild_id: GuildId, target: &User) {
        if let Err(e) = self.handle_ban_removed(guild_id, target).await {
            tracing::error!(
                guild_id = %guild_id,
                target_id = %target.id,
                error = %e,
                "Unban pipeline failed"
            );
        }
    }

    async fn handle_ban_removed(&self, guild_id: GuildId, target: &User) -> Result<()> {
        let now = Utc::now();
        let resolution = self
            .resolver
            .resolve(guild_id, target.id, AuditActionKind::BanRemove, now)
            .await?;

        if let Resolution::Actor(actor) = resolution {
            self.logger
                .log_ban_action(
                    guild_id.get(),
                    actor.user_id,
                    target.id.get(),
                    true,
                    actor.reason.as_deref(),
                )
                .await;
        }
        Ok(())
    }

    /// A member left or was removed. Always clears them from the raid join
    /// window, then checks the audit log to distinguish a kick from a
    /// voluntary leave and feeds the kick-abuse detector.
    pub async fn on_member_removed(&self, guild_id: GuildId, user: &User) {
        if user.bot {
            return;
        }

        self.raid_detector
            .record_leave(guild_id.get(), user.id.get())
            .await;

        // Audit writes trail the gateway event; give the entry time to land.
        tokio::time::sleep(KICK_AUDIT_DELAY).await;

        if let Err(e) = self.handle_member_removed(guild_id, user).await {
            tracing::error!(
                guild_id = %guild_id,
                target_id = %user.id,
                error = %e,
                "Kick pipeline failed"
            );
        }
    }

    async fn handle_member_removed(&self, guild_id: GuildId, user: &User) -> Result<()> {
        let now = Utc::now();
        let resolution = self
            .resolver
            .resolve(guild_id, user.id, AuditActionKind::Kick, now)
            .await?;

        // No matching kick entry means a voluntary leave or an expired ban.
        let actor = match resolution {
            Resolution::Actor(actor) => actor,
            Resolution::Automated | Resolution::NotFound => return Ok(()),
        };

        self.logger
            .log_kick_action(
                guild_id.get(),
                actor.user_id,
                user.id.get(),
                actor.reason.as_deref(),
            )
            .await;

        let owner_id = self.guild_owner(guild_id).await?;
        let eval = self
            .kick_detector
            .record_and_evaluate(guild_id.get(), actor.user_id, user.id.get(), owner_id, now)
            .await;

        self.punish_if_violated(guild_id, owner_id, actor.user_id, AbuseKind::Kick, eval)
            .await;
        Ok(())
    }

    /// A member joined. Feeds the raid detector and, while the join rate is
    /// at raid level, reviews the most recent joiners for suspicious
    /// accounts.
    pub async fn on_member_joined(&self, member: &Member) {
        let guild_id = member.guild_id;
        let now = Utc::now();

        let outcome = self
            .raid_detector
            .record_join(
                guild_id.get(),
                member.user.id.get(),
                &member.user.name,
                now,
            )
            .await;

        let Some(outcome) = outcome else {
            return;
        };

        if let Some(alert) = &outcome.alert {
            self.logger.log_raid_alert(guild_id.get(), alert).await;
        }

        for candidate in &outcome.review {
            if let Err(e) = self
                .review_joiner(guild_id, UserId::new(candidate.user_id), now)
                .await
            {
                tracing::warn!(
                    guild_id = %guild_id,
                    user_id = candidate.user_id,
                    error = %e,
                    "Joiner review failed"
                );
            }
        }
    }

    async fn review_joiner(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let user = self
            .http
            .get_user(user_id)
            .await
            .map_err(|e| WardenError::DiscordApi(Box::new(e)))?;

        if user.bot {
            return Ok(());
        }

        let created_at = DateTime::from_timestamp(user.id.created_at().unix_timestamp(), 0)
            .unwrap_or_default();
        let signals = self
            .raid_detector
            .signals(&user.name, created_at, user.avatar.is_some(), now);

        if !signals.suspicious() {
            return Ok(());
        }

        tracing::warn!(
            guild_id = %guild_id,
            user_id = %user_id,
            username = %user.name,
            signals = %signals.describe(),
            score = signals.score(),
            "Suspicious account joined during review"
        );

        let eject = self.raid_detector.should_eject(&signals, created_at, now);
        let mut ejected = false;
        if eject {
            match self
                .http
                .kick_member(guild_id, user_id, Some(RAID_EJECT_REASON))
                .await
            {
                Ok(()) => {
                    ejected = true;
                    tracing::info!(
                        guild_id = %guild_id,
                        user_id = %user_id,
                        "Suspicious joiner ejected"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        guild_id = %guild_id,
                        user_id = %user_id,
                        error = %e,
                        "Could not eject suspicious joiner"
                    );
                }
            }
        }

        self.logger
            .log_suspicious_join(guild_id.get(), user_id.get(), &signals.describe(), ejected)
            .await;
        Ok(())
    }

    async fn punish_if_violated(
        &self,
        guild_id: GuildId,
        owner_id: u64,
        actor_id: u64,
        kind: AbuseKind,
        eval: Evaluation,
    ) {
        let Some(punishment) = eval.punishment.filter(|_| eval.violated) else {
            return;
        };

        let window_secs = match kind {
            AbuseKind::Ban => self.ban_detector.config(guild_id.get()).await,
            AbuseKind::Kick => self.kick_detector.config(guild_id.get()).await,
        }
        .map(|c| c.window_secs)
        .unwrap_or(0);

        let outcome = self
            .executor
            .apply(
                guild_id,
                UserId::new(owner_id),
                UserId::new(actor_id),
                punishment,
            )
            .await;

        match kind {
            AbuseKind::Ban => {
                self.logger
                    .log_ban_abuse(
                        guild_id.get(),
                        actor_id,
                        eval.count,
                        window_secs,
                        punishment,
                        outcome.applied,
                    )
                    .await;
            }
            AbuseKind::Kick => {
                self.logger
                    .log_kick_abuse(
                        guild_id.get(),
                        actor_id,
                        eval.count,
                        window_secs,
                        punishment,
                        outcome.applied,
                    )
                    .await;
            }
        }
    }

    /// Fetch the guild owner for exemption checks.
    async fn guild_owner(&self, guild_id: GuildId) -> Result<u64> {
        let guild = self
            .http
            .get_guild(guild_id)
            .await
            .map_err(|e| WardenError::DiscordApi(Box::new(e)))?;
        Ok(guild.owner_id.get())
    }
}
