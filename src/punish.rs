//! Automated punishment execution.
//!
//! Applies the configured punishment to a flagged moderator. All platform
//! failures are caught here and reported as an unsuccessful outcome; the
//! detectors never retry.

use std::str::FromStr;
use std::sync::Arc;

use serenity::http::Http;
use serenity::model::id::{GuildId, RoleId, UserId};

/// Punishment applied when an abuse threshold is crossed.
///
/// A closed enum so an unhandled punishment can never reach the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punishment {
    /// Log and alert only, no platform mutation.
    Warn,
    /// Remove membership.
    Kick,
    /// Remove membership permanently.
    Ban,
    /// Strip every role except the implicit @everyone role.
    RemoveAllRoles,
}

impl Punishment {
    /// Stable identifier used in command options and log records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Kick => "kick",
            Self::Ban => "ban",
            Self::RemoveAllRoles => "removeall",
        }
    }

    /// Human-readable label for status and alert messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Warn => "Warn (log only)",
            Self::Kick => "Kick (remove from server)",
            Self::Ban => "Ban (permanent removal)",
            Self::RemoveAllRoles => "Remove all roles",
        }
    }
}

impl FromStr for Punishment {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "warn" => Ok(Self::Warn),
            "kick" => Ok(Self::Kick),
            "ban" => Ok(Self::Ban),
            "removeall" => Ok(Self::RemoveAllRoles),
            _ => Err(()),
        }
    }
}

/// Outcome of a punishment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PunishmentOutcome {
    /// Whether the punishment was applied.
    pub applied: bool,
    /// Roles actually removed (only meaningful for RemoveAllRoles).
    pub roles_removed: u32,
}

impl PunishmentOutcome {
    fn skipped() -> Self {
        Self {
            applied: false,
            roles_removed: 0,
        }
    }

    fn applied() -> Self {
        Self {
            applied: true,
            roles_removed: 0,
        }
    }
}

/// Roles eligible for removal: everything except the guild's implicit
/// @everyone role, whose id equals the guild id.
pub fn removable_roles(roles: &[RoleId], guild_id: GuildId) -> Vec<RoleId> {
    roles
        .iter()
        .copied()
        .filter(|r| r.get() != guild_id.get())
        .collect()
}

/// Fold per-role removal results into an outcome. The punishment counts as
/// applied even when some removals failed; the count reports only the roles
/// that actually came off.
fn role_removal_outcome(results: &[bool]) -> PunishmentOutcome {
    PunishmentOutcome {
        applied: true,
        roles_removed: results.iter().filter(|ok| **ok).count() as u32,
    }
}

/// Applies punishments against the Discord API.
pub struct PunishmentExecutor {
    http: Arc<Http>,
}

const BAN_ABUSE_REASON: &str = "Abuse protection: too many moderation actions in a short window";

impl PunishmentExecutor {
    /// Create a new executor.
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Apply a punishment to a flagged actor.
    ///
    /// Guards, in order: the actor must still be a resolvable guild member,
    /// and must not be the guild owner. Owners are never auto-punished.
    /// Failures are logged and reported as unsuccessful; nothing is retried.
    pub async fn apply(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
        actor_id: UserId,
        punishment: Punishment,
    ) -> PunishmentOutcome {
        let member = match self.http.get_member(guild_id, actor_id).await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    guild_id = %guild_id,
                    actor_id = %actor_id,
                    error = %e,
                    "Punishment skipped: actor is not a resolvable member"
                );
                return PunishmentOutcome::skipped();
            }
        };

        if actor_id == owner_id {
            tracing::info!(
                guild_id = %guild_id,
                actor_id = %actor_id,
                "Punishment skipped: guild owner is exempt"
            );
            return PunishmentOutcome::skipped();
        }

        match punishment {
            Punishment::Warn => {
                tracing::warn!(
                    guild_id = %guild_id,
                    actor_id = %actor_id,
                    "Abuse warning issued"
                );
                PunishmentOutcome::applied()
            }
            Punishment::Kick => {
                match self
                    .http
                    .kick_member(guild_id, actor_id, Some(BAN_ABUSE_REASON))
                    .await
                {
                    Ok(()) => {
                        tracing::info!(
                            guild_id = %guild_id,
                            actor_id = %actor_id,
                            "Abuse punishment applied: kick"
                        );
                        PunishmentOutcome::applied()
                    }
                    Err(e) => {
                        tracing::warn!(
                            guild_id = %guild_id,
                            actor_id = %actor_id,
                            error = %e,
                            "Abuse kick rejected by platform"
                        );
                        PunishmentOutcome::skipped()
                    }
                }
            }
            Punishment::Ban => {
                match self
                    .http
                    .ban_user(guild_id, actor_id, 0, Some(BAN_ABUSE_REASON))
                    .await
                {
                    Ok(()) => {
                        tracing::info!(
                            guild_id = %guild_id,
                            actor_id = %actor_id,
                            "Abuse punishment applied: ban"
                        );
                        PunishmentOutcome::applied()
                    }
                    Err(e) => {
                        tracing::warn!(
                            guild_id = %guild_id,
                            actor_id = %actor_id,
                            error = %e,
                            "Abuse ban rejected by platform"
                        );
                        PunishmentOutcome::skipped()
                    }
                }
            }
            Punishment::RemoveAllRoles => {
                let targets = removable_roles(&member.roles, guild_id);
                let mut results = Vec::with_capacity(targets.len());

                // Partial failures are tolerated; the loop always completes.
                for role_id in targets {
                    match self
                        .http
                        .remove_member_role(guild_id, actor_id, role_id, Some(BAN_ABUSE_REASON))
                        .await
                    {
                        Ok(()) => results.push(true),
                        Err(e) => {
                            results.push(false);
                            tracing::warn!(
                                guild_id = %guild_id,
                                actor_id = %actor_id,
                                role_id = %role_id,
                                error = %e,
                                "Failed to remove role"
                            );
                        }
                    }
                }

                let outcome = role_removal_outcome(&results);
                tracing::info!(
                    guild_id = %guild_id,
                    actor_id = %actor_id,
                    removed = outcome.roles_removed,
                    failed = results.len() as u32 - outcome.roles_removed,
                    "Abuse punishment applied: all roles removed"
                );
                outcome
            }
        }
    }
}
