//! Audit-log actor correlation.
//!
//! Gateway ban/kick events do not carry the acting moderator, only the
//! target. The actor is recovered by reading the guild audit log and
//! matching the freshest entry for the same target created within a short
//! correlation window. Correlation itself is pure; the resolver wraps the
//! Discord fetch around it.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serenity::http::Http;
use serenity::model::guild::audit_log::{Action, MemberAction};
use serenity::model::id::{GuildId, UserId};

use crate::error::{Result, WardenError};

/// Audit entries older than this are never matched to a gateway event.
pub const CORRELATION_WINDOW_MS: i64 = 5000;

/// Audit log writes lag behind gateway kick events; wait this long before
/// querying so the entry has a chance to land.
pub const KICK_AUDIT_DELAY: StdDuration = StdDuration::from_secs(1);

/// Which audit action to query for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditActionKind {
    BanAdd,
    BanRemove,
    Kick,
}

impl AuditActionKind {
    fn action(&self) -> Action {
        match self {
            Self::BanAdd => Action::Member(MemberAction::BanAdd),
            Self::BanRemove => Action::Member(MemberAction::BanRemove),
            Self::Kick => Action::Member(MemberAction::Kick),
        }
    }

    /// How many recent entries to fetch. Unban churn is rarer, so its
    /// lookback is shorter.
    fn fetch_limit(&self) -> u8 {
        match self {
            Self::BanAdd | Self::Kick => 5,
            Self::BanRemove => 3,
        }
    }
}

/// One audit log entry, reduced to the fields correlation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub executor_id: u64,
    pub executor_is_bot: bool,
    pub target_id: Option<u64>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The moderator recovered from the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedActor {
    pub user_id: u64,
    pub reason: Option<String>,
}

/// Outcome of correlating a gateway event with the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A human moderator performed the action.
    Actor(ResolvedActor),
    /// The freshest matching entry was written by a bot.
    Automated,
    /// No entry for this target inside the correlation window.
    NotFound,
}

/// Match a gateway event against fetched audit entries.
///
/// Entries are scanned in the given order (the platform returns newest
/// first) and the first in-window entry for the target wins.
pub fn correlate(entries: &[AuditEntry], target_id: u64, now: DateTime<Utc>) -> Resolution {
    let window = Duration::milliseconds(CORRELATION_WINDOW_MS);

    for entry in entries {
        if entry.target_id != Some(target_id) {
            continue;
        }
        let age = now - entry.created_at;
        if age > window || age < -window {
            continue;
        }
        if entry.executor_is_bot {
            return Resolution::Automated;
        }
        return Resolution::Actor(ResolvedActor {
            user_id: entry.executor_id,
            reason: entry.reason.clone(),
        });
    }

    Resolution::NotFound
}

/// Fetches audit entries and runs correlation against them.
pub struct AuditResolver {
    http: Arc<Http>,
}

impl AuditResolver {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Resolve the actor behind a gateway event for `target_id`.
    pub async fn resolve(
        &self,
        guild_id: GuildId,
        target_id: UserId,
        kind: AuditActionKind,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let logs = guild_id
            .audit_logs(
                &self.http,
                Some(kind.action()),
                None,
                None,
                Some(kind.fetch_limit()),
            )
            .await
            .map_err(|e| WardenError::DiscordApi(Box::new(e)))?;

        let entries: Vec<AuditEntry> = logs
            .entries
            .iter()
            .map(|entry| {
                let executor_is_bot = logs
                    .users
                    .get(&entry.user_id)
                    .map(|u| u.bot)
                    .unwrap_or(false);
                AuditEntry {
                    executor_id: entry.user_id.get(),
                    executor_is_bot,
                    target_id: entry.target_id.map(|t| t.get()),
                    reason: entry.reason.clone(),
                    created_at: DateTime::from_timestamp(
                        entry.id.created_at().unix_timestamp(),
                        0,
                    )
                    .unwrap_or_default(),
                }
            })
            .collect();

        Ok(correlate(&entries, target_id.get(), now))
    }
}
