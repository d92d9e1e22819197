//! Anti-raid join monitoring.
//!
//! Tracks member joins per guild in a sliding window. Crossing the join
//! threshold raises a rate-limited alert; independently of the alert, the
//! most recent joiners are sampled for account-level suspicion signals and
//! freshly created suspicious accounts can be ejected automatically.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::window::RateWindow;

/// Minimum time between raid alerts for one guild.
pub const ALERT_COOLDOWN_SECS: i64 = 300;

/// How many of the most recent joiners get a suspicion review per join.
pub const REVIEW_SAMPLE: usize = 3;

/// Accounts younger than this are considered new.
const NEW_ACCOUNT_DAYS: i64 = 7;

/// Auto-ejection additionally requires the account to be this young.
const EJECT_MAX_AGE_HOURS: i64 = 24;

/// Per-guild anti-raid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaidConfig {
    /// Joins within the window that trigger an alert.
    pub user_limit: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

/// One joining member, as recorded in the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joiner {
    pub user_id: u64,
    pub username: String,
}

/// Alert raised when the join threshold is crossed and the cooldown allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaidAlert {
    pub join_count: u32,
    pub user_limit: u32,
    pub window_secs: u64,
    /// The most recent joiners, up to the configured limit, oldest first.
    pub recent_joiners: Vec<Joiner>,
}

/// A joiner selected for suspicion review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewCandidate {
    pub user_id: u64,
    pub username: String,
}

/// Result of recording one join in an enabled guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaidOutcome {
    /// Set when the threshold was crossed and the alert cooldown had lapsed.
    pub alert: Option<RaidAlert>,
    /// Most recent joiners (oldest first) to run heuristics against.
    pub review: Vec<ReviewCandidate>,
    /// Current in-window join count.
    pub join_count: u32,
}

/// Status snapshot for the config command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaidStatus {
    pub config: RaidConfig,
    pub recent_joins: u32,
}

/// Account-level suspicion signals for a joining member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspicionSignals {
    /// Account created less than a week ago.
    pub new_account: bool,
    /// No custom avatar set.
    pub default_avatar: bool,
    /// Username contains a run of three or more digits.
    pub digit_run_name: bool,
}

impl SuspicionSignals {
    /// Number of signals present. Two or more marks the account suspicious.
    pub fn score(&self) -> u32 {
        u32::from(self.new_account)
            + u32::from(self.default_avatar)
            + u32::from(self.digit_run_name)
    }

    pub fn suspicious(&self) -> bool {
        self.score() >= 2
    }

    /// Short description of the signals present, for log lines.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.new_account {
            parts.push("new account");
        }
        if self.default_avatar {
            parts.push("default avatar");
        }
        if self.digit_run_name {
            parts.push("digit-run username");
        }
        parts.join(", ")
    }
}

struct GuildState {
    config: RaidConfig,
    joins: RateWindow<Joiner>,
    last_alert: Option<DateTime<Utc>>,
}

impl GuildState {
    fn new(config: RaidConfig) -> Self {
        Self {
            config,
            joins: RateWindow::new(),
            last_alert: None,
        }
    }
}

/// Sliding-window join-rate detector with account heuristics.
pub struct RaidDetector {
    guilds: RwLock<HashMap<u64, GuildState>>,
    digit_run: Regex,
}

impl RaidDetector {
    pub fn new() -> Result<Self> {
        Ok(Self {
            guilds: RwLock::new(HashMap::new()),
            digit_run: Regex::new(r"\d{3,}")?,
        })
    }

    /// Enable protection for a guild, resetting any prior join history.
    pub async fn enable(&self, guild_id: u64, config: RaidConfig) {
        let mut guilds = self.guilds.write().await;
        guilds.insert(guild_id, GuildState::new(config));

        tracing::info!(
            guild_id = guild_id,
            user_limit = config.user_limit,
            window_secs = config.window_secs,
            "Anti-raid protection enabled"
        );
    }

    /// Disable protection and drop all state. Returns false when protection
    /// was not enabled.
    pub async fn disable(&self, guild_id: u64) -> bool {
        let removed = self.guilds.write().await.remove(&guild_id).is_some();
        if removed {
            tracing::info!(guild_id = guild_id, "Anti-raid protection disabled");
        }
        removed
    }

    /// Current configuration and in-window join count.
    pub async fn status(&self, guild_id: u64, now: DateTime<Utc>) -> Option<RaidStatus> {
        let mut guilds = self.guilds.write().await;
        let state = guilds.get_mut(&guild_id)?;
        let recent = state.joins.prune_and_count(now, state.config.window_secs) as u32;
        Some(RaidStatus {
            config: state.config,
            recent_joins: recent,
        })
    }

    /// Record a join. Returns None when protection is disabled for the guild.
    ///
    /// The review sample is populated only while the join count sits at or
    /// above the raid threshold; ordinary joins are never heuristically
    /// reviewed. The sample survives the alert cooldown so later joins in
    /// the same burst still get reviewed.
    pub async fn record_join(
        &self,
        guild_id: u64,
        user_id: u64,
        username: &str,
        now: DateTime<Utc>,
    ) -> Option<RaidOutcome> {
        let mut guilds = self.guilds.write().await;
        let state = guilds.get_mut(&guild_id)?;

        state.joins.record(
            now,
            Joiner {
                user_id,
                username: username.to_string(),
            },
        );
        let count = state.joins.prune_and_count(now, state.config.window_secs) as u32;

        let alert = if count >= state.config.user_limit {
            let cooled_down = match state.last_alert {
                Some(last) => now - last > Duration::seconds(ALERT_COOLDOWN_SECS),
                None => true,
            };
            if cooled_down {
                state.last_alert = Some(now);
                tracing::warn!(
                    guild_id = guild_id,
                    join_count = count,
                    user_limit = state.config.user_limit,
                    window_secs = state.config.window_secs,
                    "Join rate crossed raid threshold"
                );
                let recent_joiners = state
                    .joins
                    .last_n(state.config.user_limit as usize)
                    .into_iter()
                    .map(|e| e.data.clone())
                    .collect();
                Some(RaidAlert {
                    join_count: count,
                    user_limit: state.config.user_limit,
                    window_secs: state.config.window_secs,
                    recent_joiners,
                })
            } else {
                None
            }
        } else {
            None
        };

        let review = if count >= state.config.user_limit {
            state
                .joins
                .last_n(REVIEW_SAMPLE)
                .into_iter()
                .map(|e| ReviewCandidate {
                    user_id: e.data.user_id,
                    username: e.data.username.clone(),
                })
                .collect()
        } else {
            Vec::new()
        };

        Some(RaidOutcome {
            alert,
            review,
            join_count: count,
        })
    }

    /// Drop a departed member from the join window so they cannot keep
    /// inflating the count after leaving.
    pub async fn record_leave(&self, guild_id: u64, user_id: u64) {
        let mut guilds = self.guilds.write().await;
        if let Some(state) = guilds.get_mut(&guild_id) {
            state.joins.retain(|e| e.data.user_id != user_id);
        }
    }

    /// Evaluate account-level suspicion signals for a joining member.
    pub fn signals(
        &self,
        username: &str,
        account_created_at: DateTime<Utc>,
        has_avatar: bool,
        now: DateTime<Utc>,
    ) -> SuspicionSignals {
        SuspicionSignals {
            new_account: now - account_created_at < Duration::days(NEW_ACCOUNT_DAYS),
            default_avatar: !has_avatar,
            digit_run_name: self.digit_run.is_match(username),
        }
    }

    /// Whether a suspicious account qualifies for automatic ejection:
    /// suspicious and created within the last day.
    pub fn should_eject(
        &self,
        signals: &SuspicionSignals,
        account_created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        signals.suspicious()
            && now - account_created_at < Duration::hours(EJECT_MAX_AGE_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::raid::{
        RaidConfig, RaidDetector, SuspicionSignals, ALERT_COOLDOWN_SECS, REVIEW_SAMPLE,
    };

    fn detector() -> RaidDetector {
        RaidDetector::new().expect("valid pattern")
    }

    fn config(user_limit: u32, window_secs: u64) -> RaidConfig {
        RaidConfig {
            user_limit,
            window_secs,
        }
    }

    #[tokio::test]
    async fn disabled_guild_returns_none() {
        let d = detector();
        let outcome = d.record_join(100, 1, "alice", Utc::now()).await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn alert_fires_at_threshold() {
        let d = detector();
        d.enable(100, config(3, 60)).await;
        let now = Utc::now();

        for i in 0..2 {
            let outcome = d
                .record_join(100, i, &format!("user{i}"), now)
                .await
                .expect("enabled");
            assert!(outcome.alert.is_none());
        }

        let outcome = d.record_join(100, 2, "user2", now).await.expect("enabled");
        let alert = outcome.alert.expect("threshold crossed");
        assert_eq!(alert.join_count, 3);
        assert_eq!(alert.user_limit, 3);
        let names: Vec<&str> = alert
            .recent_joiners
            .iter()
            .map(|j| j.username.as_str())
            .collect();
        assert_eq!(names, vec!["user0", "user1", "user2"]);
    }

    #[tokio::test]
    async fn alert_is_rate_limited() {
        let d = detector();
        d.enable(100, config(2, 600)).await;
        let now = Utc::now();

        d.record_join(100, 1, "a", now).await;
        let first = d.record_join(100, 2, "b", now).await.expect("enabled");
        assert!(first.alert.is_some());

        // Still over threshold, but within the cooldown.
        let muted = d.record_join(100, 3, "c", now).await.expect("enabled");
        assert!(muted.alert.is_none());

        // After the cooldown the next over-threshold join alerts again.
        let later = now + Duration::seconds(ALERT_COOLDOWN_SECS + 1);
        let again = d.record_join(100, 4, "d", later).await.expect("enabled");
        assert!(again.alert.is_some());
    }

    #[tokio::test]
    async fn joins_age_out_of_window() {
        let d = detector();
        d.enable(100, config(3, 30)).await;
        let start = Utc::now();

        d.record_join(100, 1, "a", start).await;
        d.record_join(100, 2, "b", start).await;

        let later = start + Duration::seconds(60);
        let outcome = d.record_join(100, 3, "c", later).await.expect("enabled");
        assert!(outcome.alert.is_none());
        assert_eq!(outcome.join_count, 1);
    }

    #[tokio::test]
    async fn review_sample_is_most_recent_joiners() {
        let d = detector();
        d.enable(100, config(4, 600)).await;
        let now = Utc::now();

        for i in 0..5u64 {
            d.record_join(100, i, &format!("user{i}"), now).await;
        }
        let outcome = d.record_join(100, 5, "user5", now).await.expect("enabled");

        assert_eq!(outcome.review.len(), REVIEW_SAMPLE);
        let ids: Vec<u64> = outcome.review.iter().map(|c| c.user_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn review_requires_raid_threshold() {
        let d = detector();
        d.enable(100, config(5, 30)).await;
        let now = Utc::now();

        // A lone join, even from a suspicious-looking account, is not
        // reviewed while the guild is below the raid threshold.
        let outcome = d
            .record_join(100, 1, "user12345", now)
            .await
            .expect("enabled");
        assert!(outcome.alert.is_none());
        assert!(outcome.review.is_empty());
    }

    #[tokio::test]
    async fn review_continues_while_alert_is_cooling_down() {
        let d = detector();
        d.enable(100, config(5, 30)).await;
        let now = Utc::now();

        for i in 0..4u64 {
            d.record_join(100, i, &format!("user{i}"), now).await;
        }
        let fifth = d.record_join(100, 4, "user4", now).await.expect("enabled");
        assert!(fifth.alert.is_some());

        // The sixth join is muted by the cooldown but still produces the
        // review sample of the latest joiners.
        let sixth = d.record_join(100, 5, "user5", now).await.expect("enabled");
        assert!(sixth.alert.is_none());
        let ids: Vec<u64> = sixth.review.iter().map(|c| c.user_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn leave_removes_member_from_window() {
        let d = detector();
        d.enable(100, config(3, 600)).await;
        let now = Utc::now();

        d.record_join(100, 1, "a", now).await;
        d.record_join(100, 2, "b", now).await;
        d.record_leave(100, 1).await;

        let outcome = d.record_join(100, 3, "c", now).await.expect("enabled");
        assert!(outcome.alert.is_none());
        assert_eq!(outcome.join_count, 2);
    }

    #[tokio::test]
    async fn status_reports_config_and_recent_joins() {
        let d = detector();
        assert!(d.status(100, Utc::now()).await.is_none());

        d.enable(100, config(5, 30)).await;
        let now = Utc::now();
        d.record_join(100, 1, "a", now).await;

        let status = d.status(100, now).await.expect("enabled");
        assert_eq!(status.config.user_limit, 5);
        assert_eq!(status.recent_joins, 1);
    }

    #[tokio::test]
    async fn disable_reports_prior_state() {
        let d = detector();
        assert!(!d.disable(100).await);
        d.enable(100, config(5, 30)).await;
        assert!(d.disable(100).await);
    }

    #[test]
    fn signals_detect_new_account() {
        let d = detector();
        let now = Utc::now();

        let fresh = d.signals("alice", now - Duration::days(2), true, now);
        assert!(fresh.new_account);

        let old = d.signals("alice", now - Duration::days(30), true, now);
        assert!(!old.new_account);
    }

    #[test]
    fn signals_detect_digit_run() {
        let d = detector();
        let now = Utc::now();
        let created = now - Duration::days(30);

        assert!(d.signals("user123456", created, true, now).digit_run_name);
        assert!(d.signals("abc999def", created, true, now).digit_run_name);
        assert!(!d.signals("user12", created, true, now).digit_run_name);
        assert!(!d.signals("alice", created, true, now).digit_run_name);
    }

    #[test]
    fn two_signals_mark_suspicious() {
        let one = SuspicionSignals {
            new_account: true,
            default_avatar: false,
            digit_run_name: false,
        };
        assert!(!one.suspicious());

        let two = SuspicionSignals {
            new_account: true,
            default_avatar: true,
            digit_run_name: false,
        };
        assert!(two.suspicious());
        assert_eq!(two.score(), 2);
    }

    #[test]
    fn ejection_requires_suspicion_and_day_old_account() {
        let d = detector();
        let now = Utc::now();
        let suspicious = SuspicionSignals {
            new_account: true,
            default_avatar: true,
            digit_run_name: true,
        };

        assert!(d.should_eject(&suspicious, now - Duration::hours(2), now));
        // Suspicious but older than a day: warn only.
        assert!(!d.should_eject(&suspicious, now - Duration::days(3), now));

        let mild = SuspicionSignals {
            new_account: true,
            default_avatar: false,
            digit_run_name: false,
        };
        assert!(!d.should_eject(&mild, now - Duration::hours(2), now));
    }

    #[test]
    fn describe_lists_present_signals() {
        let signals = SuspicionSignals {
            new_account: true,
            default_avatar: false,
            digit_run_name: true,
        };
        assert_eq!(signals.describe(), "new account, digit-run username");
    }

    mod property_tests {
        use chrono::{Duration, Utc};
        use proptest::prelude::*;

        use crate::raid::{RaidConfig, RaidDetector};

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// For any join burst at one instant, at most one alert fires.
            #[test]
            fn prop_cooldown_allows_one_alert_per_burst(
                user_limit in 2u32..10,
                burst in 10u32..40,
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let d = RaidDetector::new().expect("valid pattern");
                    d.enable(1, RaidConfig { user_limit, window_secs: 600 }).await;
                    let now = Utc::now();

                    let mut alerts = 0;
                    for i in 0..burst {
                        let outcome = d
                            .record_join(1, u64::from(i), "user", now)
                            .await
                            .expect("enabled");
                        if outcome.alert.is_some() {
                            alerts += 1;
                        }
                    }
                    assert_eq!(alerts, 1);
                });
            }

            /// Join counts for different guilds never interact.
            #[test]
            fn prop_guild_isolation(
                guild1 in 1u64..1000u64,
                guild2 in 1001u64..2000u64,
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let d = RaidDetector::new().expect("valid pattern");
                    let config = RaidConfig { user_limit: 2, window_secs: 600 };
                    d.enable(guild1, config).await;
                    d.enable(guild2, config).await;
                    let now = Utc::now();

                    d.record_join(guild1, 1, "a", now).await;
                    let other = d
                        .record_join(guild2, 2, "b", now)
                        .await
                        .expect("enabled");
                    assert!(other.alert.is_none());
                    assert_eq!(other.join_count, 1);

                    // A second join still alerts in each guild independently.
                    let first = d
                        .record_join(guild1, 3, "c", now)
                        .await
                        .expect("enabled");
                    assert!(first.alert.is_some());
                });
            }

            /// Joins strictly older than the window never count; recording at
            /// a steady trickle below the threshold never alerts.
            #[test]
            fn prop_slow_trickle_never_alerts(
                window_secs in 10u64..120,
                joins in 3u32..20,
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let d = RaidDetector::new().expect("valid pattern");
                    d.enable(1, RaidConfig { user_limit: 2, window_secs }).await;

                    let mut now = Utc::now();
                    let gap = Duration::seconds(window_secs as i64 + 1);
                    for i in 0..joins {
                        now += gap;
                        let outcome = d
                            .record_join(1, u64::from(i), "user", now)
                            .await
                            .expect("enabled");
                        assert!(outcome.alert.is_none());
                        assert!(outcome.review.is_empty());
                        assert_eq!(outcome.join_count, 1);
                    }
                });
            }
        }
    }
}
