//! Moderator abuse detection.
//!
//! One detector instance covers one action kind (bans or kicks). Each guild
//! that enables protection gets a per-moderator sliding window of recent
//! actions; crossing the configured threshold within the window flags the
//! moderator and selects the configured punishment.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::punish::Punishment;
use crate::window::RateWindow;

/// Which moderation action a detector watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseKind {
    Ban,
    Kick,
}

impl AbuseKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Kick => "kick",
        }
    }
}

/// Per-guild detector configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Actions within the window that trigger a violation (inclusive).
    pub threshold: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Punishment applied to the flagged moderator.
    pub punishment: Punishment,
}

/// Result of recording one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    /// Whether this action crossed the threshold.
    pub violated: bool,
    /// In-window action count for this moderator, including this action.
    pub count: u32,
    /// Punishment to apply, set only on violation.
    pub punishment: Option<Punishment>,
}

impl Evaluation {
    fn clean(count: u32) -> Self {
        Self {
            violated: false,
            count,
            punishment: None,
        }
    }
}

/// Snapshot of one moderator's history, for status commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorHistory {
    pub actor_id: u64,
    /// Actions still inside the window.
    pub recent: u32,
    /// All actions recorded since protection was enabled.
    pub total: u64,
}

/// One recorded action, for the per-moderator history view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedAction {
    pub target_id: u64,
    pub at: DateTime<Utc>,
}

struct GuildState {
    config: DetectorConfig,
    /// Per-moderator window of target user ids.
    windows: HashMap<u64, RateWindow<u64>>,
    /// Per-moderator running totals, never pruned.
    totals: HashMap<u64, u64>,
}

impl GuildState {
    fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            totals: HashMap::new(),
        }
    }
}

/// Sliding-window abuse detector for one moderation action kind.
pub struct AbuseDetector {
    kind: AbuseKind,
    guilds: RwLock<HashMap<u64, GuildState>>,
}

impl AbuseDetector {
    pub fn new(kind: AbuseKind) -> Self {
        Self {
            kind,
            guilds: RwLock::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> AbuseKind {
        self.kind
    }

    /// Enable protection for a guild. Re-enabling resets all recorded
    /// history, so stale windows can never flag under a new config.
    pub async fn enable(&self, guild_id: u64, config: DetectorConfig) {
        let mut guilds = self.guilds.write().await;
        guilds.insert(guild_id, GuildState::new(config));

        tracing::info!(
            guild_id = guild_id,
            kind = self.kind.label(),
            threshold = config.threshold,
            window_secs = config.window_secs,
            punishment = config.punishment.as_str(),
            "Abuse protection enabled"
        );
    }

    /// Disable protection and drop all state. Returns false when protection
    /// was not enabled.
    pub async fn disable(&self, guild_id: u64) -> bool {
        let removed = self.guilds.write().await.remove(&guild_id).is_some();
        if removed {
            tracing::info!(
                guild_id = guild_id,
                kind = self.kind.label(),
                "Abuse protection disabled"
            );
        }
        removed
    }

    /// Current configuration, or None when protection is disabled.
    pub async fn config(&self, guild_id: u64) -> Option<DetectorConfig> {
        self.guilds.read().await.get(&guild_id).map(|s| s.config)
    }

    /// Record one action by a moderator and evaluate the threshold.
    ///
    /// Disabled guilds and the guild owner are exempt; nothing is recorded
    /// for them. The recorded action counts toward its own evaluation, so a
    /// threshold of 1 flags on the first action.
    pub async fn record_and_evaluate(
        &self,
        guild_id: u64,
        actor_id: u64,
        target_id: u64,
        owner_id: u64,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let mut guilds = self.guilds.write().await;
        let Some(state) = guilds.get_mut(&guild_id) else {
            return Evaluation::clean(0);
        };

        if actor_id == owner_id {
            return Evaluation::clean(0);
        }

        let config = state.config;
        let window = state.windows.entry(actor_id).or_default();
        window.record(now, target_id);
        let count = window.prune_and_count(now, config.window_secs) as u32;
        *state.totals.entry(actor_id).or_insert(0) += 1;

        if count >= config.threshold {
            tracing::warn!(
                guild_id = guild_id,
                actor_id = actor_id,
                kind = self.kind.label(),
                count = count,
                threshold = config.threshold,
                window_secs = config.window_secs,
                "Moderator crossed abuse threshold"
            );
            Evaluation {
                violated: true,
                count,
                punishment: Some(config.punishment),
            }
        } else {
            tracing::debug!(
                guild_id = guild_id,
                actor_id = actor_id,
                kind = self.kind.label(),
                count = count,
                threshold = config.threshold,
                "Moderation action recorded"
            );
            Evaluation::clean(count)
        }
    }

    /// Per-moderator history snapshot, sorted by recent activity.
    pub async fn history(&self, guild_id: u64, now: DateTime<Utc>) -> Vec<ActorHistory> {
        let mut guilds = self.guilds.write().await;
        let Some(state) = guilds.get_mut(&guild_id) else {
            return Vec::new();
        };

        let window_secs = state.config.window_secs;
        let mut out: Vec<ActorHistory> = Vec::new();
        for (&actor_id, window) in state.windows.iter_mut() {
            let recent = window.prune_and_count(now, window_secs) as u32;
            let total = state.totals.get(&actor_id).copied().unwrap_or(0);
            if recent > 0 || total > 0 {
                out.push(ActorHistory {
                    actor_id,
                    recent,
                    total,
                });
            }
        }

        out.sort_by(|a, b| b.recent.cmp(&a.recent).then(b.total.cmp(&a.total)));
        out
    }

    /// The most recent in-window actions by one moderator, newest first,
    /// capped at `limit`, plus their running total.
    pub async fn actor_history(
        &self,
        guild_id: u64,
        actor_id: u64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> (Vec<RecordedAction>, u64) {
        let mut guilds = self.guilds.write().await;
        let Some(state) = guilds.get_mut(&guild_id) else {
            return (Vec::new(), 0);
        };

        let window_secs = state.config.window_secs;
        let total = state.totals.get(&actor_id).copied().unwrap_or(0);
        let Some(window) = state.windows.get_mut(&actor_id) else {
            return (Vec::new(), total);
        };

        window.prune_and_count(now, window_secs);
        let mut actions: Vec<RecordedAction> = window
            .last_n(limit)
            .into_iter()
            .map(|e| RecordedAction {
                target_id: e.data,
                at: e.at,
            })
            .collect();
        actions.reverse();

        (actions, total)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::abuse::{AbuseDetector, AbuseKind, DetectorConfig};
    use crate::punish::Punishment;

    const OWNER: u64 = 1;
    const MOD: u64 = 2;

    fn config(threshold: u32, window_secs: u64) -> DetectorConfig {
        DetectorConfig {
            threshold,
            window_secs,
            punishment: Punishment::Warn,
        }
    }

    #[tokio::test]
    async fn disabled_guild_never_flags() {
        let detector = AbuseDetector::new(AbuseKind::Ban);
        let now = Utc::now();

        for target in 0..20 {
            let eval = detector
                .record_and_evaluate(100, MOD, target, OWNER, now)
                .await;
            assert!(!eval.violated);
            assert_eq!(eval.count, 0);
        }
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let detector = AbuseDetector::new(AbuseKind::Ban);
        detector.enable(100, config(3, 180)).await;
        let now = Utc::now();

        let e1 = detector.record_and_evaluate(100, MOD, 10, OWNER, now).await;
        let e2 = detector.record_and_evaluate(100, MOD, 11, OWNER, now).await;
        assert!(!e1.violated);
        assert!(!e2.violated);

        let e3 = detector.record_and_evaluate(100, MOD, 12, OWNER, now).await;
        assert!(e3.violated);
        assert_eq!(e3.count, 3);
        assert_eq!(e3.punishment, Some(Punishment::Warn));
    }

    #[tokio::test]
    async fn threshold_of_one_flags_immediately() {
        let detector = AbuseDetector::new(AbuseKind::Kick);
        detector.enable(100, config(1, 60)).await;

        let eval = detector
            .record_and_evaluate(100, MOD, 10, OWNER, Utc::now())
            .await;
        assert!(eval.violated);
        assert_eq!(eval.count, 1);
    }

    #[tokio::test]
    async fn owner_is_exempt() {
        let detector = AbuseDetector::new(AbuseKind::Ban);
        detector.enable(100, config(1, 60)).await;

        let eval = detector
            .record_and_evaluate(100, OWNER, 10, OWNER, Utc::now())
            .await;
        assert!(!eval.violated);
        assert_eq!(eval.count, 0);
    }

    #[tokio::test]
    async fn expired_actions_fall_out_of_window() {
        let detector = AbuseDetector::new(AbuseKind::Ban);
        detector.enable(100, config(3, 60)).await;
        let start = Utc::now();

        detector
            .record_and_evaluate(100, MOD, 10, OWNER, start)
            .await;
        detector
            .record_and_evaluate(100, MOD, 11, OWNER, start)
            .await;

        // Third action arrives after the first two have aged out.
        let later = start + Duration::seconds(120);
        let eval = detector
            .record_and_evaluate(100, MOD, 12, OWNER, later)
            .await;
        assert!(!eval.violated);
        assert_eq!(eval.count, 1);
    }

    #[tokio::test]
    async fn moderators_are_tracked_independently() {
        let detector = AbuseDetector::new(AbuseKind::Ban);
        detector.enable(100, config(2, 60)).await;
        let now = Utc::now();

        detector.record_and_evaluate(100, 2, 10, OWNER, now).await;
        let other = detector.record_and_evaluate(100, 3, 11, OWNER, now).await;
        assert!(!other.violated);
        assert_eq!(other.count, 1);

        let second = detector.record_and_evaluate(100, 2, 12, OWNER, now).await;
        assert!(second.violated);
    }

    #[tokio::test]
    async fn guilds_are_tracked_independently() {
        let detector = AbuseDetector::new(AbuseKind::Ban);
        detector.enable(100, config(2, 60)).await;
        detector.enable(200, config(2, 60)).await;
        let now = Utc::now();

        detector.record_and_evaluate(100, MOD, 10, OWNER, now).await;
        let cross = detector.record_and_evaluate(200, MOD, 11, OWNER, now).await;
        assert!(!cross.violated);
        assert_eq!(cross.count, 1);
    }

    #[tokio::test]
    async fn re_enable_resets_history() {
        let detector = AbuseDetector::new(AbuseKind::Ban);
        detector.enable(100, config(3, 600)).await;
        let now = Utc::now();

        detector.record_and_evaluate(100, MOD, 10, OWNER, now).await;
        detector.record_and_evaluate(100, MOD, 11, OWNER, now).await;

        detector.enable(100, config(3, 600)).await;
        let eval = detector.record_and_evaluate(100, MOD, 12, OWNER, now).await;
        assert!(!eval.violated);
        assert_eq!(eval.count, 1);
    }

    #[tokio::test]
    async fn disable_reports_prior_state() {
        let detector = AbuseDetector::new(AbuseKind::Kick);
        assert!(!detector.disable(100).await);

        detector.enable(100, config(3, 60)).await;
        assert!(detector.disable(100).await);
        assert!(detector.config(100).await.is_none());
    }

    #[tokio::test]
    async fn history_reports_recent_and_totals() {
        let detector = AbuseDetector::new(AbuseKind::Ban);
        detector.enable(100, config(10, 60)).await;
        let start = Utc::now();

        detector
            .record_and_evaluate(100, MOD, 10, OWNER, start)
            .await;
        detector
            .record_and_evaluate(100, MOD, 11, OWNER, start)
            .await;

        let later = start + Duration::seconds(120);
        detector
            .record_and_evaluate(100, MOD, 12, OWNER, later)
            .await;

        let history = detector.history(100, later).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].actor_id, MOD);
        assert_eq!(history[0].recent, 1);
        assert_eq!(history[0].total, 3);
    }

    #[tokio::test]
    async fn actor_history_returns_newest_first() {
        let detector = AbuseDetector::new(AbuseKind::Ban);
        detector.enable(100, config(10, 600)).await;
        let start = Utc::now();

        for i in 0..4u64 {
            detector
                .record_and_evaluate(100, MOD, 10 + i, OWNER, start + Duration::seconds(i as i64))
                .await;
        }

        let (actions, total) = detector
            .actor_history(100, MOD, 3, start + Duration::seconds(4))
            .await;
        assert_eq!(total, 4);
        let targets: Vec<u64> = actions.iter().map(|a| a.target_id).collect();
        assert_eq!(targets, vec![13, 12, 11]);
    }

    mod property_tests {
        use chrono::{Duration, Utc};
        use proptest::prelude::*;

        use crate::abuse::{AbuseDetector, AbuseKind, DetectorConfig};
        use crate::punish::Punishment;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// For any threshold, the violation fires on the action that
            /// reaches the threshold and on every action after it.
            #[test]
            fn prop_violation_fires_exactly_at_threshold(
                threshold in 1u32..10,
                extra in 0u32..5,
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let detector = AbuseDetector::new(AbuseKind::Ban);
                    detector.enable(1, DetectorConfig {
                        threshold,
                        window_secs: 600,
                        punishment: Punishment::Kick,
                    }).await;
                    let now = Utc::now();

                    for i in 0..(threshold + extra) {
                        let eval = detector
                            .record_and_evaluate(1, 2, u64::from(i), 99, now)
                            .await;
                        assert_eq!(eval.violated, i + 1 >= threshold);
                        assert_eq!(eval.count, i + 1);
                    }
                });
            }

            /// For any sequence of action times, the reported count equals
            /// the number of actions inside the window, never more.
            #[test]
            fn prop_count_matches_in_window_actions(
                gaps in prop::collection::vec(0i64..120, 1..30),
                window_secs in 10u64..300,
            ) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let detector = AbuseDetector::new(AbuseKind::Kick);
                    detector.enable(1, DetectorConfig {
                        threshold: u32::MAX,
                        window_secs,
                        punishment: Punishment::Warn,
                    }).await;

                    let mut now = Utc::now();
                    let mut times = Vec::new();
                    for (i, gap) in gaps.iter().enumerate() {
                        now += Duration::seconds(*gap);
                        times.push(now);
                        let eval = detector
                            .record_and_evaluate(1, 2, i as u64, 99, now)
                            .await;

                        let cutoff = now - Duration::seconds(window_secs as i64);
                        let expected =
                            times.iter().filter(|t| **t >= cutoff).count() as u32;
                        assert_eq!(eval.count, expected);
                    }
                });
            }
        }
    }
}
