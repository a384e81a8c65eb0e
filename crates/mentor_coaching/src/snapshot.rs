//! State snapshot: the decision-ready facts derived from raw entities.
//!
//! Built fresh for every evaluation and never persisted. Each entity-binding
//! fact already applies its tier's tie-break, so rules only test presence.
//! Empty inputs produce "no match" facts, never an error.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use mentor_core::{CoachingThresholds, EntitySet, Goal, Habit, JournalVariant};

use crate::card::{Discovery, GoalRef, HabitRef};

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureUsage {
    pub has_used_chat: bool,
    /// Habit linked to a reflection finished inside the reflection window,
    /// still not checked off for the current period.
    pub reflection_pending_habit: Option<HabitRef>,
    /// Set when there are active goals and none of them has milestones.
    pub goal_without_milestones: Option<GoalRef>,
}

/// Trailing-window metrics for the "winning" tier.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMetrics {
    /// None when no active habit was due in the window.
    pub completion_rate: Option<f32>,
    pub journals_per_week: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub now: DateTime<Utc>,
    pub goal_count: usize,
    pub habit_count: usize,
    pub journal_count: usize,
    pub active_goal_count: usize,
    pub active_habit_count: usize,
    pub urgent_deadline_goal: Option<GoalRef>,
    pub at_risk_streak_habit: Option<HabitRef>,
    pub stalled_goal: Option<GoalRef>,
    pub mini_win_goal: Option<GoalRef>,
    pub last_journal_at: Option<DateTime<Utc>>,
    pub days_since_last_journal: Option<i64>,
    pub usage: FeatureUsage,
    pub window: WindowMetrics,
    /// Most recently updated active goal.
    pub focus_goal: Option<GoalRef>,
    pub discovered: BTreeSet<Discovery>,
}

impl StateSnapshot {
    pub fn build(
        entities: &EntitySet,
        discovered: BTreeSet<Discovery>,
        thresholds: &CoachingThresholds,
        now: DateTime<Utc>,
    ) -> Self {
        let today = now.date_naive();
        let active_goals: Vec<&Goal> = entities.goals.iter().filter(|g| g.is_active()).collect();
        let active_habits: Vec<&Habit> = entities.habits.iter().filter(|h| h.is_active()).collect();

        let urgent_window = Duration::hours(thresholds.urgent_deadline_hours);
        let urgent_deadline_goal = active_goals
            .iter()
            .filter(|g| g.progress < 100)
            .filter_map(|g| g.deadline.map(|d| (*g, d)))
            .filter(|(_, d)| *d >= now && *d - now <= urgent_window)
            .min_by(|(a, da), (b, db)| da.cmp(db).then(a.id.cmp(&b.id)))
            .map(|(g, _)| GoalRef::of(g, now));

        let at_risk_streak_habit = active_habits
            .iter()
            .filter(|h| h.streak >= thresholds.streak_at_risk_min)
            .filter(|h| h.frequency.is_due(today) && !h.completed_in_period(today))
            .min_by(|a, b| b.streak.cmp(&a.streak).then(a.id.cmp(&b.id)))
            .map(|h| HabitRef::of(h));

        let stalled_goal = oldest_lagging(
            &active_goals,
            now,
            Duration::days(thresholds.stalled_goal_min_age_days),
            thresholds.stalled_goal_max_progress,
        );
        let mini_win_goal = oldest_lagging(
            &active_goals,
            now,
            Duration::days(thresholds.mini_win_min_age_days),
            thresholds.mini_win_max_progress,
        );

        // Explicit max by timestamp; caller order is not trusted.
        let last_journal_at = entities.journal.iter().map(|e| e.created_at).max();
        let days_since_last_journal = last_journal_at.map(|t| (now - t).num_days().max(0));

        let usage = FeatureUsage {
            has_used_chat: entities.usage.has_used_chat,
            reflection_pending_habit: reflection_pending_habit(entities, &active_habits, thresholds, now),
            goal_without_milestones: if !active_goals.is_empty()
                && active_goals.iter().all(|g| g.milestones.is_empty())
            {
                most_recent(&active_goals).map(|g| GoalRef::of(g, now))
            } else {
                None
            },
        };

        let window = window_metrics(entities, &active_habits, thresholds, now);
        let focus_goal = most_recent(&active_goals).map(|g| GoalRef::of(g, now));

        let snapshot = Self {
            now,
            goal_count: entities.goals.len(),
            habit_count: entities.habits.len(),
            journal_count: entities.journal.len(),
            active_goal_count: active_goals.len(),
            active_habit_count: active_habits.len(),
            urgent_deadline_goal,
            at_risk_streak_habit,
            stalled_goal,
            mini_win_goal,
            last_journal_at,
            days_since_last_journal,
            usage,
            window,
            focus_goal,
            discovered,
        };
        tracing::trace!(?snapshot, "state snapshot built");
        snapshot
    }

    pub fn has_any_data(&self) -> bool {
        self.goal_count + self.habit_count + self.journal_count > 0
    }

    pub fn uses_goals(&self) -> bool {
        self.active_goal_count > 0
    }

    pub fn uses_habits(&self) -> bool {
        self.active_habit_count > 0
    }

    pub fn uses_journal(&self) -> bool {
        self.journal_count > 0
    }

    pub fn is_discovered(&self, discovery: Discovery) -> bool {
        self.discovered.contains(&discovery)
    }
}

/// Oldest goal (then lowest progress) at least `min_age` old with progress below `max_progress`.
fn oldest_lagging(
    goals: &[&Goal],
    now: DateTime<Utc>,
    min_age: Duration,
    max_progress: u8,
) -> Option<GoalRef> {
    goals
        .iter()
        .filter(|g| now - g.created_at >= min_age && g.progress < max_progress)
        .min_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.progress.cmp(&b.progress))
                .then(a.id.cmp(&b.id))
        })
        .map(|g| GoalRef::of(g, now))
}

fn most_recent<'a>(goals: &[&'a Goal]) -> Option<&'a Goal> {
    goals
        .iter()
        .copied()
        .min_by(|a, b| match b.updated_at.cmp(&a.updated_at) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        })
}

fn reflection_pending_habit(
    entities: &EntitySet,
    active_habits: &[&Habit],
    thresholds: &CoachingThresholds,
    now: DateTime<Utc>,
) -> Option<HabitRef> {
    let window = Duration::minutes(thresholds.reflection_window_minutes);
    let recent = |t: DateTime<Utc>| t <= now && now - t <= window;

    // Host-reported reflection first, else the newest guided entry with a habit link.
    let habit_id = entities
        .usage
        .last_reflection
        .as_ref()
        .filter(|r| recent(r.completed_at))
        .and_then(|r| r.linked_habit_id)
        .or_else(|| {
            entities
                .journal
                .iter()
                .filter(|e| e.variant == JournalVariant::Guided && recent(e.created_at))
                .filter_map(|e| e.linked_habit_id.map(|id| (e.created_at, id)))
                .max()
                .map(|(_, id)| id)
        })?;

    let today = now.date_naive();
    active_habits
        .iter()
        .find(|h| h.id == habit_id)
        .filter(|h| !h.completed_in_period(today))
        .map(|h| HabitRef::of(h))
}

fn window_metrics(
    entities: &EntitySet,
    active_habits: &[&Habit],
    thresholds: &CoachingThresholds,
    now: DateTime<Utc>,
) -> WindowMetrics {
    let days = thresholds.winning_window_days.max(1);
    let today = now.date_naive();
    let from = today - Duration::days(days - 1);

    let (done, expected) = active_habits.iter().fold((0u32, 0u32), |(done, expected), h| {
        let exp = h.expected_completions(from, today);
        let got = h.completions_between(from, today).min(exp);
        (done + got, expected + exp)
    });
    let completion_rate = (expected > 0).then(|| done as f32 / expected as f32);

    let window_start = now - Duration::days(days);
    let journals_in_window = entities
        .journal
        .iter()
        .filter(|e| e.created_at > window_start && e.created_at <= now)
        .count();
    let journals_per_week = journals_in_window as f32 * 7.0 / days as f32;

    WindowMetrics {
        completion_rate,
        journals_per_week,
    }
}
