//! Change fingerprint over the entity set.
//!
//! Two sets with the same digest produce the same card. Per-type counts are
//! kept in the clear so the cache can cross-check presence without rehashing.
//!
//! The entity hash alone only moves once per day. Facts that cross a threshold
//! as the clock advances (deadline windows, days since the last entry, the
//! reflection window) are folded in with [`Fingerprint::with_time_facts`].

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use mentor_core::EntitySet;

use crate::card::{GoalRef, HabitRef};
use crate::snapshot::StateSnapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounts {
    pub goals: usize,
    pub habits: usize,
    pub journal: usize,
}

impl EntityCounts {
    pub fn of(entities: &EntitySet) -> Self {
        Self {
            goals: entities.goals.len(),
            habits: entities.habits.len(),
            journal: entities.journal.len(),
        }
    }
}

/// Which entity types are non-empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Presence {
    pub goals: bool,
    pub habits: bool,
    pub journal: bool,
}

impl Presence {
    pub fn of(entities: &EntitySet) -> Self {
        EntityCounts::of(entities).into()
    }
}

impl From<EntityCounts> for Presence {
    fn from(counts: EntityCounts) -> Self {
        Self {
            goals: counts.goals > 0,
            habits: counts.habits > 0,
            journal: counts.journal > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub counts: EntityCounts,
    pub digest: String,
    pub computed_at: DateTime<Utc>,
}

impl Fingerprint {
    pub fn compute(entities: &EntitySet, now: DateTime<Utc>) -> Self {
        let counts = EntityCounts::of(entities);
        let mut hasher = Sha256::new();

        hasher.update(format!("counts:{}:{}:{}\n", counts.goals, counts.habits, counts.journal));

        hash_section(
            &mut hasher,
            "goals",
            entities.goals.iter().map(|g| (g.id, g.updated_at)),
        );
        hash_section(
            &mut hasher,
            "habits",
            entities.habits.iter().map(|h| (h.id, h.updated_at)),
        );
        hash_section(
            &mut hasher,
            "journal",
            entities.journal.iter().map(|j| (j.id, j.updated_at)),
        );

        hasher.update(format!("day:{}\n", now.date_naive()));

        let usage = &entities.usage;
        hasher.update(format!("chat:{}\n", usage.has_used_chat));
        if let Some(reflection) = &usage.last_reflection {
            hasher.update(format!(
                "reflection:{}:{}\n",
                minute(reflection.completed_at),
                reflection
                    .linked_habit_id
                    .map(|id| id.to_string())
                    .unwrap_or_default()
            ));
        }

        Self {
            counts,
            digest: format!("{:x}", hasher.finalize()),
            computed_at: now,
        }
    }

    /// Fold the clock-dependent outcomes of `snapshot` into the digest.
    pub fn with_time_facts(mut self, snapshot: &StateSnapshot) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(self.digest.as_bytes());
        hasher.update(b"\n");
        hasher.update(time_facts(snapshot));
        self.digest = format!("{:x}", hasher.finalize());
        self
    }

    pub fn presence(&self) -> Presence {
        self.counts.into()
    }

    pub fn short(&self) -> &str {
        self.digest.get(..12).unwrap_or(&self.digest)
    }
}

fn hash_section(
    hasher: &mut Sha256,
    label: &str,
    items: impl Iterator<Item = (Uuid, DateTime<Utc>)>,
) {
    let mut ids = Vec::new();
    let mut latest: Option<DateTime<Utc>> = None;
    for (id, updated_at) in items {
        ids.push(id);
        latest = latest.max(Some(updated_at));
    }
    ids.sort();

    hasher.update(label.as_bytes());
    for id in &ids {
        hasher.update(id.as_bytes());
    }
    match latest {
        Some(at) => hasher.update(format!(":{}\n", minute(at))),
        None => hasher.update(b":-\n"),
    }
}

fn time_facts(s: &StateSnapshot) -> String {
    let goal = |g: &Option<GoalRef>| {
        g.as_ref()
            .map(|g| format!("{}@{}", g.id, g.age_days))
            .unwrap_or_default()
    };
    let habit = |h: &Option<HabitRef>| h.as_ref().map(|h| h.id.to_string()).unwrap_or_default();

    // Hours left is shown on the urgent card, so it is part of the fact.
    let urgent = s
        .urgent_deadline_goal
        .as_ref()
        .map(|g| {
            let hours = g.deadline.map(|d| (d - s.now).num_hours()).unwrap_or_default();
            format!("{}@{}", g.id, hours)
        })
        .unwrap_or_default();

    format!(
        "urgent:{}\nat_risk:{}\nstalled:{}\nmini_win:{}\njournal_days:{:?}\nreflection:{}\nwindow:{:?}:{}\n",
        urgent,
        habit(&s.at_risk_streak_habit),
        goal(&s.stalled_goal),
        goal(&s.mini_win_goal),
        s.days_since_last_journal,
        habit(&s.usage.reflection_pending_habit),
        s.window.completion_rate,
        s.window.journals_per_week,
    )
}

fn minute(at: DateTime<Utc>) -> String {
    at.duration_trunc(TimeDelta::minutes(1))
        .unwrap_or(at)
        .format("%Y-%m-%dT%H:%M")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mentor_core::{
        CoachingThresholds, Goal, GoalCategory, Habit, HabitFrequency, JournalEntry, ReflectionEvent,
    };
    use std::collections::BTreeSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap()
    }

    fn sample() -> EntitySet {
        let t = now() - Duration::days(2);
        EntitySet {
            goals: vec![
                Goal::new("Run a 10k", GoalCategory::Health, t),
                Goal::new("Read 12 books", GoalCategory::Learning, t),
            ],
            habits: vec![Habit::new("Stretch", HabitFrequency::Daily, t)],
            journal: vec![JournalEntry::quick_note("Slept well", t).unwrap()],
            ..Default::default()
        }
    }

    #[test]
    fn test_same_data_same_digest() {
        let entities = sample();
        let a = Fingerprint::compute(&entities, now());
        let b = Fingerprint::compute(&entities, now() + Duration::hours(3));
        assert_eq!(a.digest, b.digest);
        assert_eq!(a.counts, EntityCounts { goals: 2, habits: 1, journal: 1 });
    }

    #[test]
    fn test_order_does_not_matter() {
        let entities = sample();
        let mut reversed = entities.clone();
        reversed.goals.reverse();
        assert_eq!(
            Fingerprint::compute(&entities, now()).digest,
            Fingerprint::compute(&reversed, now()).digest
        );
    }

    #[test]
    fn test_edit_changes_digest() {
        let entities = sample();
        let before = Fingerprint::compute(&entities, now());

        let mut edited = entities.clone();
        edited.goals[0].set_progress(40, now());
        assert_ne!(before.digest, Fingerprint::compute(&edited, now()).digest);
    }

    #[test]
    fn test_sub_minute_edits_are_ignored() {
        let entities = sample();
        let mut touched = entities.clone();
        touched.goals[0].updated_at += Duration::seconds(5);
        assert_eq!(
            Fingerprint::compute(&entities, now()).digest,
            Fingerprint::compute(&touched, now()).digest
        );
    }

    #[test]
    fn test_new_day_changes_digest() {
        let entities = sample();
        let today = Fingerprint::compute(&entities, now());
        let tomorrow = Fingerprint::compute(&entities, now() + Duration::days(1));
        assert_ne!(today.digest, tomorrow.digest);
    }

    #[test]
    fn test_usage_signals_change_digest() {
        let entities = sample();
        let mut chatted = entities.clone();
        chatted.usage.has_used_chat = true;
        assert_ne!(
            Fingerprint::compute(&entities, now()).digest,
            Fingerprint::compute(&chatted, now()).digest
        );

        let mut reflected = entities.clone();
        reflected.usage.last_reflection = Some(ReflectionEvent {
            completed_at: now(),
            linked_habit_id: Some(entities.habits[0].id),
        });
        assert_ne!(
            Fingerprint::compute(&entities, now()).digest,
            Fingerprint::compute(&reflected, now()).digest
        );
    }

    #[test]
    fn test_presence_from_counts() {
        let mut entities = sample();
        entities.habits.clear();
        let fp = Fingerprint::compute(&entities, now());
        assert_eq!(
            fp.presence(),
            Presence {
                goals: true,
                habits: false,
                journal: true
            }
        );
        assert_eq!(fp.presence(), Presence::of(&entities));
        assert_eq!(fp.short().len(), 12);
    }

    fn timed(entities: &EntitySet, at: DateTime<Utc>) -> Fingerprint {
        let snapshot =
            StateSnapshot::build(entities, BTreeSet::new(), &CoachingThresholds::default(), at);
        Fingerprint::compute(entities, at).with_time_facts(&snapshot)
    }

    #[test]
    fn test_deadline_entering_window_changes_digest() {
        let mut entities = sample();
        entities.goals[0] = entities.goals[0].clone().with_deadline(now() + Duration::hours(26));
        let later = now() + Duration::hours(3);
        assert_eq!(now().date_naive(), later.date_naive());

        assert_eq!(
            Fingerprint::compute(&entities, now()).digest,
            Fingerprint::compute(&entities, later).digest
        );
        assert_ne!(timed(&entities, now()).digest, timed(&entities, later).digest);
    }

    #[test]
    fn test_journal_gap_rollover_changes_digest() {
        let mut entities = sample();
        entities.journal =
            vec![JournalEntry::quick_note("Long day", now() - Duration::hours(70)).unwrap()];
        let later = now() + Duration::hours(3);
        assert_ne!(timed(&entities, now()).digest, timed(&entities, later).digest);
    }

    #[test]
    fn test_time_facts_stable_when_nothing_crosses() {
        let entities = sample();
        let later = now() + Duration::minutes(20);
        assert_eq!(timed(&entities, now()).digest, timed(&entities, later).digest);
        assert_eq!(timed(&entities, now()).counts, Fingerprint::compute(&entities, now()).counts);
    }
}
