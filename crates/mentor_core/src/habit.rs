//! Habits: recurring check-ins with a streak over qualifying periods.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::goal::Status;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitFrequency {
    #[default]
    Daily,
    /// Monday to Friday. Weekends are neither due nor gaps.
    Weekdays,
    /// Once per ISO week (Monday-Sunday).
    Weekly,
}

impl HabitFrequency {
    pub fn label(&self) -> &'static str {
        match self {
            HabitFrequency::Daily => "daily",
            HabitFrequency::Weekdays => "weekdays",
            HabitFrequency::Weekly => "weekly",
        }
    }

    pub fn is_due(&self, date: NaiveDate) -> bool {
        match self {
            HabitFrequency::Weekdays => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
            HabitFrequency::Daily | HabitFrequency::Weekly => true,
        }
    }

    /// First day of the period containing `date`.
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            HabitFrequency::Daily | HabitFrequency::Weekdays => date,
            HabitFrequency::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
        }
    }

    /// Start of the nearest due period strictly before the one containing `date`.
    pub fn previous_period(&self, date: NaiveDate) -> NaiveDate {
        match self {
            HabitFrequency::Daily => date - Duration::days(1),
            HabitFrequency::Weekdays => {
                let mut prev = date - Duration::days(1);
                while !self.is_due(prev) {
                    prev -= Duration::days(1);
                }
                prev
            }
            HabitFrequency::Weekly => self.period_start(date) - Duration::days(7),
        }
    }

    fn period_end(&self, date: NaiveDate) -> NaiveDate {
        match self {
            HabitFrequency::Daily | HabitFrequency::Weekdays => date,
            HabitFrequency::Weekly => self.period_start(date) + Duration::days(6),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub frequency: HabitFrequency,
    #[serde(default)]
    pub status: Status,
    /// Consecutive completed periods with no gap.
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub completions: BTreeSet<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Habit {
    pub fn new(title: impl Into<String>, frequency: HabitFrequency, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            frequency,
            status: Status::Active,
            streak: 0,
            completions: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        if self.status != status {
            self.status = status;
            self.updated_at = now;
        }
    }

    pub fn completed_in_period(&self, date: NaiveDate) -> bool {
        let start = self.frequency.period_start(date);
        let end = self.frequency.period_end(date);
        self.completions.range(start..=end).next().is_some()
    }

    /// Record a completion and refresh the streak as of `now`.
    pub fn check_in(&mut self, date: NaiveDate, now: DateTime<Utc>) {
        self.completions.insert(date);
        self.streak = self.recompute_streak(now.date_naive());
        self.updated_at = now;
    }

    /// Count consecutive completed periods ending at the current one, or at the
    /// previous one when the current period is still open.
    pub fn recompute_streak(&self, today: NaiveDate) -> u32 {
        let Some(first) = self.completions.first().copied() else {
            return 0;
        };

        let mut cursor = self.frequency.period_start(today);
        if !self.frequency.is_due(cursor) || !self.completed_in_period(cursor) {
            cursor = self.frequency.previous_period(cursor);
        }

        let mut streak = 0;
        while cursor >= self.frequency.period_start(first) && self.completed_in_period(cursor) {
            streak += 1;
            cursor = self.frequency.previous_period(cursor);
        }
        streak
    }

    /// Due periods between `from` and `to` (inclusive), not counting days
    /// before the habit existed.
    pub fn expected_completions(&self, from: NaiveDate, to: NaiveDate) -> u32 {
        let from = from.max(self.created_at.date_naive());
        if from > to {
            return 0;
        }
        match self.frequency {
            HabitFrequency::Daily => ((to - from).num_days() + 1) as u32,
            HabitFrequency::Weekdays => from
                .iter_days()
                .take_while(|d| *d <= to)
                .filter(|d| self.frequency.is_due(*d))
                .count() as u32,
            HabitFrequency::Weekly => {
                let first = self.frequency.period_start(from);
                let last = self.frequency.period_start(to);
                ((last - first).num_days() / 7 + 1) as u32
            }
        }
    }

    /// Completed periods between `from` and `to` (inclusive).
    pub fn completions_between(&self, from: NaiveDate, to: NaiveDate) -> u32 {
        if from > to {
            return 0;
        }
        let in_range = self.completions.range(from..=to);
        match self.frequency {
            HabitFrequency::Daily => in_range.count() as u32,
            HabitFrequency::Weekdays => in_range.filter(|d| self.frequency.is_due(**d)).count() as u32,
            HabitFrequency::Weekly => in_range
                .map(|d| self.frequency.period_start(*d))
                .collect::<BTreeSet<_>>()
                .len() as u32,
        }
    }
}
