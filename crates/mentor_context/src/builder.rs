//! Context assembly for the text-generation backends.
//!
//! Sections are emitted in a fixed order (goals, habits, journal, mood), each
//! sorted explicitly so storage order never leaks into the output. When the
//! estimate exceeds the backend budget, items are dropped from section tails:
//! journal and mood first, then habits, then goals (at least one goal stays).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

use mentor_core::{
    Backend, BackendBudget, ContextConfig, EntitySet, Goal, Habit, JournalEntry, PulseEntry,
};

use crate::tokens::{estimate_line, estimate_tokens};

/// Returned when there is nothing to summarize.
pub const EMPTY_CONTEXT: &str = "No goals, habits, or journal entries yet.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SectionCounts {
    pub goals: usize,
    pub habits: usize,
    pub journal: usize,
    pub pulse: usize,
}

impl SectionCounts {
    pub fn total(&self) -> usize {
        self.goals + self.habits + self.journal + self.pulse
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundedContext {
    pub text: String,
    pub estimated_tokens: usize,
    pub backend: Backend,
    /// Token ceiling of the backend the context was built for.
    pub budget: usize,
    pub included: SectionCounts,
    pub dropped: SectionCounts,
}

impl BoundedContext {
    pub fn is_truncated(&self) -> bool {
        self.dropped.total() > 0
    }
}

// ============================================================================
// Sections
// ============================================================================

struct Item {
    line: String,
    tokens: usize,
}

impl Item {
    fn new(line: String) -> Self {
        let tokens = estimate_line(&line);
        Self { line, tokens }
    }
}

struct Section {
    heading: &'static str,
    items: Vec<Item>,
}

impl Section {
    fn new(heading: &'static str, lines: impl IntoIterator<Item = String>) -> Self {
        Self {
            heading,
            items: lines.into_iter().map(Item::new).collect(),
        }
    }

    fn tokens(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        estimate_line(self.heading) + self.items.iter().map(|i| i.tokens).sum::<usize>()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop the last (lowest priority) item.
    fn pop(&mut self) -> bool {
        self.items.pop().is_some()
    }

    fn render(&self, out: &mut String) {
        if self.is_empty() {
            return;
        }
        out.push('\n');
        out.push_str(self.heading);
        out.push('\n');
        for item in &self.items {
            out.push_str(&item.line);
            out.push('\n');
        }
    }
}

// ============================================================================
// ContextBuilder
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn build_from(&self, entities: &EntitySet, backend: Backend, now: DateTime<Utc>) -> BoundedContext {
        self.build(
            &entities.goals,
            &entities.habits,
            &entities.journal,
            &entities.pulse,
            backend,
            now,
        )
    }

    pub fn build(
        &self,
        goals: &[Goal],
        habits: &[Habit],
        journal: &[JournalEntry],
        pulse: &[PulseEntry],
        backend: Backend,
        now: DateTime<Utc>,
    ) -> BoundedContext {
        let budget = self.config.budget(backend);

        let mut goals: Vec<&Goal> = goals.iter().filter(|g| g.is_active()).collect();
        goals.sort_by(|a, b| newest_first(a.updated_at, b.updated_at).then(a.id.cmp(&b.id)));

        let mut habits: Vec<&Habit> = habits.iter().filter(|h| h.is_active()).collect();
        habits.sort_by(|a, b| {
            b.streak
                .cmp(&a.streak)
                .then(newest_first(a.updated_at, b.updated_at))
                .then(a.id.cmp(&b.id))
        });

        let mut journal: Vec<&JournalEntry> = journal.iter().collect();
        journal.sort_by(|a, b| newest_first(a.updated_at, b.updated_at).then(a.id.cmp(&b.id)));

        let mut pulse: Vec<&PulseEntry> = pulse.iter().collect();
        pulse.sort_by(|a, b| newest_first(a.recorded_at, b.recorded_at).then(a.id.cmp(&b.id)));

        if goals.is_empty() && habits.is_empty() && journal.is_empty() && pulse.is_empty() {
            return BoundedContext {
                text: EMPTY_CONTEXT.to_string(),
                estimated_tokens: estimate_tokens(EMPTY_CONTEXT),
                backend,
                budget: budget.max_tokens,
                included: SectionCounts::default(),
                dropped: SectionCounts::default(),
            };
        }

        let available = SectionCounts {
            goals: goals.len(),
            habits: habits.len(),
            journal: journal.len(),
            pulse: pulse.len(),
        };
        journal.truncate(budget.max_journal_entries);
        pulse.truncate(budget.max_pulse_entries);

        let preamble = format!("Context as of {}.", now.format("%A, %Y-%m-%d"));
        let mut goal_section = Section::new("Active goals:", goals.iter().map(|g| goal_line(g, now)));
        let mut habit_section = Section::new("Habits:", habits.iter().map(|h| habit_line(h, now)));
        let mut journal_section = Section::new(
            "Recent journal entries:",
            journal.iter().map(|e| journal_line(e, budget)),
        );
        let mut pulse_section = Section::new("Recent mood check-ins:", pulse.iter().map(|p| pulse_line(p)));

        let total = |g: &Section, h: &Section, j: &Section, p: &Section| {
            estimate_line(&preamble) + g.tokens() + h.tokens() + j.tokens() + p.tokens()
        };

        while total(&goal_section, &habit_section, &journal_section, &pulse_section) > budget.max_tokens {
            let dropped = if !journal_section.is_empty() || !pulse_section.is_empty() {
                if journal_section.len() >= pulse_section.len() {
                    journal_section.pop()
                } else {
                    pulse_section.pop()
                }
            } else if !habit_section.is_empty() {
                habit_section.pop()
            } else if goal_section.len() > 1 {
                goal_section.pop()
            } else {
                false
            };
            if !dropped {
                break;
            }
        }

        let mut text = preamble.clone();
        text.push('\n');
        for section in [&goal_section, &habit_section, &journal_section, &pulse_section] {
            section.render(&mut text);
        }
        let text = text.trim_end().to_string();

        let included = SectionCounts {
            goals: goal_section.len(),
            habits: habit_section.len(),
            journal: journal_section.len(),
            pulse: pulse_section.len(),
        };
        let dropped = SectionCounts {
            goals: available.goals - included.goals,
            habits: available.habits - included.habits,
            journal: available.journal - included.journal,
            pulse: available.pulse - included.pulse,
        };
        let estimated_tokens = estimate_tokens(&text);

        if dropped.total() > 0 {
            tracing::debug!(
                backend = backend.as_str(),
                budget = budget.max_tokens,
                estimated_tokens,
                dropped_journal = dropped.journal,
                dropped_pulse = dropped.pulse,
                dropped_habits = dropped.habits,
                dropped_goals = dropped.goals,
                "Context truncated to fit budget"
            );
        }
        if estimated_tokens > budget.max_tokens {
            tracing::warn!(
                backend = backend.as_str(),
                "Context still over budget ({} > {}) after truncation",
                estimated_tokens,
                budget.max_tokens
            );
        }

        BoundedContext {
            text,
            estimated_tokens,
            backend,
            budget: budget.max_tokens,
            included,
            dropped,
        }
    }
}

fn newest_first(a: DateTime<Utc>, b: DateTime<Utc>) -> Ordering {
    b.cmp(&a)
}

/// Collapse whitespace so user text cannot break the line structure.
fn one_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn goal_line(goal: &Goal, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "- {} ({}): {}% done, updated {} ago",
        one_line(&goal.title),
        goal.category.label(),
        goal.progress,
        days(goal.days_since_update(now))
    );
    if let Some(deadline) = goal.deadline {
        line.push_str(&format!(", due {}", deadline.format("%Y-%m-%d")));
    }
    if !goal.milestones.is_empty() {
        line.push_str(&format!(
            ", milestones {}/{}",
            goal.milestones_done(),
            goal.milestones.len()
        ));
    }
    line
}

fn habit_line(habit: &Habit, now: DateTime<Utc>) -> String {
    let status = if habit.completed_in_period(now.date_naive()) {
        "done this period"
    } else {
        "not done yet this period"
    };
    format!(
        "- {} ({}): streak {}, {}",
        one_line(&habit.title),
        habit.frequency.label(),
        habit.streak,
        status
    )
}

fn journal_line(entry: &JournalEntry, budget: &BackendBudget) -> String {
    format!(
        "- {} [{}] {}",
        entry.created_at.format("%Y-%m-%d"),
        entry.variant.as_str(),
        entry.excerpt(budget.journal_excerpt_words)
    )
}

fn pulse_line(pulse: &PulseEntry) -> String {
    let mut line = format!("- {} mood {}/5", pulse.recorded_at.format("%Y-%m-%d"), pulse.mood);
    if let Some(energy) = pulse.energy {
        line.push_str(&format!(", energy {}/5", energy));
    }
    if let Some(note) = pulse.note.as_deref().map(one_line).filter(|n| !n.is_empty()) {
        line.push_str(&format!(": {}", note));
    }
    line
}

fn days(n: i64) -> String {
    match n {
        0 => "today".to_string(),
        1 => "1 day".to_string(),
        n => format!("{} days", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mentor_core::{GoalCategory, HabitFrequency, Status};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 20, 0, 0).unwrap()
    }

    fn journal(n: usize) -> Vec<JournalEntry> {
        (0..n)
            .map(|i| {
                JournalEntry::quick_note(
                    format!("Entry number {} about the day", i),
                    now() - Duration::hours(i as i64 + 1),
                )
                .unwrap()
            })
            .collect()
    }

    fn builder_with(remote: BackendBudget) -> ContextBuilder {
        ContextBuilder::new(ContextConfig {
            remote,
            ..Default::default()
        })
    }

    fn unlimited() -> BackendBudget {
        BackendBudget {
            max_tokens: usize::MAX,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_input_gives_placeholder() {
        let ctx = ContextBuilder::default().build(&[], &[], &[], &[], Backend::Local, now());
        assert_eq!(ctx.text, EMPTY_CONTEXT);
        assert!(!ctx.is_truncated());
        assert_eq!(ctx.included.total(), 0);
    }

    #[test]
    fn test_inactive_only_is_empty() {
        let mut goal = Goal::new("Old plan", GoalCategory::Career, now());
        goal.set_status(Status::Abandoned, now());
        let ctx = ContextBuilder::default().build(&[goal], &[], &[], &[], Backend::Remote, now());
        assert_eq!(ctx.text, EMPTY_CONTEXT);
    }

    #[test]
    fn test_fifty_journals_budget_for_five() {
        let all = journal(50);

        // Budget measured from an untruncated build of the five newest entries.
        let mut newest: Vec<JournalEntry> = all[..5].to_vec();
        newest.reverse();
        let five = builder_with(unlimited()).build(&[], &[], &newest, &[], Backend::Remote, now());
        assert!(!five.is_truncated());

        let ctx = builder_with(BackendBudget {
            max_tokens: five.estimated_tokens,
            ..Default::default()
        })
        .build(&[], &[], &all, &[], Backend::Remote, now());

        assert_eq!(ctx.included.journal, 5);
        assert_eq!(ctx.dropped.journal, 45);
        assert!(ctx.is_truncated());
        assert_eq!(ctx.text, five.text);

        let order: Vec<usize> = (0..5)
            .map(|i| ctx.text.find(&format!("Entry number {} ", i)).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "not newest first");
    }

    #[test]
    fn test_journal_cap_applies_before_budget() {
        let ctx = ContextBuilder::default().build(&[], &[], &journal(10), &[], Backend::Local, now());
        assert!(ctx.included.journal <= 3);
        assert_eq!(ctx.included.journal + ctx.dropped.journal, 10);
    }

    #[test]
    fn test_goals_kept_last_and_never_emptied() {
        let goals: Vec<Goal> = (0..4)
            .map(|i| {
                let mut g = Goal::new(format!("Goal {}", i), GoalCategory::Personal, now());
                g.updated_at = now() - Duration::days(i);
                g
            })
            .collect();
        let habits = vec![Habit::new("Walk", HabitFrequency::Daily, now())];

        let ctx = builder_with(BackendBudget {
            max_tokens: 1,
            ..Default::default()
        })
        .build(&goals, &habits, &journal(3), &[], Backend::Remote, now());

        assert_eq!(ctx.included.goals, 1);
        assert_eq!(ctx.dropped.goals, 3);
        assert_eq!(ctx.dropped.habits, 1);
        assert_eq!(ctx.dropped.journal, 3);
        assert!(ctx.text.contains("Goal 0"), "most recently updated goal kept");
    }

    #[test]
    fn test_longer_of_journal_and_pulse_trimmed_first() {
        let pulse: Vec<PulseEntry> = (0..2)
            .map(|i| PulseEntry::new(3, now() - Duration::hours(i)))
            .collect();
        let untrimmed = builder_with(unlimited()).build(&[], &[], &journal(4), &pulse, Backend::Remote, now());

        // One line's worth of slack short: exactly one item must go.
        let ctx = builder_with(BackendBudget {
            max_tokens: untrimmed.estimated_tokens - 1,
            ..Default::default()
        })
        .build(&[], &[], &journal(4), &pulse, Backend::Remote, now());
        assert_eq!(ctx.dropped.journal, 1);
        assert_eq!(ctx.dropped.pulse, 0);
    }

    #[test]
    fn test_sections_in_fixed_order() {
        let goals = vec![Goal::new("Learn guitar", GoalCategory::Creativity, now())];
        let habits = vec![Habit::new("Practice scales", HabitFrequency::Daily, now())];
        let pulse = vec![PulseEntry::new(4, now()).with_note("calm\nand rested")];
        let ctx = ContextBuilder::default().build(&goals, &habits, &journal(1), &pulse, Backend::Remote, now());

        let positions: Vec<usize> = ["Active goals:", "Habits:", "Recent journal entries:", "Recent mood check-ins:"]
            .iter()
            .map(|h| ctx.text.find(h).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(ctx.text.contains("calm and rested"));
    }

    #[test]
    fn test_habits_sorted_by_streak() {
        let mut low = Habit::new("Floss", HabitFrequency::Daily, now());
        low.streak = 2;
        let mut high = Habit::new("Meditate", HabitFrequency::Daily, now());
        high.streak = 9;
        let ctx = ContextBuilder::default().build(&[], &[low, high], &[], &[], Backend::Remote, now());
        assert!(ctx.text.find("Meditate").unwrap() < ctx.text.find("Floss").unwrap());
    }

    #[test]
    fn test_deterministic_output() {
        let goals = vec![
            Goal::new("A", GoalCategory::Other, now()),
            Goal::new("B", GoalCategory::Other, now()),
        ];
        let entries = journal(7);
        let builder = ContextBuilder::default();
        let a = builder.build(&goals, &[], &entries, &[], Backend::Local, now());

        let mut shuffled = entries.clone();
        shuffled.reverse();
        let b = builder.build(&goals, &[], &shuffled, &[], Backend::Local, now());
        assert_eq!(a, b);
    }
}
