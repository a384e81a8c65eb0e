//! Card materialization: template fill, optionally replaced by generated text.
//!
//! Every kind has a synchronous template. Generative kinds also get a prompt
//! built from their bound data; the external call runs under a timeout and any
//! failure keeps the template body (`ContentSource::Fallback`).

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use mentor_core::GenerationConfig;

use crate::card::{CardAction, CardKind, CoachingCard, ContentSource, Destination};
use crate::generation::{GenerationError, TextGenerator};

pub struct CardMaterializer {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl CardMaterializer {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, config: &GenerationConfig) -> Self {
        Self {
            generator: generator.filter(|_| config.enabled),
            timeout: config.timeout(),
        }
    }

    pub fn template_only() -> Self {
        Self {
            generator: None,
            timeout: Duration::ZERO,
        }
    }

    /// Fill the template, then try to replace the body with generated text.
    pub async fn materialize(&self, kind: CardKind, now: DateTime<Utc>) -> CoachingCard {
        let mut card = template_card(kind, now);
        let Some(generator) = &self.generator else {
            return card;
        };
        let Some(prompt) = generation_prompt(&card.kind) else {
            return card;
        };

        match self.generate(generator.as_ref(), &prompt).await {
            Ok(text) => {
                card.body = text;
                card.source = ContentSource::Generated;
            }
            Err(e) => {
                tracing::warn!(card = card.kind.name(), "Card generation failed, using template: {}", e);
                card.source = ContentSource::Fallback;
            }
        }
        card
    }

    async fn generate(&self, generator: &dyn TextGenerator, prompt: &str) -> Result<String, GenerationError> {
        let text = tokio::time::timeout(self.timeout, generator.generate(prompt))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text.to_string())
    }
}

// ============================================================================
// Templates
// ============================================================================

pub fn template_card(kind: CardKind, now: DateTime<Utc>) -> CoachingCard {
    let (title, body, actions) = match &kind {
        CardKind::NewUser => (
            "Welcome! Let's set your first goal".to_string(),
            "Start with one thing you want to move forward this month. Small and specific works best."
                .to_string(),
            vec![
                CardAction::new("Create a goal", Destination::NewGoal),
                CardAction::new("Start a habit", Destination::NewHabit),
                CardAction::new("Write in your journal", Destination::NewJournalEntry),
            ],
        ),
        CardKind::UrgentDeadline { goal, hours_left } => (
            if *hours_left == 0 {
                format!("\"{}\" is due within the hour", goal.title)
            } else {
                format!("\"{}\" is due in {}h", goal.title, hours_left)
            },
            format!(
                "You're at {}%. What's the one step that gets it over the line today?",
                goal.progress
            ),
            vec![CardAction::new("Open goal", Destination::GoalDetail { goal_id: goal.id })],
        ),
        CardKind::StreakAtRisk { habit } => (
            format!("Protect your {}-in-a-row streak", habit.streak),
            format!(
                "\"{}\" isn't checked off yet. A quick check-in keeps the streak going.",
                habit.title
            ),
            vec![CardAction::new("Check in", Destination::HabitDetail { habit_id: habit.id })],
        ),
        CardKind::StalledGoal { goal } => (
            format!("\"{}\" could use a nudge", goal.title),
            format!(
                "It's been {} days and you're at {}%. Pick the smallest next step and do it now.",
                goal.age_days, goal.progress
            ),
            vec![
                CardAction::new("Open goal", Destination::GoalDetail { goal_id: goal.id }),
                CardAction::new("Add milestones", Destination::MilestoneEditor { goal_id: goal.id }),
            ],
        ),
        CardKind::MiniWin { goal } => (
            "Find a mini win".to_string(),
            format!(
                "\"{}\" hasn't moved yet. Spend five minutes on it today; any progress counts.",
                goal.title
            ),
            vec![
                CardAction::new("Open goal", Destination::GoalDetail { goal_id: goal.id }),
                CardAction::new("Write about it", Destination::NewJournalEntry),
            ],
        ),
        CardKind::Comeback { days_away } => (
            "Welcome back".to_string(),
            format!(
                "It's been {} days since your last entry. How have things been?",
                days_away
            ),
            vec![CardAction::new("Write an entry", Destination::NewJournalEntry)],
        ),
        CardKind::DiscoverHabitCheckIn { habit } => (
            "Nice reflection!".to_string(),
            format!("You just reflected on \"{}\". Mark it done for today?", habit.title),
            vec![CardAction::new("Check in", Destination::HabitDetail { habit_id: habit.id })],
        ),
        CardKind::DiscoverChat => (
            "Talk it through".to_string(),
            "Your mentor chat knows your goals and journal. Ask it for a plan or a pep talk."
                .to_string(),
            vec![CardAction::new("Open chat", Destination::Chat)],
        ),
        CardKind::DiscoverMilestones { goal } => (
            format!("Break \"{}\" into milestones", goal.title),
            "Milestones turn a big goal into steps you can finish this week.".to_string(),
            vec![CardAction::new(
                "Add milestones",
                Destination::MilestoneEditor { goal_id: goal.id },
            )],
        ),
        CardKind::Winning {
            completion_rate,
            journals_per_week,
        } => (
            "You're on a roll".to_string(),
            format!(
                "{:.0}% of your habits done and {:.1} journal entries a week lately. Keep it up.",
                completion_rate * 100.0,
                journals_per_week
            ),
            vec![CardAction::new("Reflect on it", Destination::NewJournalEntry)],
        ),
        CardKind::NudgeJournalOnly => (
            "Turn reflections into goals".to_string(),
            "Your journal is full of ideas. Pick one and make it a goal.".to_string(),
            vec![CardAction::new("Create a goal", Destination::NewGoal)],
        ),
        CardKind::NudgeAddHabit => (
            "Back your goals with a habit".to_string(),
            "Goals move faster with a small, regular habit behind them.".to_string(),
            vec![CardAction::new("Add a habit", Destination::NewHabit)],
        ),
        CardKind::NudgeAddGoal => (
            "Point your habits at a goal".to_string(),
            "Your habits are going well. Give them a goal to aim at.".to_string(),
            vec![CardAction::new("Create a goal", Destination::NewGoal)],
        ),
        CardKind::NudgeStartJournal => (
            "Try a two-minute journal".to_string(),
            "Writing down how your day went helps you notice what's working.".to_string(),
            vec![CardAction::new("Write an entry", Destination::NewJournalEntry)],
        ),
        CardKind::Balanced { focus_goal } => match focus_goal {
            Some(goal) => (
                "Keep the momentum".to_string(),
                format!(
                    "Next up: \"{}\" at {}%. What's one step for today?",
                    goal.title, goal.progress
                ),
                vec![
                    CardAction::new("Open goal", Destination::GoalDetail { goal_id: goal.id }),
                    CardAction::new("Talk to your mentor", Destination::Chat),
                ],
            ),
            None => (
                "Keep the momentum".to_string(),
                "Check in with how today went and what you want from tomorrow.".to_string(),
                vec![CardAction::new("Write an entry", Destination::NewJournalEntry)],
            ),
        },
    };

    CoachingCard {
        kind,
        title,
        body,
        actions,
        source: ContentSource::Template,
        created_at: now,
    }
}

/// Prompt for kinds whose body is generated; `None` keeps the template.
pub fn generation_prompt(kind: &CardKind) -> Option<String> {
    const STYLE: &str = "Reply with 2-3 warm, concrete sentences addressed to the user. No markdown, no lists.";
    match kind {
        CardKind::StalledGoal { goal } => Some(format!(
            "The user's goal \"{}\" was created {} days ago and is at {}% progress. \
             Encourage them and suggest one small next step. {}",
            goal.title, goal.age_days, goal.progress, STYLE
        )),
        CardKind::Comeback { days_away } => Some(format!(
            "The user hasn't written in their journal for {} days. \
             Welcome them back without guilt and invite a short entry. {}",
            days_away, STYLE
        )),
        CardKind::Winning {
            completion_rate,
            journals_per_week,
        } => Some(format!(
            "The user completed {:.0}% of their habits and wrote {:.1} journal entries per week recently. \
             Celebrate this and suggest how to keep it sustainable. {}",
            completion_rate * 100.0,
            journals_per_week,
            STYLE
        )),
        CardKind::Balanced { focus_goal } => Some(match focus_goal {
            Some(goal) => format!(
                "The user is steadily working on goals, habits and journaling. Their current focus is \
                 \"{}\" at {}% progress. Offer a short, motivating nudge for today. {}",
                goal.title, goal.progress, STYLE
            ),
            None => format!(
                "The user is keeping up with their habits and journal. Offer a short, motivating nudge for today. {}",
                STYLE
            ),
        }),
        CardKind::NewUser
        | CardKind::UrgentDeadline { .. }
        | CardKind::StreakAtRisk { .. }
        | CardKind::MiniWin { .. }
        | CardKind::DiscoverHabitCheckIn { .. }
        | CardKind::DiscoverChat
        | CardKind::DiscoverMilestones { .. }
        | CardKind::NudgeJournalOnly
        | CardKind::NudgeAddHabit
        | CardKind::NudgeAddGoal
        | CardKind::NudgeStartJournal => None,
    }
}
