//! Coaching card model.
//!
//! `CardKind` is closed: the rule evaluator and the materializer both match it
//! exhaustively, so a new card kind does not compile until both handle it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use mentor_core::{Goal, Habit};

// ============================================================================
// Bound entity data
// ============================================================================

/// Owned copy of the goal facts a card needs. Never a reference into caller state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRef {
    pub id: Uuid,
    pub title: String,
    pub progress: u8,
    pub deadline: Option<DateTime<Utc>>,
    pub age_days: i64,
}

impl GoalRef {
    pub fn of(goal: &Goal, now: DateTime<Utc>) -> Self {
        Self {
            id: goal.id,
            title: goal.title.clone(),
            progress: goal.progress,
            deadline: goal.deadline,
            age_days: goal.age_days(now),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitRef {
    pub id: Uuid,
    pub title: String,
    pub streak: u32,
}

impl HabitRef {
    pub fn of(habit: &Habit) -> Self {
        Self {
            id: habit.id,
            title: habit.title.clone(),
            streak: habit.streak,
        }
    }
}

// ============================================================================
// Card kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardKind {
    NewUser,
    UrgentDeadline { goal: GoalRef, hours_left: i64 },
    StreakAtRisk { habit: HabitRef },
    StalledGoal { goal: GoalRef },
    MiniWin { goal: GoalRef },
    Comeback { days_away: i64 },
    DiscoverHabitCheckIn { habit: HabitRef },
    DiscoverChat,
    DiscoverMilestones { goal: GoalRef },
    Winning { completion_rate: f32, journals_per_week: f32 },
    NudgeJournalOnly,
    NudgeAddHabit,
    NudgeAddGoal,
    NudgeStartJournal,
    Balanced { focus_goal: Option<GoalRef> },
}

impl CardKind {
    pub fn name(&self) -> &'static str {
        match self {
            CardKind::NewUser => "new_user",
            CardKind::UrgentDeadline { .. } => "urgent_deadline",
            CardKind::StreakAtRisk { .. } => "streak_at_risk",
            CardKind::StalledGoal { .. } => "stalled_goal",
            CardKind::MiniWin { .. } => "mini_win",
            CardKind::Comeback { .. } => "comeback",
            CardKind::DiscoverHabitCheckIn { .. } => "discover_habit_check_in",
            CardKind::DiscoverChat => "discover_chat",
            CardKind::DiscoverMilestones { .. } => "discover_milestones",
            CardKind::Winning { .. } => "winning",
            CardKind::NudgeJournalOnly => "nudge_journal_only",
            CardKind::NudgeAddHabit => "nudge_add_habit",
            CardKind::NudgeAddGoal => "nudge_add_goal",
            CardKind::NudgeStartJournal => "nudge_start_journal",
            CardKind::Balanced { .. } => "balanced",
        }
    }

    /// Position of the producing rule in the priority chain (1 = highest).
    pub fn tier(&self) -> u8 {
        match self {
            CardKind::NewUser => 1,
            CardKind::UrgentDeadline { .. } => 2,
            CardKind::StreakAtRisk { .. } => 3,
            CardKind::StalledGoal { .. } => 4,
            CardKind::MiniWin { .. } => 5,
            CardKind::Comeback { .. } => 6,
            CardKind::DiscoverHabitCheckIn { .. }
            | CardKind::DiscoverChat
            | CardKind::DiscoverMilestones { .. } => 7,
            CardKind::Winning { .. } => 8,
            CardKind::NudgeJournalOnly
            | CardKind::NudgeAddHabit
            | CardKind::NudgeAddGoal
            | CardKind::NudgeStartJournal => 9,
            CardKind::Balanced { .. } => 10,
        }
    }

    /// The once-per-user discovery this card represents, if any.
    pub fn discovery(&self) -> Option<Discovery> {
        match self {
            CardKind::DiscoverHabitCheckIn { .. } => Some(Discovery::HabitCheckIn),
            CardKind::DiscoverChat => Some(Discovery::Chat),
            CardKind::DiscoverMilestones { .. } => Some(Discovery::Milestones),
            _ => None,
        }
    }

    /// Whether the body is worth an external generation call.
    pub fn is_generative(&self) -> bool {
        matches!(
            self,
            CardKind::StalledGoal { .. }
                | CardKind::Comeback { .. }
                | CardKind::Winning { .. }
                | CardKind::Balanced { .. }
        )
    }
}

/// Feature-discovery sub-variants of tier 7. Each is shown at most once per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discovery {
    HabitCheckIn,
    Chat,
    Milestones,
}

// ============================================================================
// Materialized card
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "to", rename_all = "snake_case")]
pub enum Destination {
    GoalDetail { goal_id: Uuid },
    HabitDetail { habit_id: Uuid },
    MilestoneEditor { goal_id: Uuid },
    NewGoal,
    NewHabit,
    NewJournalEntry,
    Chat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardAction {
    pub label: String,
    pub destination: Destination,
}

impl CardAction {
    pub fn new(label: impl Into<String>, destination: Destination) -> Self {
        Self {
            label: label.into(),
            destination,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    Template,
    Generated,
    /// Generation was attempted and failed; the template body stands in.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingCard {
    pub kind: CardKind,
    pub title: String,
    pub body: String,
    pub actions: Vec<CardAction>,
    pub source: ContentSource,
    pub created_at: DateTime<Utc>,
}

impl CoachingCard {
    /// A cached card with blank text is treated as corrupt.
    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty() && !self.body.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_only_on_tier_seven() {
        let kinds = [
            CardKind::NewUser,
            CardKind::DiscoverChat,
            CardKind::Comeback { days_away: 4 },
            CardKind::NudgeAddGoal,
        ];
        for kind in kinds {
            assert_eq!(kind.discovery().is_some(), kind.tier() == 7, "{}", kind.name());
        }
    }

    #[test]
    fn test_card_kind_serde_tagged() {
        let kind = CardKind::Comeback { days_away: 5 };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "comeback");
        assert_eq!(json["days_away"], 5);
        let back: CardKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
    }
}
