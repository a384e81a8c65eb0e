//! Priority rule chain.
//!
//! Ten tiers evaluated in a fixed order; the first tier whose predicate holds
//! produces the card and nothing after it is evaluated. The last tier always
//! matches, so evaluation is total.

use mentor_core::CoachingThresholds;

use crate::card::{CardKind, Discovery};
use crate::snapshot::StateSnapshot;

// ============================================================================
// Tiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    NewUser,
    UrgentDeadline,
    StreakAtRisk,
    StalledGoal,
    MiniWin,
    Comeback,
    FeatureDiscovery,
    Winning,
    PartialData,
    Balanced,
}

impl Tier {
    pub const ORDER: [Tier; 10] = [
        Tier::NewUser,
        Tier::UrgentDeadline,
        Tier::StreakAtRisk,
        Tier::StalledGoal,
        Tier::MiniWin,
        Tier::Comeback,
        Tier::FeatureDiscovery,
        Tier::Winning,
        Tier::PartialData,
        Tier::Balanced,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tier::NewUser => "new_user",
            Tier::UrgentDeadline => "urgent_deadline",
            Tier::StreakAtRisk => "streak_at_risk",
            Tier::StalledGoal => "stalled_goal",
            Tier::MiniWin => "mini_win",
            Tier::Comeback => "comeback",
            Tier::FeatureDiscovery => "feature_discovery",
            Tier::Winning => "winning",
            Tier::PartialData => "partial_data",
            Tier::Balanced => "balanced",
        }
    }

    /// Evaluate this tier's predicate, returning the bound card kind on a match.
    fn check(&self, s: &StateSnapshot, t: &CoachingThresholds) -> Option<CardKind> {
        match self {
            Tier::NewUser => (!s.has_any_data()).then_some(CardKind::NewUser),

            Tier::UrgentDeadline => s.urgent_deadline_goal.as_ref().map(|goal| {
                let hours_left = goal
                    .deadline
                    .map(|d| (d - s.now).num_hours().max(0))
                    .unwrap_or_default();
                CardKind::UrgentDeadline {
                    goal: goal.clone(),
                    hours_left,
                }
            }),

            Tier::StreakAtRisk => s
                .at_risk_streak_habit
                .clone()
                .map(|habit| CardKind::StreakAtRisk { habit }),

            Tier::StalledGoal => s.stalled_goal.clone().map(|goal| CardKind::StalledGoal { goal }),

            Tier::MiniWin => {
                if s.journal_count > 0 {
                    return None;
                }
                s.mini_win_goal.clone().map(|goal| CardKind::MiniWin { goal })
            }

            Tier::Comeback => s
                .days_since_last_journal
                .filter(|days| *days >= t.comeback_min_days)
                .map(|days_away| CardKind::Comeback { days_away }),

            Tier::FeatureDiscovery => discovery_card(s),

            Tier::Winning => {
                let rate = s.window.completion_rate?;
                (rate >= t.winning_completion_rate
                    && s.window.journals_per_week >= t.winning_journals_per_week)
                    .then_some(CardKind::Winning {
                        completion_rate: rate,
                        journals_per_week: s.window.journals_per_week,
                    })
            }

            Tier::PartialData => {
                match (s.uses_goals(), s.uses_habits(), s.uses_journal()) {
                    (false, false, true) => Some(CardKind::NudgeJournalOnly),
                    (true, false, _) => Some(CardKind::NudgeAddHabit),
                    (false, true, _) => Some(CardKind::NudgeAddGoal),
                    (true, true, false) => Some(CardKind::NudgeStartJournal),
                    // All three in use, or only inactive data
                    (true, true, true) | (false, false, false) => None,
                }
            }

            Tier::Balanced => Some(balanced(s)),
        }
    }
}

/// Tier 7 sub-checks in order; each fires only if not yet discovered.
fn discovery_card(s: &StateSnapshot) -> Option<CardKind> {
    if !s.is_discovered(Discovery::HabitCheckIn) {
        if let Some(habit) = &s.usage.reflection_pending_habit {
            return Some(CardKind::DiscoverHabitCheckIn { habit: habit.clone() });
        }
    }
    if !s.is_discovered(Discovery::Chat)
        && !s.usage.has_used_chat
        && (s.uses_goals() || s.uses_journal())
    {
        return Some(CardKind::DiscoverChat);
    }
    if !s.is_discovered(Discovery::Milestones) {
        if let Some(goal) = &s.usage.goal_without_milestones {
            return Some(CardKind::DiscoverMilestones { goal: goal.clone() });
        }
    }
    None
}

fn balanced(s: &StateSnapshot) -> CardKind {
    CardKind::Balanced {
        focus_goal: s.focus_goal.clone(),
    }
}

// ============================================================================
// RuleEvaluator
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub tier: Tier,
    pub kind: CardKind,
}

#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    thresholds: CoachingThresholds,
}

impl RuleEvaluator {
    pub fn new(thresholds: CoachingThresholds) -> Self {
        Self {
            thresholds: thresholds.sanitized(),
        }
    }

    pub fn thresholds(&self) -> &CoachingThresholds {
        &self.thresholds
    }

    /// Walk the tiers in order. First match wins.
    pub fn evaluate(&self, snapshot: &StateSnapshot) -> Evaluation {
        for tier in Tier::ORDER {
            if let Some(kind) = tier.check(snapshot, &self.thresholds) {
                tracing::debug!("RuleEvaluator: tier '{}' matched → {}", tier.name(), kind.name());
                return Evaluation { tier, kind };
            }
        }
        Evaluation {
            tier: Tier::Balanced,
            kind: balanced(snapshot),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
