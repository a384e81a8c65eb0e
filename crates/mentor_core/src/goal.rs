//! Goals and the lifecycle status shared with habits.
//!
//! A goal's "active" flag is never stored on its own: it is recomputed from
//! `status` every time it is read or written. Documents written by older app
//! versions may still carry an `is_active` field; it is accepted on input,
//! ignored, and always re-derived on output.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Active,
    Backlog,
    Completed,
    Abandoned,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Backlog => "backlog",
            Status::Completed => "completed",
            Status::Abandoned => "abandoned",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Status::Active)
    }
}

// ============================================================================
// Category
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCategory {
    Health,
    Career,
    Finance,
    Learning,
    Relationships,
    Personal,
    Creativity,
    #[default]
    Other,
}

impl GoalCategory {
    pub fn label(&self) -> &'static str {
        match self {
            GoalCategory::Health => "Health",
            GoalCategory::Career => "Career",
            GoalCategory::Finance => "Finance",
            GoalCategory::Learning => "Learning",
            GoalCategory::Relationships => "Relationships",
            GoalCategory::Personal => "Personal",
            GoalCategory::Creativity => "Creativity",
            GoalCategory::Other => "Other",
        }
    }
}

// ============================================================================
// Goal
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
}

impl Milestone {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            completed: false,
            target_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GoalDocument", into = "GoalDocument")]
pub struct Goal {
    pub id: Uuid,
    pub title: String,
    pub category: GoalCategory,
    pub status: Status,
    /// Progress percent, 0-100.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    /// Last meaningful update (progress, status, milestone or title change).
    pub updated_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    pub milestones: Vec<Milestone>,
}

impl Goal {
    pub fn new(title: impl Into<String>, category: GoalCategory, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            category,
            status: Status::Active,
            progress: 0,
            created_at: now,
            updated_at: now,
            deadline: None,
            milestones: Vec::new(),
        }
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_milestones(mut self, milestones: Vec<Milestone>) -> Self {
        self.milestones = milestones;
        self
    }

    /// Derived from `status`.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        if self.status != status {
            tracing::debug!(goal = %self.id, from = self.status.as_str(), to = status.as_str(), "goal status change");
            self.status = status;
            self.updated_at = now;
        }
    }

    /// Set progress (clamped to 100). An active goal reaching 100% is completed.
    pub fn set_progress(&mut self, percent: u8, now: DateTime<Utc>) {
        let percent = percent.min(100);
        if percent != self.progress {
            self.progress = percent;
            self.updated_at = now;
        }
        if self.progress >= 100 && self.is_active() {
            self.set_status(Status::Completed, now);
        }
    }

    pub fn toggle_milestone(&mut self, index: usize, now: DateTime<Utc>) -> Result<bool, ModelError> {
        let len = self.milestones.len();
        let milestone = self
            .milestones
            .get_mut(index)
            .ok_or(ModelError::MilestoneOutOfRange { index, len })?;
        milestone.completed = !milestone.completed;
        self.updated_at = now;
        Ok(milestone.completed)
    }

    pub fn milestones_done(&self) -> usize {
        self.milestones.iter().filter(|m| m.completed).count()
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days()
    }

    pub fn days_since_update(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_days().max(0)
    }
}

// ============================================================================
// Wire shape
// ============================================================================

/// Serialized goal. Carries the legacy `is_active` flag so older readers keep
/// working; the flag is write-only from this crate's point of view.
#[derive(Serialize, Deserialize)]
struct GoalDocument {
    id: Uuid,
    title: String,
    #[serde(default)]
    category: GoalCategory,
    #[serde(default)]
    status: Status,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    progress: u8,
    created_at: DateTime<Utc>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    milestones: Vec<Milestone>,
}

impl From<GoalDocument> for Goal {
    fn from(doc: GoalDocument) -> Self {
        if let Some(flag) = doc.is_active {
            if flag != doc.status.is_active() {
                tracing::debug!(
                    goal = %doc.id,
                    status = doc.status.as_str(),
                    is_active = flag,
                    "ignoring legacy is_active flag that disagrees with status"
                );
            }
        }
        Goal {
            id: doc.id,
            title: doc.title,
            category: doc.category,
            status: doc.status,
            progress: doc.progress.min(100),
            created_at: doc.created_at,
            updated_at: doc.updated_at.unwrap_or(doc.created_at),
            deadline: doc.deadline,
            milestones: doc.milestones,
        }
    }
}

impl From<Goal> for GoalDocument {
    fn from(goal: Goal) -> Self {
        GoalDocument {
            is_active: Some(goal.is_active()),
            id: goal.id,
            title: goal.title,
            category: goal.category,
            status: goal.status,
            progress: goal.progress,
            created_at: goal.created_at,
            updated_at: Some(goal.updated_at),
            deadline: goal.deadline,
            milestones: goal.milestones,
        }
    }
}
