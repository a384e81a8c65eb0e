use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::goal::Goal;
use crate::habit::Habit;
use crate::journal::{JournalEntry, PulseEntry};

/// A guided reflection the user just finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionEvent {
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub linked_habit_id: Option<Uuid>,
}

/// Feature-usage flags tracked by the host app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageSignals {
    pub has_used_chat: bool,
    pub last_reflection: Option<ReflectionEvent>,
}

/// Everything the host app hands over for one evaluation. Owned by the caller;
/// consumers only borrow it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySet {
    pub goals: Vec<Goal>,
    pub habits: Vec<Habit>,
    pub journal: Vec<JournalEntry>,
    pub pulse: Vec<PulseEntry>,
    pub usage: UsageSignals,
}

impl EntitySet {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty() && self.habits.is_empty() && self.journal.is_empty()
    }
}
