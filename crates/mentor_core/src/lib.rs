pub mod clock;
pub mod config;
pub mod entities;
pub mod error;
pub mod goal;
pub mod habit;
pub mod journal;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Backend, BackendBudget, CoachingThresholds, ContextConfig, GenerationConfig, MentorConfig};
pub use entities::{EntitySet, ReflectionEvent, UsageSignals};
pub use error::ModelError;
pub use goal::{Goal, GoalCategory, Milestone, Status};
pub use habit::{Habit, HabitFrequency};
pub use journal::{EntryField, JournalEntry, JournalVariant, PulseEntry};
