pub mod cache;
pub mod card;
pub mod discovery;
pub mod engine;
pub mod fingerprint;
pub mod generation;
pub mod materialize;
pub mod rules;
pub mod snapshot;

pub use cache::{CacheEntry, CardCache};
pub use card::{CardAction, CardKind, CoachingCard, ContentSource, Destination, Discovery, GoalRef, HabitRef};
pub use discovery::{DiscoveryLedger, InMemoryLedger, JsonFileLedger};
pub use engine::CoachingEngine;
pub use fingerprint::{EntityCounts, Fingerprint, Presence};
pub use generation::{GenerationError, MockGenerator, TextGenerator};
pub use materialize::{generation_prompt, template_card, CardMaterializer};
pub use rules::{Evaluation, RuleEvaluator, Tier};
pub use snapshot::{FeatureUsage, StateSnapshot, WindowMetrics};
