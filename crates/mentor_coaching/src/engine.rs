//! Coaching engine facade.
//!
//! Phase one is synchronous: fingerprint the entities and build the snapshot.
//! Phase two goes through the card cache, which on a miss evaluates the rule
//! chain and materializes the card. Discovery cards are recorded in the ledger
//! once the cache hands the card back.

use std::sync::Arc;

use mentor_core::{Clock, CoachingThresholds, EntitySet, GenerationConfig};

use crate::cache::CardCache;
use crate::card::{CoachingCard, Discovery};
use crate::discovery::DiscoveryLedger;
use crate::fingerprint::{Fingerprint, Presence};
use crate::generation::TextGenerator;
use crate::materialize::CardMaterializer;
use crate::rules::{Evaluation, RuleEvaluator};
use crate::snapshot::StateSnapshot;

pub struct CoachingEngine {
    evaluator: RuleEvaluator,
    materializer: CardMaterializer,
    ledger: Arc<dyn DiscoveryLedger>,
    clock: Arc<dyn Clock>,
    cache: CardCache,
}

impl CoachingEngine {
    pub fn new(
        thresholds: CoachingThresholds,
        generation: &GenerationConfig,
        generator: Option<Arc<dyn TextGenerator>>,
        ledger: Arc<dyn DiscoveryLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            evaluator: RuleEvaluator::new(thresholds),
            materializer: CardMaterializer::new(generator, generation),
            ledger,
            clock,
            cache: CardCache::new(),
        }
    }

    /// Start from a restored cache instead of an empty one.
    pub fn with_cache(mut self, cache: CardCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &CardCache {
        &self.cache
    }

    pub fn snapshot(&self, entities: &EntitySet) -> StateSnapshot {
        StateSnapshot::build(
            entities,
            self.ledger.discovered(),
            self.evaluator.thresholds(),
            self.clock.now(),
        )
    }

    /// Run the rule chain without touching the cache or the ledger.
    pub fn evaluate(&self, entities: &EntitySet) -> Evaluation {
        self.evaluator.evaluate(&self.snapshot(entities))
    }

    pub async fn current_card(&self, entities: &EntitySet) -> CoachingCard {
        let snapshot = self.snapshot(entities);
        let now = snapshot.now;
        let fingerprint = Fingerprint::compute(entities, now).with_time_facts(&snapshot);
        let live = Presence::of(entities);
        let digest = fingerprint.short().to_string();
        let already_discovered = snapshot.discovered.clone();

        let card = self
            .cache
            .get_or_compute(&fingerprint, live, move || async move {
                let evaluation = self.evaluator.evaluate(&snapshot);
                tracing::info!(
                    tier = evaluation.tier.name(),
                    card = evaluation.kind.name(),
                    digest = %digest,
                    "Selected coaching card"
                );
                self.materializer.materialize(evaluation.kind, now).await
            })
            .await;

        if let Some(discovery) = card.kind.discovery() {
            if !already_discovered.contains(&discovery) {
                self.record_discovery(discovery).await;
            }
        }
        card
    }

    /// Runs on the blocking pool; file-backed ledgers write synchronously.
    async fn record_discovery(&self, discovery: Discovery) {
        let ledger = self.ledger.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || ledger.mark(discovery)).await {
            tracing::warn!(?discovery, "Failed to record discovery: {}", e);
        }
    }
}
