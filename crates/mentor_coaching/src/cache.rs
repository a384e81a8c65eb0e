//! Single-slot card cache with staleness checks and single-flight computation.
//!
//! At most one computation runs per fingerprint digest. Later callers for the
//! same digest subscribe to the in-flight result instead of computing again.
//! If the computing caller is dropped mid-flight its slot is released and one
//! of the waiters takes over.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::card::CoachingCard;
use crate::fingerprint::{Fingerprint, Presence};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub card: CoachingCard,
}

#[derive(Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    in_flight: HashMap<String, broadcast::Sender<CoachingCard>>,
}

enum Lookup {
    Fresh(CoachingCard),
    Stale,
    Corrupt,
    Miss,
}

enum Join {
    Hit(CoachingCard),
    Wait(broadcast::Receiver<CoachingCard>),
    Lead,
}

#[derive(Default)]
pub struct CardCache {
    state: Mutex<CacheState>,
}

impl CardCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a previously exported entry. Unreadable input gives an
    /// empty cache.
    pub fn restore(json: &str) -> Self {
        let cache = Self::new();
        match serde_json::from_str::<CacheEntry>(json) {
            Ok(entry) => {
                tracing::debug!(digest = entry.fingerprint.short(), "Restored cached card");
                cache.lock().entry = Some(entry);
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable card cache snapshot: {}", e);
            }
        }
        cache
    }

    pub fn export(&self) -> Option<String> {
        let state = self.lock();
        let entry = state.entry.as_ref()?;
        match serde_json::to_string(entry) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!("Failed to serialize card cache entry: {}", e);
                None
            }
        }
    }

    pub fn current(&self) -> Option<CacheEntry> {
        self.lock().entry.clone()
    }

    pub fn invalidate(&self) {
        self.lock().entry = None;
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Return the cached card for `fingerprint`, or run `compute` to produce it.
    ///
    /// `live` is the presence of the entity set the caller is looking at; a
    /// stored entry that disagrees with it is dropped even if its digest
    /// matches.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        live: Presence,
        compute: F,
    ) -> CoachingCard
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoachingCard>,
    {
        loop {
            match self.join(fingerprint, live) {
                Join::Hit(card) => {
                    tracing::debug!(digest = fingerprint.short(), "Card cache hit");
                    return card;
                }
                Join::Wait(mut rx) => {
                    tracing::debug!(digest = fingerprint.short(), "Waiting on in-flight card");
                    match rx.recv().await {
                        Ok(card) => return card,
                        Err(_) => {
                            tracing::debug!(
                                digest = fingerprint.short(),
                                "In-flight computation abandoned, retrying"
                            );
                        }
                    }
                }
                Join::Lead => break,
            }
        }

        let mut slot = InFlight {
            cache: self,
            digest: fingerprint.digest.clone(),
            completed: false,
        };
        tracing::debug!(digest = fingerprint.short(), "Card cache miss, computing");
        let card = compute().await;
        self.finish(fingerprint, &card);
        slot.completed = true;
        card
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn join(&self, fingerprint: &Fingerprint, live: Presence) -> Join {
        let mut state = self.lock();

        match lookup(state.entry.as_ref(), fingerprint, live) {
            Lookup::Fresh(card) => return Join::Hit(card),
            Lookup::Stale => {
                tracing::info!(
                    digest = fingerprint.short(),
                    "Cached card no longer matches entity presence, invalidating"
                );
                state.entry = None;
            }
            Lookup::Corrupt => {
                tracing::warn!(digest = fingerprint.short(), "Cached card is malformed, recomputing");
                state.entry = None;
            }
            Lookup::Miss => {}
        }

        if let Some(tx) = state.in_flight.get(&fingerprint.digest) {
            return Join::Wait(tx.subscribe());
        }
        let (tx, _) = broadcast::channel(1);
        state.in_flight.insert(fingerprint.digest.clone(), tx);
        Join::Lead
    }

    fn finish(&self, fingerprint: &Fingerprint, card: &CoachingCard) {
        let mut state = self.lock();
        state.entry = Some(CacheEntry {
            fingerprint: fingerprint.clone(),
            card: card.clone(),
        });
        if let Some(tx) = state.in_flight.remove(&fingerprint.digest) {
            // No receivers is fine: nobody was waiting.
            let _ = tx.send(card.clone());
        }
    }
}

fn lookup(entry: Option<&CacheEntry>, fingerprint: &Fingerprint, live: Presence) -> Lookup {
    let Some(entry) = entry else {
        return Lookup::Miss;
    };
    if entry.fingerprint.digest != fingerprint.digest {
        return Lookup::Miss;
    }
    if entry.fingerprint.presence() != live {
        return Lookup::Stale;
    }
    if !entry.card.is_well_formed() {
        return Lookup::Corrupt;
    }
    Lookup::Fresh(entry.card.clone())
}

/// Releases the in-flight slot if the owning computation never finished.
struct InFlight<'a> {
    cache: &'a CardCache,
    digest: String,
    completed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.cache.lock().in_flight.remove(&self.digest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardKind;
    use crate::fingerprint::EntityCounts;
    use crate::materialize::template_card;
    use chrono::{DateTime, TimeZone, Utc};
    use mentor_core::{EntitySet, Goal, GoalCategory, Habit, HabitFrequency};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    fn two_goals() -> EntitySet {
        EntitySet {
            goals: vec![
                Goal::new("Run a 10k", GoalCategory::Health, now()),
                Goal::new("Save for a bike", GoalCategory::Finance, now()),
            ],
            ..Default::default()
        }
    }

    fn card(title: &str) -> CoachingCard {
        let mut card = template_card(CardKind::NudgeAddHabit, now());
        card.title = title.to_string();
        card
    }

    #[tokio::test]
    async fn test_hit_skips_compute() {
        let cache = CardCache::new();
        let fp = Fingerprint::compute(&two_goals(), now());
        let live = fp.presence();

        let first = cache.get_or_compute(&fp, live, || async { card("first") }).await;
        let second = cache.get_or_compute(&fp, live, || async { card("second") }).await;
        assert_eq!(first, second);
        assert_eq!(second.title, "first");
    }

    #[tokio::test]
    async fn test_new_fingerprint_replaces_entry() {
        let cache = CardCache::new();
        let entities = two_goals();
        let fp = Fingerprint::compute(&entities, now());
        cache.get_or_compute(&fp, fp.presence(), || async { card("old") }).await;

        let mut changed = entities.clone();
        changed.habits.push(Habit::new("Stretch", HabitFrequency::Daily, now()));
        let fp2 = Fingerprint::compute(&changed, now());
        let fresh = cache.get_or_compute(&fp2, fp2.presence(), || async { card("new") }).await;

        assert_eq!(fresh.title, "new");
        assert_eq!(cache.current().unwrap().fingerprint.digest, fp2.digest);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_compute_once() {
        let cache = CardCache::new();
        let fp = Fingerprint::compute(&two_goals(), now());
        assert_eq!(fp.counts, EntityCounts { goals: 2, habits: 0, journal: 0 });
        let live = fp.presence();
        let calls = AtomicUsize::new(0);
        let calls = &calls;

        let slow = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(2)).await;
            card("slow")
        };
        let (a, b) = tokio::join!(
            cache.get_or_compute(&fp, live, slow),
            cache.get_or_compute(&fp, live, slow)
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_presence_mismatch_invalidates_despite_equal_digest() {
        let mut entities = two_goals();
        entities.habits.push(Habit::new("Stretch", HabitFrequency::Daily, now()));
        let live_fp = Fingerprint::compute(&entities, now());

        let forged = CacheEntry {
            fingerprint: Fingerprint {
                counts: EntityCounts { goals: 2, habits: 0, journal: 0 },
                ..live_fp.clone()
            },
            card: card("forged"),
        };
        let cache = CardCache::restore(&serde_json::to_string(&forged).unwrap());
        assert!(cache.current().is_some());

        let result = cache
            .get_or_compute(&live_fp, Presence::of(&entities), || async { card("recomputed") })
            .await;
        assert_eq!(result.title, "recomputed");
    }

    #[tokio::test]
    async fn test_malformed_entry_is_a_miss() {
        let fp = Fingerprint::compute(&two_goals(), now());
        let mut broken = card("ignored");
        broken.title = "   ".into();
        let entry = CacheEntry {
            fingerprint: fp.clone(),
            card: broken,
        };
        let cache = CardCache::restore(&serde_json::to_string(&entry).unwrap());

        let result = cache.get_or_compute(&fp, fp.presence(), || async { card("rebuilt") }).await;
        assert_eq!(result.title, "rebuilt");
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cache = CardCache::new();
        let fp = Fingerprint::compute(&two_goals(), now());
        cache.get_or_compute(&fp, fp.presence(), || async { card("first") }).await;
        cache.invalidate();
        assert!(cache.current().is_none());
        let again = cache.get_or_compute(&fp, fp.presence(), || async { card("second") }).await;
        assert_eq!(again.title, "second");
    }

    #[test]
    fn test_restore_garbage_gives_empty_cache() {
        let cache = CardCache::restore("{ not json");
        assert!(cache.current().is_none());
        assert!(cache.export().is_none());
    }

    #[tokio::test]
    async fn test_export_restore_keeps_hit() {
        let cache = CardCache::new();
        let fp = Fingerprint::compute(&two_goals(), now());
        cache.get_or_compute(&fp, fp.presence(), || async { card("kept") }).await;

        let restored = CardCache::restore(&cache.export().unwrap());
        let hit = restored
            .get_or_compute(&fp, fp.presence(), || async { card("recomputed") })
            .await;
        assert_eq!(hit.title, "kept");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_owner_hands_off_to_waiter() {
        let cache = Arc::new(CardCache::new());
        let fp = Fingerprint::compute(&two_goals(), now());
        let live = fp.presence();

        let owner = {
            let cache = cache.clone();
            let fp = fp.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&fp, live, || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        card("first")
                    })
                    .await
            })
        };
        while cache.in_flight_count() == 0 {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let cache = cache.clone();
            let fp = fp.clone();
            tokio::spawn(async move {
                cache
                    .get_or_compute(&fp, live, || async { card("second") })
                    .await
            })
        };
        tokio::task::yield_now().await;

        owner.abort();
        assert!(owner.await.unwrap_err().is_cancelled());

        let card = waiter.await.unwrap();
        assert_eq!(card.title, "second");
        assert_eq!(cache.in_flight_count(), 0);
    }
}
