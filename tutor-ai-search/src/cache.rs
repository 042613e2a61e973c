//! TTL result cache with single-flight collapsing
//!
//! Sits in front of [`RankingEngine`] and owns two maps under one lock:
//! completed entries keyed by a canonical request hash, and in-flight
//! computations keyed the same way. Identical concurrent requests collapse
//! onto one computation; the leader spawns it as a detached task and every
//! caller (leader included) awaits the broadcast result, so one caller
//! timing out never aborts work other callers are waiting on.
//!
//! Failed computations are broadcast to all waiters but never cached, so
//! transient store failures do not poison the cache.

use crate::concept::{SearchRequest, SearchResult, SourceType};
use crate::error::{Result, SearchError};
use crate::ranking::RankingEngine;
use fnv::FnvHasher;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hasher;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tutor_ai_embed::ModelVariant;

/// Outcome of one computation, fanned out to every collapsed caller.
type Outcome = Result<Arc<Vec<SearchResult>>>;

/// Cache effectiveness counters, monotonic over the cache's lifetime.
///
/// `clear` resets `entry_count` but deliberately preserves the counters so
/// hit rates stay meaningful across invalidations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from a fresh entry, plus callers that joined an
    /// in-flight computation
    pub hit_count: u64,
    /// Lookups that had to start a new computation
    pub miss_count: u64,
    /// Entries currently cached
    pub entry_count: usize,
    /// Entries removed by the size cap (TTL expiry is not counted)
    pub eviction_count: u64,
}

struct CacheEntry {
    results: Arc<Vec<SearchResult>>,
    created_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    inflight: HashMap<String, broadcast::Sender<Outcome>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

struct Inner {
    engine: RankingEngine,
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

/// Caching front-end over a [`RankingEngine`].
///
/// Cheap to clone; clones share the same cache state.
#[derive(Clone)]
pub struct SearchCache {
    inner: Arc<Inner>,
}

enum Role {
    /// Started the computation; a detached task is running it
    Leader(broadcast::Receiver<Outcome>),
    /// Joined a computation another caller started
    Waiter(broadcast::Receiver<Outcome>),
}

impl SearchCache {
    pub fn new(engine: RankingEngine) -> Self {
        let ttl = engine.config().cache_ttl;
        let max_entries = engine.config().max_cache_size;
        Self {
            inner: Arc::new(Inner {
                engine,
                ttl,
                max_entries,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Search with caching and request collapsing.
    ///
    /// With `use_cache: false` the entry lookup is skipped but the call still
    /// joins any in-flight computation for the same key, and the fresh result
    /// is written back (refresh semantics).
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        if request.query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let key = cache_key(request, self.inner.engine.config().variant);

        let role = {
            let mut state = self.inner.lock_state();

            if request.use_cache {
                if let Some(entry) = state.entries.get(&key) {
                    if entry.created_at.elapsed() < self.inner.ttl {
                        let results = entry.results.as_ref().clone();
                        state.hits += 1;
                        tracing::debug!(%key, "cache hit");
                        return Ok(results);
                    }
                    // Stale; drop it and recompute.
                    state.entries.remove(&key);
                    tracing::debug!(%key, "cache entry expired");
                }
            }

            if let Some(sender) = state.inflight.get(&key) {
                let receiver = sender.subscribe();
                state.hits += 1;
                tracing::debug!(%key, "joining in-flight search");
                Role::Waiter(receiver)
            } else {
                state.misses += 1;
                let (sender, receiver) = broadcast::channel(1);
                state.inflight.insert(key.clone(), sender.clone());
                self.spawn_computation(key.clone(), request.clone(), sender);
                Role::Leader(receiver)
            }
        };

        let mut receiver = match role {
            Role::Leader(rx) | Role::Waiter(rx) => rx,
        };

        let outcome = match request.timeout {
            Some(timeout) => tokio::time::timeout(timeout, receiver.recv())
                .await
                .map_err(|_| SearchError::Timeout)?,
            None => receiver.recv().await,
        };
        let outcome = outcome.map_err(|_| SearchError::task("search result channel closed"))?;
        outcome.map(|results| results.as_ref().clone())
    }

    /// Run the computation on a detached task so a timed-out caller cannot
    /// cancel it out from under co-waiters.
    fn spawn_computation(
        &self,
        key: String,
        request: SearchRequest,
        sender: broadcast::Sender<Outcome>,
    ) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome: Outcome = inner.engine.search(&request).await.map(Arc::new);
            {
                let mut state = inner.lock_state();
                state.inflight.remove(&key);
                if let Ok(results) = &outcome {
                    state.entries.insert(
                        key,
                        CacheEntry {
                            results: Arc::clone(results),
                            created_at: Instant::now(),
                        },
                    );
                    while state.entries.len() > inner.max_entries {
                        evict_oldest(&mut state);
                    }
                }
            }
            // No receivers left means every caller already timed out.
            let _ = sender.send(outcome);
        });
    }

    /// Drop all cached entries. In-flight computations and counters are
    /// unaffected.
    pub fn clear(&self) {
        let mut state = self.inner.lock_state();
        let dropped = state.entries.len();
        state.entries.clear();
        tracing::info!(dropped, "search cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock_state();
        CacheStats {
            hit_count: state.hits,
            miss_count: state.misses,
            entry_count: state.entries.len(),
            eviction_count: state.evictions,
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        // Writers never panic while holding the lock; poisoning would mean a
        // bug worth crashing on.
        self.state.lock().expect("cache state lock poisoned")
    }
}

fn evict_oldest(state: &mut CacheState) {
    let oldest = state
        .entries
        .iter()
        .min_by_key(|(_, entry)| entry.created_at)
        .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
        state.entries.remove(&key);
        state.evictions += 1;
        tracing::debug!(%key, "evicted oldest cache entry");
    }
}

/// Canonical parameters hashed into the cache key. Anything that changes the
/// result set must appear here; `use_cache` and `timeout` deliberately do not.
#[derive(Serialize)]
struct KeyParams<'a> {
    query: String,
    limit: usize,
    threshold: String,
    source_types: Option<Vec<&'a str>>,
    variant: &'a str,
}

/// Stable, versioned cache key for a request.
///
/// Queries are trimmed and lowercased; source type filters are sorted and
/// deduplicated so filter order does not fragment the cache. The threshold
/// participates via its effective (clamped) value, the variant via its
/// resolved value, so an explicit default and an omitted variant share a key.
fn cache_key(request: &SearchRequest, default_variant: ModelVariant) -> String {
    let source_types = request.source_types.as_ref().map(|types| {
        let mut names: Vec<&str> = types.iter().map(SourceType::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names
    });
    let params = KeyParams {
        query: request.normalized_query(),
        limit: request.limit,
        threshold: format!("{:.4}", request.effective_threshold()),
        source_types,
        variant: request.variant_or(default_variant).id(),
    };
    let serialized = serde_json::to_string(&params).expect("key params always serialize");
    let mut hasher = FnvHasher::default();
    hasher.write(serialized.as_bytes());
    format!("v1:{:x}", hasher.finish())
}
