//! Time-aware rate cache with fetch deduplication

use crate::core::rate::{FetchError, RateFetcher, RateSnapshot};
use crate::providers::util::with_retry;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

type SharedFetch = Shared<BoxFuture<'static, Result<RateSnapshot, FetchError>>>;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age after which a cached snapshot is refetched on `get`.
    pub stale_time: Duration,
    /// Idle time after which an entry is evicted.
    pub gc_time: Duration,
    pub retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(30),
            gc_time: Duration::from_secs(10 * 60),
            retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub snapshot: RateSnapshot,
    pub fetched_at: Instant,
    /// Set by `invalidate`, cleared by the next successful write.
    pub invalidated: bool,
}

impl CacheEntry {
    pub fn is_stale(&self, stale_time: Duration) -> bool {
        self.invalidated || self.fetched_at.elapsed() >= stale_time
    }
}

struct InFlight {
    id: u64,
    future: SharedFetch,
}

struct Slot {
    entry: Option<CacheEntry>,
    in_flight: Option<InFlight>,
    last_access: Instant,
}

impl Slot {
    fn new(now: Instant) -> Self {
        Self {
            entry: None,
            in_flight: None,
            last_access: now,
        }
    }
}

/// Keyed cache of rate snapshots in front of a [`RateFetcher`].
///
/// Entries are only written by the completion of the fetch that produced
/// them; readers never mutate an entry.
pub struct RateCache<F>
where
    F: RateFetcher + 'static,
{
    fetcher: Arc<F>,
    config: CacheConfig,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    next_fetch_id: AtomicU64,
}

impl<F> RateCache<F>
where
    F: RateFetcher + 'static,
{
    pub fn new(fetcher: Arc<F>, config: CacheConfig) -> Self {
        Self {
            fetcher,
            config,
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_fetch_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cached snapshot for `key` while it is fresh, fetching it
    /// otherwise. Concurrent callers share a single fetch.
    pub async fn get(&self, key: &str) -> Result<RateSnapshot, FetchError> {
        let flight = {
            let mut slots = self.slots.lock().await;
            self.sweep(&mut slots);

            let now = Instant::now();
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(now));
            slot.last_access = now;

            if let Some(entry) = &slot.entry {
                if !entry.is_stale(self.config.stale_time) {
                    debug!("Cache HIT for key: {:?}", key);
                    return Ok(entry.snapshot.clone());
                }
                debug!("Cache entry stale for key: {:?}", key);
            } else {
                debug!("Cache MISS for key: {:?}", key);
            }
            self.join_or_start(slot, key)
        };

        flight.await
    }

    /// Fetches `key` regardless of staleness.
    ///
    /// A fetch already in flight is allowed to finish first, then a new one is
    /// issued. On failure the previous entry stays available through `peek`.
    pub async fn refresh(&self, key: &str) -> Result<RateSnapshot, FetchError> {
        let pending = {
            let mut slots = self.slots.lock().await;
            self.sweep(&mut slots);

            let now = Instant::now();
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(now));
            slot.last_access = now;
            slot.in_flight.as_ref().map(|f| f.future.clone())
        };

        if let Some(pending) = pending {
            debug!("Waiting for in-flight fetch before refreshing key: {:?}", key);
            let _ = pending.await;
        }

        let flight = {
            let mut slots = self.slots.lock().await;
            let now = Instant::now();
            let slot = slots
                .entry(key.to_string())
                .or_insert_with(|| Slot::new(now));
            slot.last_access = now;
            self.join_or_start(slot, key)
        };

        flight.await
    }

    /// Marks the entry for `key` stale so the next `get` fetches it.
    /// Returns false if nothing is cached.
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(key).and_then(|slot| slot.entry.as_mut()) {
            Some(entry) => {
                entry.invalidated = true;
                debug!("Cache INVALIDATE for key: {:?}", key);
                true
            }
            None => false,
        }
    }

    /// Last known good entry for `key`, without fetching.
    pub async fn peek(&self, key: &str) -> Option<CacheEntry> {
        let slots = self.slots.lock().await;
        slots.get(key).and_then(|slot| slot.entry.clone())
    }

    /// Evicts idle entries, returning how many were removed.
    pub async fn collect_garbage(&self) -> usize {
        let mut slots = self.slots.lock().await;
        self.sweep(&mut slots)
    }

    fn sweep(&self, slots: &mut HashMap<String, Slot>) -> usize {
        let gc_time = self.config.gc_time;
        let before = slots.len();
        slots.retain(|key, slot| {
            let keep = slot.in_flight.is_some() || slot.last_access.elapsed() < gc_time;
            if !keep {
                debug!("Cache EVICT for key: {:?}", key);
            }
            keep
        });
        before - slots.len()
    }

    fn join_or_start(&self, slot: &mut Slot, key: &str) -> SharedFetch {
        if let Some(flight) = &slot.in_flight {
            debug!("Joining in-flight fetch {} for key: {:?}", flight.id, key);
            return flight.future.clone();
        }

        let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let fetcher = Arc::clone(&self.fetcher);
        let slots = Arc::clone(&self.slots);
        let retries = self.config.retries;
        let retry_delay_ms = self.config.retry_delay_ms;
        let key = key.to_string();

        let future = async move {
            debug!("Starting fetch {} for key: {:?}", id, key);
            let result = {
                let fetcher = &*fetcher;
                let market = key.as_str();
                with_retry(move || fetcher.fetch(market), retries, retry_delay_ms).await
            };

            let mut slots = slots.lock().await;
            let slot = slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(Instant::now()));
            if slot.in_flight.as_ref().is_some_and(|f| f.id == id) {
                slot.in_flight = None;
            }
            store_result(slot, &key, result)
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            id,
            future: future.clone(),
        });
        future
    }
}

fn store_result(
    slot: &mut Slot,
    key: &str,
    result: Result<RateSnapshot, FetchError>,
) -> Result<RateSnapshot, FetchError> {
    let snapshot = match result {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!("Fetch failed for key: {:?}: {}", key, e);
            return Err(e);
        }
    };

    if let Some(current) = &slot.entry {
        if current.snapshot.observed_at > snapshot.observed_at {
            debug!(
                "Discarding snapshot observed at {} for key: {:?}, cache holds {}",
                snapshot.observed_at, key, current.snapshot.observed_at
            );
            return Ok(current.snapshot.clone());
        }
    }

    debug!("Cache PUT for key: {:?}", key);
    slot.entry = Some(CacheEntry {
        snapshot: snapshot.clone(),
        fetched_at: Instant::now(),
        invalidated: false,
    });
    Ok(snapshot)
}
