//! Per-user bandit manager: the front door for the recommendation and feedback
//! pipelines.
//!
//! [`CmabManager`] owns every user's [`UserBanditState`] and exposes:
//!
//! ```text
//! let sel = mgr.get_selection(user, &ctx, k).await?;          // top-k categories
//! let ranked = mgr.rank_candidates(user, &ctx, recipes, k).await?;
//! mgr.record_feedback(user, &recipe, FeedbackType::Cooked).await?;
//! let summary = mgr.get_preference_summary(user).await?;
//! ```
//!
//! ## State lifecycle
//!
//! 1. **Load on demand**: a cache miss inserts an empty entry, then reads the
//!    store under that entry's lock, so concurrent first requests load once.
//! 2. **Write-through**: every mutation schedules an asynchronous write-back of
//!    the full document.  Writes for one user are ordered by version; an older
//!    write never lands after a newer one.
//! 3. **Eviction**: the cache is LRU-bounded.  An entry is only evicted when
//!    nobody holds it, no write-back is in flight and its last write-back did
//!    not fail, so eviction never loses data.
//!
//! ## Concurrency
//!
//! All operations for one user are serialized on that user's
//! `tokio::sync::Mutex`; different users never contend beyond a short
//! bookkeeping lock on the cache index.  Write-backs are spawned on the
//! ambient tokio runtime, so mutating operations must run inside one.
//!
//! ## Degradation
//!
//! - Store read fails on a read path: serve a fresh cold-start state (not
//!   cached; the next request retries the load).
//! - Store read fails on feedback: [`CmabError::StateUnavailable`]; nothing is
//!   applied, so a cold-start state can never overwrite the stored document.
//! - Store write fails: the in-memory update stands, the write is retried with
//!   exponential backoff, and the caller still sees success.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{CmabError, Result, StoreError, StoreResult};
use crate::{
    apply_feedback_at, classify, extract_context, rank_for_selection, select_top_k, ArmStats,
    BanditDocument, BanditStore, BoostConfig, Category, Context, ContextConfig, FeedbackEvent,
    FeedbackType, InventoryItem, PreferenceSummary, RankedRecipe, Recipe, Selection,
    SelectorConfig, UserBanditState,
};

// ============================================================================
// Configuration
// ============================================================================

/// Retry policy for failed write-backs.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WriteBackConfig {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Ceiling for a single backoff sleep.
    pub max_backoff_ms: u64,
}

impl Default for WriteBackConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_ms: 10_000,
        }
    }
}

impl WriteBackConfig {
    /// Sleep before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let mult = if self.backoff_multiplier.is_finite() && self.backoff_multiplier >= 1.0 {
            self.backoff_multiplier
        } else {
            1.0
        };
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let ms = (self.initial_backoff_ms as f64) * mult.powi(exp);
        let ms = if ms.is_finite() { ms } else { f64::MAX };
        Duration::from_millis(ms.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Full configuration for a [`CmabManager`].
///
/// Start from [`ManagerConfig::default()`] and adjust with the `with_*` methods
/// or by setting fields directly.  Deserializes with every field optional.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    // --- Policy ---
    pub selector: SelectorConfig,
    pub context: ContextConfig,
    pub boost: BoostConfig,

    // --- Persistence ---
    pub write_back: WriteBackConfig,
    pub load_timeout_ms: u64,
    pub save_timeout_ms: u64,

    // --- Cache ---
    /// Soft bound on resident users.  Entries that cannot be evicted safely
    /// may push the cache over this bound temporarily.
    pub cache_capacity: usize,

    /// Seed for the manager's sampling RNG (deterministic by default).
    pub seed: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            selector: SelectorConfig::default(),
            context: ContextConfig::default(),
            boost: BoostConfig::default(),
            write_back: WriteBackConfig::default(),
            load_timeout_ms: 2_000,
            save_timeout_ms: 2_000,
            cache_capacity: 1024,
            seed: 0,
        }
    }
}

impl ManagerConfig {
    pub fn with_selector(mut self, selector: SelectorConfig) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_boost(mut self, boost: BoostConfig) -> Self {
        self.boost = boost;
        self
    }

    pub fn with_write_back(mut self, write_back: WriteBackConfig) -> Self {
        self.write_back = write_back;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_timeouts(mut self, load_ms: u64, save_ms: u64) -> Self {
        self.load_timeout_ms = load_ms;
        self.save_timeout_ms = save_ms;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Acknowledgment for an applied feedback event.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FeedbackAck {
    pub user_id: String,
    pub recipe_id: u64,
    pub category: Category,
    pub feedback_type: FeedbackType,
    /// Arm statistics right after the update.
    pub stats: ArmStats,
    /// Per-user mutation counter (since the entry was cached) of this update.
    pub version: u64,
}

/// Output of [`CmabManager::rank_candidates`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Ranking {
    pub selection: Selection,
    pub ranked: Vec<RankedRecipe>,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub resident: usize,
}

// ============================================================================
// Cache internals
// ============================================================================

struct UserEntry {
    user_id: String,
    /// `None` until loaded from the store.
    state: tokio::sync::Mutex<Option<UserBanditState>>,
    /// Bumped on every mutation, under `state`'s lock.
    version: AtomicU64,
    /// Last version known to be in the store. Orders write-backs.
    persisted: tokio::sync::Mutex<u64>,
    inflight: AtomicUsize,
    /// Last write-back exhausted its retries.
    unsaved: AtomicBool,
    /// Dropped by `reset_user`; pending write-backs are discarded.
    retired: AtomicBool,
}

impl UserEntry {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            state: tokio::sync::Mutex::new(None),
            version: AtomicU64::new(0),
            persisted: tokio::sync::Mutex::new(0),
            inflight: AtomicUsize::new(0),
            unsaved: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        }
    }
}

struct CacheSlot {
    entry: Arc<UserEntry>,
    last_access: u64,
}

impl CacheSlot {
    fn evictable(&self) -> bool {
        Arc::strong_count(&self.entry) == 1
            && self.entry.inflight.load(Ordering::Acquire) == 0
            && !self.entry.unsaved.load(Ordering::Acquire)
    }
}

struct UserCache {
    slots: HashMap<String, CacheSlot>,
    tick: u64,
    capacity: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl UserCache {
    fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            tick: 0,
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn get_or_insert(&mut self, user_id: &str) -> Arc<UserEntry> {
        self.tick += 1;
        let tick = self.tick;
        if let Some(slot) = self.slots.get_mut(user_id) {
            slot.last_access = tick;
            self.hits += 1;
            return Arc::clone(&slot.entry);
        }
        self.misses += 1;
        let entry = Arc::new(UserEntry::new(user_id));
        self.slots.insert(
            user_id.to_string(),
            CacheSlot {
                entry: Arc::clone(&entry),
                last_access: tick,
            },
        );
        debug!(user_id, resident = self.slots.len(), "bandit cache miss");
        self.evict_over_capacity();
        entry
    }

    /// Evict least-recently-used evictable entries until within capacity.
    fn evict_over_capacity(&mut self) {
        while self.slots.len() > self.capacity {
            let victim = self
                .slots
                .iter()
                .filter(|(_, s)| s.evictable())
                .min_by_key(|(_, s)| s.last_access)
                .map(|(k, _)| k.clone());
            match victim {
                Some(k) => {
                    self.slots.remove(&k);
                    self.evictions += 1;
                    debug!(user_id = %k, "evicted bandit state");
                }
                None => {
                    debug!(
                        resident = self.slots.len(),
                        capacity = self.capacity,
                        "bandit cache over capacity, nothing evictable"
                    );
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

struct Inner<S> {
    store: S,
    cfg: ManagerConfig,
    cache: Mutex<UserCache>,
    rng: Mutex<StdRng>,
}

/// Per-user contextual bandit manager over a [`BanditStore`].
///
/// Cheap to clone; clones share state.
///
/// # Example
///
/// ```rust
/// use recipe_cmab::{CmabManager, Context, FeedbackType, InMemoryStore, ManagerConfig, Recipe};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mgr = CmabManager::new(InMemoryStore::new(), ManagerConfig::default());
///
/// let sel = mgr.get_selection("alice", &Context::default(), 3).await.unwrap();
/// assert_eq!(sel.len(), 3);
///
/// let carbonara = Recipe::new(7, "Carbonara").with_tags(["italian"]);
/// let ack = mgr.record_feedback("alice", &carbonara, FeedbackType::Cooked).await.unwrap();
/// assert_eq!(ack.stats.total_pulls, 1);
/// # });
/// ```
pub struct CmabManager<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for CmabManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: BanditStore + 'static> CmabManager<S> {
    pub fn new(store: S, cfg: ManagerConfig) -> Self {
        let cache = UserCache::new(cfg.cache_capacity);
        let rng = StdRng::seed_from_u64(cfg.seed);
        Self {
            inner: Arc::new(Inner {
                store,
                cfg,
                cache: Mutex::new(cache),
                rng: Mutex::new(rng),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.cfg
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// [`extract_context`] with this manager's [`ContextConfig`].
    pub fn context_for<Tz: TimeZone>(
        &self,
        inventory: &[InventoryItem],
        now: &DateTime<Tz>,
    ) -> Context {
        extract_context(inventory, now, self.inner.cfg.context)
    }

    // -----------------------------------------------------------------------
    // Read paths
    // -----------------------------------------------------------------------

    /// Top-`k` categories for `user_id`.
    ///
    /// Never mutates arm statistics.  A store outage degrades to a cold-start
    /// selection.
    pub async fn get_selection(
        &self,
        user_id: &str,
        context: &Context,
        k: usize,
    ) -> Result<Selection> {
        let entry = self.entry(user_id)?;
        let cfg = self.inner.cfg.selector;
        let selection = match self.lock_loaded(&entry).await {
            Ok(mut guard) => {
                let state = guard.get_or_insert_with(UserBanditState::new);
                self.sample(state, context, k, cfg)
            }
            Err(e) => {
                warn!(user_id, error = %e, "bandit state unavailable, selecting from cold start");
                self.sample(&UserBanditState::new(), context, k, cfg)
            }
        };
        debug!(
            user_id,
            k,
            mode = ?selection.mode,
            categories = ?selection.categories,
            "selected categories"
        );
        Ok(selection)
    }

    /// Select top-`k` categories, then boost and rank `candidates` against them.
    pub async fn rank_candidates(
        &self,
        user_id: &str,
        context: &Context,
        candidates: Vec<Recipe>,
        k: usize,
    ) -> Result<Ranking> {
        let selection = self.get_selection(user_id, context, k).await?;
        let ranked = rank_for_selection(candidates, &selection, self.inner.cfg.boost);
        Ok(Ranking { selection, ranked })
    }

    /// Learned preferences for `user_id`, best first.
    pub async fn get_preference_summary(&self, user_id: &str) -> Result<PreferenceSummary> {
        let entry = self.entry(user_id)?;
        let threshold = self.inner.cfg.selector.cold_start_threshold;
        let summary = match self.lock_loaded(&entry).await {
            Ok(mut guard) => {
                let state = guard.get_or_insert_with(UserBanditState::new);
                PreferenceSummary::from_state(state, threshold)
            }
            Err(e) => {
                warn!(user_id, error = %e, "bandit state unavailable, summarizing cold start");
                PreferenceSummary::from_state(&UserBanditState::new(), threshold)
            }
        };
        Ok(summary)
    }

    /// Current in-memory state for `user_id` (loads on miss).
    pub async fn snapshot(&self, user_id: &str) -> Result<UserBanditState> {
        let entry = self.entry(user_id)?;
        let mut guard =
            self.lock_loaded(&entry)
                .await
                .map_err(|source| CmabError::StateUnavailable {
                    user_id: user_id.to_string(),
                    source,
                })?;
        Ok(guard.get_or_insert_with(UserBanditState::new).clone())
    }

    // -----------------------------------------------------------------------
    // Feedback
    // -----------------------------------------------------------------------

    /// Classify `recipe` and apply `feedback` to that category's arm.
    pub async fn record_feedback(
        &self,
        user_id: &str,
        recipe: &Recipe,
        feedback: FeedbackType,
    ) -> Result<FeedbackAck> {
        let event = FeedbackEvent {
            user_id: user_id.to_string(),
            recipe_id: recipe.id,
            feedback_type: feedback,
            category: classify(recipe),
            timestamp: Utc::now(),
        };
        self.record_event(&event).await
    }

    /// Apply an already-classified feedback event.
    ///
    /// Succeeds once the in-memory update is applied; persistence happens in
    /// the background.
    pub async fn record_event(&self, event: &FeedbackEvent) -> Result<FeedbackAck> {
        let user_id = event.user_id.as_str();
        let entry = self.entry(user_id)?;
        let mut guard = self.lock_loaded(&entry).await.map_err(|source| {
            warn!(user_id, error = %source, "bandit state unavailable, feedback not applied");
            CmabError::StateUnavailable {
                user_id: user_id.to_string(),
                source,
            }
        })?;
        let state = guard.get_or_insert_with(UserBanditState::new);
        let stats = apply_feedback_at(state, event.category, event.feedback_type, event.timestamp);
        let doc = state.to_document();
        let version = entry.version.fetch_add(1, Ordering::AcqRel) + 1;
        // Spawned while the state lock is held so versions reach the writer in order.
        self.schedule_write_back(Arc::clone(&entry), doc, version);
        drop(guard);
        self.release(entry);

        debug!(
            user_id,
            recipe_id = event.recipe_id,
            category = %event.category,
            feedback = %event.feedback_type,
            alpha = stats.alpha,
            beta = stats.beta,
            total_pulls = stats.total_pulls,
            "applied feedback"
        );
        Ok(FeedbackAck {
            user_id: user_id.to_string(),
            recipe_id: event.recipe_id,
            category: event.category,
            feedback_type: event.feedback_type,
            stats,
            version,
        })
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Forget everything learned about `user_id`: drop the cache entry and
    /// delete the stored document.
    ///
    /// Feedback that races the reset on the old entry is discarded.
    /// Returns whether a stored document existed.
    pub async fn reset_user(&self, user_id: &str) -> Result<bool> {
        if user_id.is_empty() {
            return Err(CmabError::InvalidUserId);
        }
        let removed = self.inner.cache.lock().slots.remove(user_id);
        if let Some(slot) = removed {
            let _state = slot.entry.state.lock().await;
            slot.entry.retired.store(true, Ordering::Release);
            let _persisted = slot.entry.persisted.lock().await;
            let existed = self.delete_with_timeout(user_id).await?;
            info!(user_id, existed, "reset bandit state");
            return Ok(existed);
        }
        let existed = self.delete_with_timeout(user_id).await?;
        info!(user_id, existed, "reset bandit state");
        Ok(existed)
    }

    /// Drop every cache entry that can be dropped without losing data.
    ///
    /// Returns how many entries were dropped.
    pub fn clear_cache(&self) -> usize {
        let mut cache = self.inner.cache.lock();
        let before = cache.slots.len();
        cache.slots.retain(|_, s| !s.evictable());
        let dropped = before - cache.slots.len();
        cache.evictions += dropped as u64;
        debug!(dropped, resident = cache.slots.len(), "cleared bandit cache");
        dropped
    }

    /// Persist every cached state that is newer than its stored copy.
    ///
    /// One attempt per user, no backoff.  Returns how many users remain unsaved.
    pub async fn flush(&self) -> usize {
        let entries: Vec<Arc<UserEntry>> = self
            .inner
            .cache
            .lock()
            .slots
            .values()
            .map(|s| Arc::clone(&s.entry))
            .collect();

        let mut unsaved = 0;
        for entry in entries {
            let (doc, version) = {
                let guard = entry.state.lock().await;
                match guard.as_ref() {
                    Some(state) => (state.to_document(), entry.version.load(Ordering::Acquire)),
                    None => continue,
                }
            };
            let mut persisted = entry.persisted.lock().await;
            if *persisted >= version || entry.retired.load(Ordering::Acquire) {
                continue;
            }
            match self.save_with_timeout(&entry.user_id, &doc).await {
                Ok(()) => {
                    *persisted = version;
                    entry.unsaved.store(false, Ordering::Release);
                }
                Err(e) => {
                    warn!(user_id = %entry.user_id, error = %e, "flush failed");
                    entry.unsaved.store(true, Ordering::Release);
                    unsaved += 1;
                }
            }
        }
        unsaved
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.inner.cache.lock();
        CacheStats {
            hits: cache.hits,
            misses: cache.misses,
            evictions: cache.evictions,
            resident: cache.slots.len(),
        }
    }

    /// Number of write-backs spawned but not yet finished, across cached users.
    pub fn pending_write_backs(&self) -> usize {
        self.inner
            .cache
            .lock()
            .slots
            .values()
            .map(|s| s.entry.inflight.load(Ordering::Acquire))
            .sum()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn entry(&self, user_id: &str) -> Result<Arc<UserEntry>> {
        if user_id.is_empty() {
            return Err(CmabError::InvalidUserId);
        }
        Ok(self.inner.cache.lock().get_or_insert(user_id))
    }

    fn sample(
        &self,
        state: &UserBanditState,
        context: &Context,
        k: usize,
        cfg: SelectorConfig,
    ) -> Selection {
        let mut rng = self.inner.rng.lock();
        select_top_k(state, context, k, cfg, &mut *rng)
    }

    /// Lock the entry, loading it from the store first if needed.
    ///
    /// On error the entry stays unloaded.
    async fn lock_loaded<'a>(
        &self,
        entry: &'a UserEntry,
    ) -> StoreResult<tokio::sync::MutexGuard<'a, Option<UserBanditState>>> {
        let mut guard = entry.state.lock().await;
        if guard.is_none() {
            let doc = self.load_with_timeout(&entry.user_id).await?;
            let state = match doc {
                Some(doc) => UserBanditState::from_document(doc),
                None => {
                    debug!(user_id = %entry.user_id, "no stored bandit state, starting cold");
                    UserBanditState::new()
                }
            };
            *guard = Some(state);
        }
        Ok(guard)
    }

    fn schedule_write_back(&self, entry: Arc<UserEntry>, doc: BanditDocument, version: u64) {
        entry.inflight.fetch_add(1, Ordering::AcqRel);
        let mgr = self.clone();
        tokio::spawn(async move {
            mgr.write_back(&entry, doc, version).await;
            entry.inflight.fetch_sub(1, Ordering::AcqRel);
            mgr.release(entry);
        });
    }

    /// Drop a handle on an entry, then evict anything that became evictable.
    ///
    /// Entries pinned by an in-flight write-back may have pushed the cache
    /// over capacity; this is where it shrinks back.
    fn release(&self, entry: Arc<UserEntry>) {
        drop(entry);
        self.inner.cache.lock().evict_over_capacity();
    }

    async fn write_back(&self, entry: &UserEntry, doc: BanditDocument, version: u64) {
        let user_id = entry.user_id.as_str();
        let wb = self.inner.cfg.write_back;
        let mut persisted = entry.persisted.lock().await;
        let mut attempt = 0u32;
        loop {
            if entry.retired.load(Ordering::Acquire) || *persisted >= version {
                return;
            }
            if entry.version.load(Ordering::Acquire) > version {
                debug!(user_id, version, "write-back superseded by newer state");
                return;
            }
            match self.save_with_timeout(user_id, &doc).await {
                Ok(()) => {
                    *persisted = version;
                    entry.unsaved.store(false, Ordering::Release);
                    debug!(user_id, version, "bandit state written back");
                    return;
                }
                Err(e) if attempt < wb.max_retries => {
                    let backoff = wb.backoff(attempt);
                    attempt += 1;
                    warn!(
                        user_id,
                        attempt,
                        max_attempts = wb.max_retries + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "bandit write-back failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    error!(
                        user_id,
                        version,
                        attempts = attempt + 1,
                        error = %e,
                        "bandit write-back exhausted retries; state pinned in cache until flushed"
                    );
                    entry.unsaved.store(true, Ordering::Release);
                    return;
                }
            }
        }
    }

    async fn load_with_timeout(&self, user_id: &str) -> StoreResult<Option<BanditDocument>> {
        let ms = self.inner.cfg.load_timeout_ms;
        with_timeout("load", ms, self.inner.store.load(user_id)).await
    }

    async fn save_with_timeout(&self, user_id: &str, doc: &BanditDocument) -> StoreResult<()> {
        let ms = self.inner.cfg.save_timeout_ms;
        with_timeout("save", ms, self.inner.store.save(user_id, doc)).await
    }

    async fn delete_with_timeout(&self, user_id: &str) -> StoreResult<bool> {
        let ms = self.inner.cfg.load_timeout_ms.max(self.inner.cfg.save_timeout_ms);
        with_timeout("delete", ms, self.inner.store.delete(user_id)).await
    }
}

async fn with_timeout<T, F>(op: &'static str, timeout_ms: u64, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout { op, timeout_ms }),
    }
}
