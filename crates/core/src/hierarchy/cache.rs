//! Descendant-set caching using Moka.
//!
//! Scope resolution for admins needs the full descendant set of their home
//! company on every request. The set only changes when the tree does, so it
//! is cached here and dropped wholesale after every committed mutation.
//!
//! Each invalidation starts a new generation. A walk that began in an older
//! generation read the tree before the commit, so its result is not stored.
//! The cache is per process: other processes sharing the database only see
//! the change once their own entries expire.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use holdtree_shared::{HierarchyConfig, types::CompanyId};
use moka::sync::Cache;

/// Default cache capacity (number of descendant sets).
const DEFAULT_CACHE_CAPACITY: u64 = 1_000;

/// Default time-to-live for cache entries (5 minutes).
const DEFAULT_TTL_SECS: u64 = 300;

/// Shared descendant-ID set.
pub type DescendantSet = Arc<BTreeSet<CompanyId>>;

/// Cache of descendant ID sets keyed by the ancestor.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct ScopeCache {
    cache: Cache<CompanyId, DescendantSet>,
    generation: Arc<RwLock<u64>>,
}

impl ScopeCache {
    /// Creates a cache with default settings (1000 entries, 5 minute TTL).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_CACHE_CAPACITY, DEFAULT_TTL_SECS)
    }

    /// Creates a cache with custom capacity and time-to-live.
    #[must_use]
    pub fn with_config(max_capacity: u64, ttl_secs: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            cache,
            generation: Arc::new(RwLock::new(0)),
        }
    }

    /// Creates a cache sized from the hierarchy settings.
    #[must_use]
    pub fn from_config(config: &HierarchyConfig) -> Self {
        Self::with_config(config.scope_cache_capacity, config.scope_cache_ttl_secs)
    }

    /// Returns the cached descendant set of `company_id`, if present.
    #[must_use]
    pub fn get(&self, company_id: CompanyId) -> Option<DescendantSet> {
        self.cache.get(&company_id)
    }

    /// Stores the descendant set of `company_id`.
    pub fn insert(&self, company_id: CompanyId, descendants: DescendantSet) {
        self.cache.insert(company_id, descendants);
    }

    /// Current generation; capture it before reading the tree.
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.generation.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the descendant set of `company_id` unless the cache was
    /// invalidated since `generation` was taken.
    ///
    /// Returns true if the set was stored.
    pub fn insert_if_current(
        &self,
        company_id: CompanyId,
        descendants: DescendantSet,
        generation: u64,
    ) -> bool {
        // Held across the insert so an invalidation cannot slip in between.
        let current = self.generation.read().unwrap_or_else(PoisonError::into_inner);
        if *current != generation {
            return false;
        }
        self.cache.insert(company_id, descendants);
        true
    }

    /// Drops every entry and starts a new generation. Called after each
    /// committed tree mutation.
    pub fn invalidate_all(&self) {
        let mut generation = self.generation.write().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        self.cache.invalidate_all();
    }

    /// Returns the number of entries currently in the cache.
    ///
    /// Moka updates this lazily; call [`Self::run_pending_tasks`] first for
    /// an exact figure.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending cache maintenance.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}

impl Default for ScopeCache {
    fn default() -> Self {
        Self::new()
    }
}
