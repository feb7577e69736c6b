//! # Context Cache
//!
//! Memoizes whole boot cycles: a [`ContextKey`] maps to a booted
//! [`Container`], so every caller asking for the same configuration gets the
//! same `Arc<Container>`.
//!
//! All lookups, boots and invalidations run under one async mutex. Two
//! concurrent requests for a missing key therefore boot it once. Failed boots
//! are not cached.
//!
//! The cache remembers parent/child relations between keys. Invalidation can
//! cascade along them ([`CascadeMode`]); children are always closed before
//! their parents. When the cache grows past its maximum size, the least
//! recently used entry is evicted together with its descendants. The entry
//! being inserted and its ancestors are never evicted for it.

pub mod key;
pub mod loader;

pub use key::*;
pub use loader::*;

use crate::error::Result;
use crate::lifecycle::Container;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_SIZE: usize = 32;

/// How far invalidation of a key reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeMode {
    /// Only the key itself.
    None,
    /// The key and its direct children.
    DirectChildren,
    /// The key and every descendant.
    AllDescendants,
    /// The whole tree the key belongs to, starting from its root.
    Exhaustive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub parent_count: usize,
    pub hits: u64,
    pub misses: u64,
    pub max_size: usize,
}

struct Entry {
    container: Arc<Container>,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<ContextKey, Entry>,
    children: HashMap<ContextKey, HashSet<ContextKey>>,
    tick: u64,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn hit(&mut self, key: &ContextKey) -> Option<Arc<Container>> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = tick;
        self.hits += 1;
        Some(entry.container.clone())
    }

    /// `key` and the descendants `mode` reaches, children before parents.
    fn removal_order(&self, key: &ContextKey, mode: CascadeMode) -> Vec<ContextKey> {
        let mut out = Vec::new();
        match mode {
            CascadeMode::None => {}
            CascadeMode::DirectChildren => {
                out.extend(self.children.get(key).into_iter().flatten().cloned());
            }
            CascadeMode::AllDescendants | CascadeMode::Exhaustive => {
                for child in self.children.get(key).into_iter().flatten() {
                    for descendant in self.removal_order(child, CascadeMode::AllDescendants) {
                        if !out.contains(&descendant) {
                            out.push(descendant);
                        }
                    }
                }
            }
        }
        out.push(key.clone());
        out
    }

    fn stats(&self, max_size: usize) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            parent_count: self.children.values().filter(|c| !c.is_empty()).count(),
            hits: self.hits,
            misses: self.misses,
            max_size,
        }
    }
}

pub struct ContextCache {
    state: Mutex<CacheState>,
    max_size: usize,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_SIZE)
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_size: max_size.max(1),
        }
    }

    /// Reads the maximum size from `CONTEXT_CACHE_MAX_SIZE`.
    pub fn from_env() -> Self {
        let max_size = match std::env::var("CONTEXT_CACHE_MAX_SIZE") {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => {
                    warn!(value = %raw, default = DEFAULT_MAX_SIZE, "Ignoring invalid CONTEXT_CACHE_MAX_SIZE");
                    DEFAULT_MAX_SIZE
                }
            },
            Err(_) => DEFAULT_MAX_SIZE,
        };
        Self::with_max_size(max_size)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns the container cached for `key`, booting it with `boot` on a
    /// miss.
    pub async fn get_or_boot<F, Fut>(&self, key: &ContextKey, boot: F) -> Result<Arc<Container>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Container>>>,
    {
        let mut state = self.state.lock().await;
        if let Some(container) = state.hit(key) {
            debug!(%key, "Cache hit");
            self.log_statistics(&state);
            return Ok(container);
        }

        state.misses += 1;
        debug!(%key, "Cache miss, booting");
        let container = boot().await?;
        self.store(&mut state, key.clone(), container.clone()).await;
        self.log_statistics(&state);
        Ok(container)
    }

    /// Like [`get_or_boot`](Self::get_or_boot), but resolves the key's parent
    /// chain through the cache first, all under the same lock.
    pub async fn load(&self, key: &ContextKey, factory: &dyn ContainerFactory) -> Result<Arc<Container>> {
        let mut state = self.state.lock().await;
        let container = self.load_locked(&mut state, key, factory).await;
        self.log_statistics(&state);
        container
    }

    fn load_locked<'a>(
        &'a self,
        state: &'a mut CacheState,
        key: &'a ContextKey,
        factory: &'a dyn ContainerFactory,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<Container>>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(container) = state.hit(key) {
                debug!(%key, "Cache hit");
                return Ok(container);
            }
            let parent = match key.parent_key() {
                Some(parent_key) => Some(self.load_locked(&mut *state, parent_key, factory).await?),
                None => None,
            };

            state.misses += 1;
            debug!(%key, "Cache miss, booting");
            let container = factory.create(key, parent).await?;
            self.store(state, key.clone(), container.clone()).await;
            Ok(container)
        })
    }

    async fn store(&self, state: &mut CacheState, key: ContextKey, container: Arc<Container>) {
        state.tick += 1;
        if let Some(parent) = key.parent_key() {
            state
                .children
                .entry(parent.clone())
                .or_default()
                .insert(key.clone());
        }
        state.entries.insert(
            key.clone(),
            Entry {
                container,
                last_used: state.tick,
            },
        );

        while state.entries.len() > self.max_size {
            let victim = state
                .entries
                .iter()
                .filter(|(candidate, _)| !key.is_self_or_ancestor(candidate))
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(candidate, _)| candidate.clone());
            let Some(victim) = victim else {
                break;
            };
            info!(key = %victim, max_size = self.max_size, "Evicting least recently used container");
            Self::remove(state, &victim, CascadeMode::AllDescendants).await;
        }
    }

    /// Closes and removes `key` and whatever `mode` reaches. Returns how many
    /// containers were removed.
    pub async fn invalidate(&self, key: &ContextKey, mode: CascadeMode) -> usize {
        let mut state = self.state.lock().await;
        let start = match mode {
            CascadeMode::Exhaustive => key.root().clone(),
            _ => key.clone(),
        };
        let removed = Self::remove(&mut state, &start, mode).await;
        debug!(%key, ?mode, removed, "Invalidated");
        removed
    }

    async fn remove(state: &mut CacheState, key: &ContextKey, mode: CascadeMode) -> usize {
        let mut removed = 0;
        for target in state.removal_order(key, mode) {
            if let Some(entry) = state.entries.get(&target) {
                let container = entry.container.clone();
                container.close().await;
                state.entries.remove(&target);
                removed += 1;
            }
            // A removed key that still has cached children stays linked, so a
            // later cascade from above can still reach them.
            let has_children = state.children.get(&target).is_some_and(|c| !c.is_empty());
            if has_children {
                continue;
            }
            if let Some(parent) = target.parent_key() {
                if let Some(siblings) = state.children.get_mut(parent) {
                    siblings.remove(&target);
                    if siblings.is_empty() {
                        state.children.remove(parent);
                    }
                }
            }
        }
        removed
    }

    /// Closes every cached container, children first, and empties the cache.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        let mut keys: Vec<ContextKey> = state.entries.keys().cloned().collect();
        keys.sort_by_key(|k| std::cmp::Reverse(k.depth()));
        for key in keys {
            if let Some(entry) = state.entries.remove(&key) {
                entry.container.close().await;
            }
        }
        state.children.clear();
        info!("Context cache cleared");
    }

    pub async fn contains(&self, key: &ContextKey) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        self.state.lock().await.stats(self.max_size)
    }

    fn log_statistics(&self, state: &CacheState) {
        let stats = state.stats(self.max_size);
        debug!(
            size = stats.size,
            parent_count = stats.parent_count,
            hits = stats.hits,
            misses = stats.misses,
            max_size = stats.max_size,
            "Context cache statistics"
        );
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{ContainerConfig, ContainerState};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn factory(boots: Arc<AtomicUsize>) -> ConfigFactory<impl Fn(&ContextKey) -> ContainerConfig + Send + Sync> {
        ConfigFactory::new(move |key: &ContextKey| {
            boots.fetch_add(1, Ordering::SeqCst);
            ContainerConfig::new(key.classes.join(","))
        })
    }

    #[tokio::test]
    async fn test_same_key_same_container() {
        let cache = ContextCache::new();
        let boots = Arc::new(AtomicUsize::new(0));
        let factory = factory(boots.clone());
        let key = ContextKey::new("default").class("App");

        let first = cache.load(&key, &factory).await.unwrap();
        let second = cache.load(&key.clone(), &factory).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(boots.load(Ordering::SeqCst), 1);
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_failed_boot_is_not_cached() {
        let cache = ContextCache::new();
        let key = ContextKey::new("default").class("Broken");
        let result = cache
            .get_or_boot(&key, || async {
                Err(crate::error::ContainerError::NoSuchDefinition("x".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(!cache.contains(&key).await);
    }

    #[tokio::test]
    async fn test_parent_resolved_through_cache() {
        let cache = ContextCache::new();
        let factory = factory(Arc::new(AtomicUsize::new(0)));
        let root = ContextKey::new("default").class("Root");
        let child_a = ContextKey::new("default").class("A").with_parent(root.clone());
        let child_b = ContextKey::new("default").class("B").with_parent(root.clone());

        let a = cache.load(&child_a, &factory).await.unwrap();
        let b = cache.load(&child_b, &factory).await.unwrap();
        let parent = cache.load(&root, &factory).await.unwrap();

        assert!(Arc::ptr_eq(&a.parent().unwrap(), &parent));
        assert!(Arc::ptr_eq(&b.parent().unwrap(), &parent));
        assert_eq!(cache.stats().await.parent_count, 1);
    }

    #[tokio::test]
    async fn test_cascading_invalidation() {
        let cache = ContextCache::new();
        let factory = factory(Arc::new(AtomicUsize::new(0)));
        let root = ContextKey::new("default").class("Root");
        let child = ContextKey::new("default").class("Child").with_parent(root.clone());
        let grandchild = ContextKey::new("default").class("Grand").with_parent(child.clone());

        let g = cache.load(&grandchild, &factory).await.unwrap();
        let c = cache.load(&child, &factory).await.unwrap();
        let r = cache.load(&root, &factory).await.unwrap();

        assert_eq!(cache.invalidate(&child, CascadeMode::None).await, 1);
        assert_eq!(c.state(), ContainerState::Closed);
        assert!(g.is_active());

        assert_eq!(cache.invalidate(&grandchild, CascadeMode::Exhaustive).await, 2);
        assert_eq!(g.state(), ContainerState::Closed);
        assert_eq!(r.state(), ContainerState::Closed);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_lru_eviction_closes_victim() {
        let cache = ContextCache::with_max_size(2);
        let factory = factory(Arc::new(AtomicUsize::new(0)));
        let a = ContextKey::new("default").class("A");
        let b = ContextKey::new("default").class("B");
        let c = ContextKey::new("default").class("C");

        let first = cache.load(&a, &factory).await.unwrap();
        cache.load(&b, &factory).await.unwrap();
        cache.load(&a, &factory).await.unwrap();
        cache.load(&c, &factory).await.unwrap();

        assert!(cache.contains(&a).await);
        assert!(!cache.contains(&b).await);
        assert!(cache.contains(&c).await);
        assert!(first.is_active());
    }
}
