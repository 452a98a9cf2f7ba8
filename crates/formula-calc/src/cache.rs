//! Built-formula cache with per-key single-flight builds.

use crate::ast::Operation;
use crate::error::CalcResult;
use crate::executor::Formula;
use log::{debug, trace};
use lru::LruCache;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Cache identity of a formula.
///
/// Text and trees live in separate key spaces so the formula text `"(a + b)"` never collides
/// with the rendering of a tree built by hand.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FormulaKey {
    /// Formula text exactly as submitted.
    Source(Arc<str>),
    /// [`Operation::cache_key`] of an operation tree.
    Tree(Arc<str>),
}

impl FormulaKey {
    pub fn source(text: &str) -> Self {
        FormulaKey::Source(Arc::from(text))
    }

    /// Keys `operation` by structure. Recursive; check the tree's depth first.
    pub fn tree<T: fmt::Debug>(operation: &Operation<T>) -> Self {
        FormulaKey::Tree(Arc::from(operation.cache_key()))
    }
}

impl fmt::Display for FormulaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaKey::Source(text) => write!(f, "source `{text}`"),
            FormulaKey::Tree(rendered) => write!(f, "tree `{rendered}`"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    /// Builds performed, including failed ones.
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

type Slot<T> = Arc<OnceCell<Formula<T>>>;

/// Maps formula keys to built formulas.
///
/// The map lock is only held to find or insert a key's slot. The build itself runs inside the
/// slot's `OnceCell`, so concurrent requests for the same key wait for a single build while other
/// keys proceed independently. A failed build leaves no entry behind.
pub struct FormulaCache<T> {
    slots: Mutex<LruCache<FormulaKey, Slot<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<T> fmt::Debug for FormulaCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaCache")
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T> FormulaCache<T> {
    /// `None` keeps every formula ever built.
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let slots = match capacity {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            slots: Mutex::new(slots),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    // No invariant spans the critical sections, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, LruCache<FormulaKey, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached formula for `key`, building it with `build` on a miss.
    pub fn get_or_build<F>(&self, key: FormulaKey, build: F) -> CalcResult<Formula<T>>
    where
        F: FnOnce() -> CalcResult<Formula<T>>,
    {
        let slot = self.slot(&key);
        if let Some(formula) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("formula cache hit for {key}");
            return Ok(formula.clone());
        }

        let mut built = false;
        let result = slot
            .get_or_try_init(|| {
                built = true;
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("formula cache miss, building {key}");
                build()
            })
            .cloned();

        match result {
            Ok(formula) => {
                if !built {
                    // Another caller finished the build while we waited.
                    self.hits.fetch_add(1, Ordering::Relaxed);
                }
                Ok(formula)
            }
            Err(err) => {
                let mut slots = self.lock();
                let stale = slots
                    .peek(&key)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot) && current.get().is_none());
                if stale {
                    slots.pop(&key);
                }
                debug!("building {key} failed: {err}");
                Err(err)
            }
        }
    }

    fn slot(&self, key: &FormulaKey) -> Slot<T> {
        let mut slots = self.lock();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }
        let slot: Slot<T> = Arc::new(OnceCell::new());
        if let Some((evicted, _)) = slots.push(key.clone(), Arc::clone(&slot)) {
            if &evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("evicted {evicted} from the formula cache");
            }
        }
        slot
    }

    /// Whether a built formula is cached for `key`. Does not touch recency.
    pub fn contains(&self, key: &FormulaKey) -> bool {
        self.lock()
            .peek(key)
            .is_some_and(|slot| slot.get().is_some())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry. Formulas already handed out stay usable.
    pub fn clear(&self) {
        let mut slots = self.lock();
        let dropped = slots.len();
        slots.clear();
        if dropped > 0 {
            debug!("cleared {dropped} formula(s) from the cache");
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
