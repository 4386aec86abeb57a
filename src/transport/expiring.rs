//! Time-boxed map with per-entry expiry timers.
//!
//! Each inserted entry owns a timer task. The timer is aborted when the
//! entry is taken, replaced or cleared; when it fires first, the entry is
//! removed and handed to the expiry hook (or dropped if none is set).
//!
//! Timer tasks hold only a weak reference to the map, so dropping the map
//! stops all pending timers.
//!
//! Must be used from within a tokio runtime.

// ============================================================================
// Imports
// ============================================================================

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::AbortHandle;
use tracing::trace;

// ============================================================================
// Types
// ============================================================================

/// Callback receiving entries whose timer fired.
pub type ExpiryHook<K, V> = Arc<dyn Fn(K, V) + Send + Sync>;

/// A stored value and the timer guarding it.
struct Slot<V> {
    value: V,
    generation: u64,
    timer: AbortHandle,
}

struct Inner<K, V> {
    entries: Mutex<FxHashMap<K, Slot<V>>>,
    default_ttl: Duration,
    on_expire: Option<ExpiryHook<K, V>>,
    next_generation: AtomicU64,
}

impl<K, V> Drop for Inner<K, V> {
    fn drop(&mut self) {
        for slot in self.entries.get_mut().values() {
            slot.timer.abort();
        }
    }
}

// ============================================================================
// ExpiringMap
// ============================================================================

/// Map whose entries disappear after a time-to-live.
pub struct ExpiringMap<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for ExpiringMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    /// Creates a map whose entries expire after `default_ttl` and are dropped.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self::build(default_ttl, None)
    }

    /// Creates a map that passes expired entries to `hook`.
    #[must_use]
    pub fn with_expiry_hook(default_ttl: Duration, hook: ExpiryHook<K, V>) -> Self {
        Self::build(default_ttl, Some(hook))
    }

    fn build(default_ttl: Duration, on_expire: Option<ExpiryHook<K, V>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(FxHashMap::default()),
                default_ttl,
                on_expire,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Inserts with the default time-to-live.
    ///
    /// Replaces and returns any previous value, restarting the timer.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.insert_with_ttl(key, value, self.inner.default_ttl)
    }

    /// Inserts with a specific time-to-live.
    ///
    /// Replaces and returns any previous value, restarting the timer.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        let mut entries = self.inner.entries.lock();
        let slot = self.arm(key.clone(), value, ttl);

        entries.insert(key, slot).map(|previous| {
            previous.timer.abort();
            previous.value
        })
    }

    /// Inserts only if `key` is absent.
    ///
    /// # Errors
    ///
    /// Hands `value` back if the key is already present; the existing
    /// entry and its timer are left untouched.
    pub fn try_insert_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<(), V> {
        let mut entries = self.inner.entries.lock();
        if entries.contains_key(&key) {
            return Err(value);
        }

        let slot = self.arm(key.clone(), value, ttl);
        entries.insert(key, slot);
        Ok(())
    }

    /// Removes and returns the value, cancelling its timer.
    pub fn take(&self, key: &K) -> Option<V> {
        let slot = self.inner.entries.lock().remove(key)?;
        slot.timer.abort();
        Some(slot.value)
    }

    /// Removes and returns the value only if `predicate` accepts it.
    ///
    /// A rejected entry stays in place with its original deadline.
    pub fn take_if(&self, key: &K, predicate: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut entries = self.inner.entries.lock();
        if !predicate(&entries.get(key)?.value) {
            return None;
        }

        let slot = entries.remove(key)?;
        slot.timer.abort();
        Some(slot.value)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.entries.lock().contains_key(key)
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns `true` if there are no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Removes every entry without running the expiry hook.
    ///
    /// Returns the removed entries.
    pub fn drain(&self) -> Vec<(K, V)> {
        let drained: Vec<_> = self.inner.entries.lock().drain().collect();

        drained
            .into_iter()
            .map(|(key, slot)| {
                slot.timer.abort();
                (key, slot.value)
            })
            .collect()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        drop(self.drain());
    }

    /// Spawns the timer for a new slot.
    ///
    /// Called with the entries lock held, so the timer cannot observe the
    /// map before the slot is inserted.
    fn arm(&self, key: K, value: V, ttl: Duration) -> Slot<V> {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);

        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            Self::expire(&weak, key, generation);
        })
        .abort_handle();

        Slot {
            value,
            generation,
            timer,
        }
    }

    fn expire(weak: &Weak<Inner<K, V>>, key: K, generation: u64) {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        let slot = {
            let mut entries = inner.entries.lock();
            match entries.get(&key) {
                Some(slot) if slot.generation == generation => entries.remove(&key),
                _ => None,
            }
        };

        let Some(slot) = slot else {
            return;
        };

        trace!(generation, "Entry expired");

        if let Some(hook) = &inner.on_expire {
            hook(key, slot.value);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
