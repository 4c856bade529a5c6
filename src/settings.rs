//! Settings cache and backing-store contracts.
//!
//! The cache mediates between high-frequency dispatch decisions and the
//! externally-stored configuration. Reads return the most recently refreshed
//! snapshot and never touch the backing store; refreshes happen on an
//! explicit change notification from the store (or a store override), so a
//! slow store can never stall a dispatch call.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Keys understood by the settings backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsKey {
    /// Master enable flag for effect dispatch.
    Enabled,
    /// Diagnostic logging flag.
    LoggingEnabled,
    /// Smart-mode burst suppression window.
    LoggingSkipThreshold,
    /// Repeat-emission window.
    LoggingRepeatThreshold,
}

/// Registration token for a store change observer.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(Uuid);

impl ObserverId {
    /// Create a new random observer id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked by a store after any of its values change.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Contract for the external key-value store backing the settings.
///
/// The core subscribes exactly once per cache and re-reads every mutable
/// field on each notification. Implementations must invoke callbacks after
/// the written value is visible to getters.
pub trait SettingsStore: Send + Sync {
    /// Read a boolean setting, `None` if unset.
    fn get_bool(&self, key: SettingsKey) -> Option<bool>;

    /// Read a duration setting, `None` if unset.
    fn get_duration(&self, key: SettingsKey) -> Option<Duration>;

    /// Write a boolean setting.
    fn set_bool(&self, key: SettingsKey, value: bool);

    /// Write a duration setting.
    fn set_duration(&self, key: SettingsKey, value: Duration);

    /// Register a change callback.
    fn subscribe(&self, callback: ChangeCallback) -> ObserverId;

    /// Remove a previously registered callback. Unknown ids are ignored.
    fn unsubscribe(&self, id: ObserverId);
}

/// Device/platform capability probe.
///
/// Queried once per cache construction; the answer is immutable for the
/// process lifetime.
pub trait CapabilityProbe: Send + Sync {
    /// Whether the device can perform feedback effects at all.
    fn supports_effects(&self) -> bool;
}

/// Default smart-mode burst suppression window.
pub const DEFAULT_SKIP_THRESHOLD_MS: i64 = 50;

/// Default repeat-emission window.
pub const DEFAULT_REPEAT_THRESHOLD_MS: i64 = 900;

/// A consistent point-in-time view of the feedback settings.
///
/// Returned by value so a concurrent refresh can never tear it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSnapshot {
    /// Device capability, fixed for the process lifetime.
    pub capable: bool,
    /// Master enable flag.
    pub enabled: bool,
    /// Diagnostic logging flag.
    pub logging_enabled: bool,
    /// Smart-mode burst suppression window.
    pub skip_threshold: Duration,
    /// Repeat-emission window.
    pub repeat_threshold: Duration,
}

/// Thread-safe read-through cache of the feedback settings.
///
/// Many concurrent readers, rare writers: reads never block each other, and
/// a refresh replaces the whole snapshot under the write lock so no reader
/// observes a half-updated view.
pub struct SettingsCache {
    capable: bool,
    store: RwLock<Arc<dyn SettingsStore>>,
    snapshot: RwLock<SettingsSnapshot>,
    observer: Mutex<Option<ObserverId>>,
    refresh_gate: Mutex<()>,
}

impl SettingsCache {
    /// Build a cache over `store`, probing capability once and subscribing
    /// to the store's change notifications.
    pub fn new(store: Arc<dyn SettingsStore>, probe: &dyn CapabilityProbe) -> Arc<Self> {
        let capable = probe.supports_effects();
        let snapshot = load_snapshot(capable, store.as_ref());

        let cache = Arc::new(Self {
            capable,
            store: RwLock::new(Arc::clone(&store)),
            snapshot: RwLock::new(snapshot),
            observer: Mutex::new(None),
            refresh_gate: Mutex::new(()),
        });
        cache.attach(&store);
        // A write landing between the initial load and the subscription
        // fires no callback; re-read now that the subscription is live.
        cache.refresh();
        cache
    }

    /// The most recently refreshed snapshot.
    ///
    /// Never blocks on change propagation or store access; at worst it waits
    /// out an in-flight refresh's whole-value write.
    #[must_use]
    pub fn read(&self) -> SettingsSnapshot {
        // Snapshot writes are whole-value assignments, so even a poisoned
        // guard still holds a consistent snapshot.
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read every mutable field from the backing store.
    ///
    /// Invoked on each store change notification; also available to hosts
    /// whose store cannot deliver notifications. Overlapping refreshes are
    /// serialized, so an older store read can never overwrite a newer one;
    /// readers only ever wait on the final whole-value assignment.
    pub fn refresh(&self) {
        let _serial = self
            .refresh_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let store = Arc::clone(&*self.store.read().unwrap_or_else(PoisonError::into_inner));
        let snapshot = load_snapshot(self.capable, store.as_ref());
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Replace the backing store, refreshing the cache immediately.
    ///
    /// Intended for tests and hosts that swap configuration sources at
    /// runtime. The cache unsubscribes from the old store and subscribes to
    /// the new one.
    pub fn override_store(self: &Arc<Self>, store: Arc<dyn SettingsStore>) {
        let old = Arc::clone(&*self.store.read().unwrap_or_else(PoisonError::into_inner));
        if let Some(id) = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            old.unsubscribe(id);
        }

        *self.store.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&store);
        self.attach(&store);
        self.refresh();
    }

    fn attach(self: &Arc<Self>, store: &Arc<dyn SettingsStore>) {
        // The callback holds a weak reference so the store never keeps the
        // cache alive past its owner.
        let weak: Weak<Self> = Arc::downgrade(self);
        let id = store.subscribe(Arc::new(move || {
            if let Some(cache) = weak.upgrade() {
                cache.refresh();
            }
        }));
        *self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);
    }
}

impl Drop for SettingsCache {
    fn drop(&mut self) {
        // Best-effort unregistration; the weak upgrade already fails once
        // the cache is gone.
        let id = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = id {
            let store = Arc::clone(&*self.store.read().unwrap_or_else(PoisonError::into_inner));
            store.unsubscribe(id);
        }
    }
}

impl fmt::Debug for SettingsCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsCache")
            .field("capable", &self.capable)
            .field("snapshot", &self.read())
            .finish_non_exhaustive()
    }
}

fn load_snapshot(capable: bool, store: &dyn SettingsStore) -> SettingsSnapshot {
    let skip_threshold = store
        .get_duration(SettingsKey::LoggingSkipThreshold)
        .filter(|d| *d > Duration::zero())
        .unwrap_or_else(|| Duration::milliseconds(DEFAULT_SKIP_THRESHOLD_MS));
    let repeat_threshold = store
        .get_duration(SettingsKey::LoggingRepeatThreshold)
        .filter(|d| *d > Duration::zero())
        .unwrap_or_else(|| Duration::milliseconds(DEFAULT_REPEAT_THRESHOLD_MS));

    SettingsSnapshot {
        capable,
        enabled: store.get_bool(SettingsKey::Enabled).unwrap_or(true),
        logging_enabled: store.get_bool(SettingsKey::LoggingEnabled).unwrap_or(false),
        skip_threshold,
        repeat_threshold,
    }
}

/// Thread-safe in-memory settings store.
///
/// Intended for embedded hosts and tests, and as a reference implementation
/// of the [`SettingsStore`] contract. Change callbacks run on the writer's
/// thread, after the written value is visible.
#[derive(Default)]
pub struct MemorySettingsStore {
    bools: RwLock<HashMap<SettingsKey, bool>>,
    durations: RwLock<HashMap<SettingsKey, Duration>>,
    observers: Mutex<Vec<(ObserverId, ChangeCallback)>>,
}

impl MemorySettingsStore {
    /// Create an empty store; every getter answers `None` until written.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self) {
        // Snapshot the callbacks so none of them runs under the observer
        // lock; a callback may itself subscribe or unsubscribe.
        let callbacks: Vec<ChangeCallback> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback();
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get_bool(&self, key: SettingsKey) -> Option<bool> {
        self.bools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
    }

    fn get_duration(&self, key: SettingsKey) -> Option<Duration> {
        self.durations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
    }

    fn set_bool(&self, key: SettingsKey, value: bool) {
        self.bools
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
        self.notify();
    }

    fn set_duration(&self, key: SettingsKey, value: Duration) {
        self.durations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
        self.notify();
    }

    fn subscribe(&self, callback: ChangeCallback) -> ObserverId {
        let id = ObserverId::new();
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback));
        id
    }

    fn unsubscribe(&self, id: ObserverId) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(observer, _)| *observer != id);
    }
}

impl fmt::Debug for MemorySettingsStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observers = self
            .observers
            .lock()
            .map(|guard| guard.len())
            .unwrap_or(0);
        f.debug_struct("MemorySettingsStore")
            .field("bools", &self.bools)
            .field("durations", &self.durations)
            .field("observers", &observers)
            .finish()
    }
}
