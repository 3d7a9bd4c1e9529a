//! Persistent preferences with debounced writes

use crate::store::KeyValueBackend;
use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const QUIET_PERIOD: Duration = Duration::from_millis(500);

struct PendingWrite {
    value: String,
    generation: u64,
    timer: JoinHandle<()>,
}

type PendingWrites = Arc<Mutex<HashMap<String, PendingWrite>>>;

fn lock(
    pending: &Mutex<HashMap<String, PendingWrite>>,
) -> MutexGuard<'_, HashMap<String, PendingWrite>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

fn write_item(backend: &dyn KeyValueBackend, key: &str, value: &str) {
    match backend.set_item(key, value) {
        Ok(()) => debug!(key, "Saved preference"),
        Err(e) => warn!(error = %e, key, "Failed to save preference"),
    }
}

/// JSON-serialized preferences over a [`KeyValueBackend`].
///
/// `set` arms a per-key timer and only writes once the key has been quiet
/// for the whole period, so a burst of edits results in one write. Storage
/// errors are logged and never surface to callers.
pub struct PreferenceStore {
    backend: Arc<dyn KeyValueBackend>,
    quiet_period: Duration,
    pending: PendingWrites,
    generation: AtomicU64,
}

impl PreferenceStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend,
            quiet_period: QUIET_PERIOD,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    /// Loads `key`, returning `default` when it is missing, unreadable or
    /// corrupt.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let stored = match self.backend.get_item(key) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, key, "Failed to load preference");
                return default;
            }
        };

        match stored {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, key, "Ignoring corrupt preference");
                default
            }),
            None => default,
        }
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(e) => {
                warn!(error = %e, key, "Failed to serialize preference");
                return;
            }
        };

        let Ok(runtime) = Handle::try_current() else {
            debug!(key, "No async runtime, saving preference immediately");
            write_item(self.backend.as_ref(), key, &serialized);
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.remove(key) {
            previous.timer.abort();
        }

        let backend = Arc::clone(&self.backend);
        let pending_writes = Arc::clone(&self.pending);
        let quiet_period = self.quiet_period;
        let timer_key = key.to_string();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let due = {
                let mut pending = lock(&pending_writes);
                let current = pending
                    .get(&timer_key)
                    .is_some_and(|write| write.generation == generation);
                if current {
                    pending.remove(&timer_key)
                } else {
                    None
                }
            };
            if let Some(write) = due {
                write_item(backend.as_ref(), &timer_key, &write.value);
            }
        });

        pending.insert(
            key.to_string(),
            PendingWrite {
                value: serialized,
                generation,
                timer,
            },
        );
    }

    /// Writes every pending value now.
    pub fn flush(&self) {
        let drained: Vec<(String, PendingWrite)> = lock(&self.pending).drain().collect();
        for (key, write) in drained {
            write.timer.abort();
            write_item(self.backend.as_ref(), &key, &write.value);
        }
    }

    pub fn has_pending(&self) -> bool {
        !lock(&self.pending).is_empty()
    }
}

/// A typed cell bound to one preference key.
pub struct Preference<T> {
    key: String,
    value: T,
    store: Arc<PreferenceStore>,
}

impl<T> Preference<T>
where
    T: Serialize + DeserializeOwned + PartialEq,
{
    pub fn load(store: &Arc<PreferenceStore>, key: &str, default: T) -> Self {
        Self {
            key: key.to_string(),
            value: store.get(key, default),
            store: Arc::clone(store),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Updates the value, scheduling a write when it changed.
    pub fn set(&mut self, value: T) {
        if self.value == value {
            return;
        }
        self.value = value;
        self.store.set(&self.key, &self.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryBackend;
    use anyhow::{Result, anyhow};
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    const QUIET: Duration = Duration::from_millis(20);

    #[derive(Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        writes: AtomicUsize,
    }

    impl KeyValueBackend for CountingBackend {
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.set_item(key, value)
        }
    }

    struct BrokenBackend;

    impl KeyValueBackend for BrokenBackend {
        fn get_item(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("storage unavailable"))
        }

        fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }
    }

    fn counting_store() -> (Arc<CountingBackend>, PreferenceStore) {
        let backend = Arc::new(CountingBackend::default());
        let store = PreferenceStore::new(backend.clone()).with_quiet_period(QUIET);
        (backend, store)
    }

    #[test]
    fn test_get_falls_back_to_default() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_item("source_amount", "not json").unwrap();
        backend.set_item("source_currency", "\"eur\"").unwrap();
        let store = PreferenceStore::new(backend);

        assert_eq!(store.get("source_amount", 100.0), 100.0);
        assert_eq!(store.get("missing", "usd".to_string()), "usd");
        assert_eq!(store.get("source_currency", "usd".to_string()), "eur");
    }

    #[test]
    fn test_get_survives_read_errors() {
        let store = PreferenceStore::new(Arc::new(BrokenBackend));
        assert_eq!(
            store.get("target_currencies", vec!["eur".to_string()]),
            vec!["eur"]
        );
    }

    #[test]
    fn test_set_without_runtime_writes_immediately() {
        let (backend, store) = counting_store();
        store.set("source_amount", &42.5);

        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("source_amount", 0.0), 42.5);
    }

    #[tokio::test]
    async fn test_set_coalesces_bursts() {
        let (backend, store) = counting_store();

        store.set("source_amount", &1.0);
        store.set("source_amount", &2.0);
        store.set("source_amount", &3.0);
        assert_eq!(backend.writes.load(Ordering::SeqCst), 0);
        assert!(store.has_pending());

        sleep(QUIET * 5).await;

        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("source_amount", 0.0), 3.0);
        assert!(!store.has_pending());
    }

    #[tokio::test]
    async fn test_keys_debounce_independently() {
        let (backend, store) = counting_store();

        store.set("source_amount", &5.0);
        store.set("source_currency", "gbp");
        sleep(QUIET * 5).await;

        assert_eq!(backend.writes.load(Ordering::SeqCst), 2);
        assert_eq!(store.get("source_currency", String::new()), "gbp");
    }

    #[tokio::test]
    async fn test_flush_writes_pending_values() {
        let (backend, store) = counting_store();

        store.set("target_currencies", &["eur", "bitcoin"]);
        store.flush();

        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get("target_currencies", Vec::<String>::new()),
            vec!["eur", "bitcoin"]
        );

        // The cancelled timer must not write a second time.
        sleep(QUIET * 5).await;
        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_failures_keep_memory_value() {
        let store =
            Arc::new(PreferenceStore::new(Arc::new(BrokenBackend)).with_quiet_period(QUIET));
        let mut amount = Preference::load(&store, "source_amount", 100.0);

        amount.set(7.0);
        store.flush();
        sleep(QUIET * 2).await;

        assert_eq!(*amount.get(), 7.0);
    }

    #[tokio::test]
    async fn test_preference_skips_unchanged_values() {
        let backend = Arc::new(CountingBackend::default());
        let store = Arc::new(PreferenceStore::new(backend.clone()).with_quiet_period(QUIET));
        let mut currency = Preference::load(&store, "source_currency", "usd".to_string());

        currency.set("usd".to_string());
        assert!(!store.has_pending());

        currency.set("eur".to_string());
        store.flush();
        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
        assert_eq!(currency.key(), "source_currency");

        let reloaded = Preference::load(&store, "source_currency", "usd".to_string());
        assert_eq!(reloaded.get(), "eur");
    }
}
