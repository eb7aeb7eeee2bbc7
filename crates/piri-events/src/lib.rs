//! Observer fan-out.
//!
//! [`ObserverRegistry`] is the primitive the Config-Registry (`piri-config`)
//! builds its `subscribe`/`update` notification step on (spec §3 "Observer",
//! §4.3 phase 5): callbacks are id-tagged at registration so a subscriber can
//! tear down exactly its own subscription (spec §9 Design Notes —
//! "observer registration via closures returning unsubscribe functions");
//! observers on the same key run in registration order, observers on
//! different keys may run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A unique id assigned to a subscription at registration time, used for
/// O(k) unsubscribe where k is the number of observers on that key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

type Observer<V> = Arc<dyn Fn(&V) + Send + Sync>;

struct Subscription<V> {
    id: ObserverId,
    callback: Observer<V>,
}

/// A keyed registry of observers with id-tagged, registration-ordered
/// invocation. Generic over the key type `K` and the payload `V` an
/// observer receives (e.g. a config-registry `ChangeEvent`).
pub struct ObserverRegistry<K, V> {
    next_id: AtomicU64,
    subscriptions: RwLock<HashMap<K, Vec<Subscription<V>>>>,
}

impl<K, V> Default for ObserverRegistry<K, V>
where
    K: std::hash::Hash + Eq,
{
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> ObserverRegistry<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer for `key`, returning its id. Invocation order
    /// among observers on the same key is registration order.
    pub fn subscribe<F>(&self, key: K, callback: F) -> ObserverId
    where
        F: Fn(&V) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions
            .write()
            .unwrap()
            .entry(key)
            .or_default()
            .push(Subscription { id, callback: Arc::new(callback) });
        id
    }

    /// Removes exactly the subscription with `id` on `key`, if present.
    pub fn unsubscribe(&self, key: &K, id: ObserverId) {
        let mut subs = self.subscriptions.write().unwrap();
        if let Some(list) = subs.get_mut(key) {
            list.retain(|s| s.id != id);
            if list.is_empty() {
                subs.remove(key);
            }
        }
    }

    pub fn has_subscribers(&self, key: &K) -> bool {
        self.subscriptions
            .read()
            .unwrap()
            .get(key)
            .is_some_and(|v| !v.is_empty())
    }

    /// Copies out the callbacks registered for `key`, in registration order.
    /// Callers invoke these *outside* any lock they hold (spec §4.3: "observers
    /// invoked after the in-memory change is committed and outside the
    /// registry lock"); panics inside a callback are caught so one broken
    /// observer cannot break fan-out to the rest.
    pub fn notify(&self, key: &K, value: &V) {
        let callbacks: Vec<Observer<V>> = {
            let subs = self.subscriptions.read().unwrap();
            match subs.get(key) {
                Some(list) => list.iter().map(|s| s.callback.clone()).collect(),
                None => return,
            }
        };
        for callback in callbacks {
            let value_ref = value;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(value_ref);
            }));
            if result.is_err() {
                tracing::warn!("observer callback panicked; continuing notification fan-out");
            }
        }
    }
}
