//! Publish/subscribe registry.
//!
//! Maps a topic to two independent callback sets:
//!   - offline: fired by local publishes only
//!   - online:  fired by publications that arrive from peers
//!
//! One mutex guards all state. Publishing snapshots the matching callbacks
//! under the lock, releases it, then invokes them, so a callback may freely
//! subscribe, unsubscribe or publish again.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A subscriber callback. Receives the raw payload bytes.
pub type Callback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Which callback set an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Local delivery only.
    Offline,
    /// Delivery of publications received from peers.
    Online,
    /// Both.
    All,
}

impl Scope {
    pub fn includes_offline(self) -> bool {
        matches!(self, Scope::Offline | Scope::All)
    }

    pub fn includes_online(self) -> bool {
        matches!(self, Scope::Online | Scope::All)
    }
}

/// Opaque subscription token. Unique per registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u128);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Returned by subscribe; required to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

#[derive(Default)]
struct TopicEntry {
    offline: HashMap<SubscriptionId, Callback>,
    online: HashMap<SubscriptionId, Callback>,
}

impl TopicEntry {
    fn is_empty(&self) -> bool {
        self.offline.is_empty() && self.online.is_empty()
    }
}

#[derive(Default)]
struct Topics {
    entries: HashMap<String, TopicEntry>,
    issued: u64,
}

impl Topics {
    /// Random high half, counter low half: unique for the registry's lifetime.
    fn next_id(&mut self) -> SubscriptionId {
        self.issued += 1;
        let high = u128::from(rand::random::<u64>()) << 64;
        SubscriptionId(high | u128::from(self.issued))
    }
}

/// The subscriber registry. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct PubSubRegistry {
    inner: Arc<Mutex<Topics>>,
}

impl PubSubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Topics> {
        // Callbacks never run under this lock, so a poisoned guard still
        // holds consistent maps.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` for `topic` in the set(s) named by `scope`.
    /// `Scope::All` registers the same id in both sets.
    pub fn subscribe<F>(&self, scope: Scope, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let mut topics = self.lock();
        let id = topics.next_id();
        let entry = topics.entries.entry(topic.to_string()).or_default();
        if scope.includes_offline() {
            entry.offline.insert(id, callback.clone());
        }
        if scope.includes_online() {
            entry.online.insert(id, callback);
        }
        tracing::trace!(topic, subscription = %id, ?scope, "subscribed");
        Subscription { id }
    }

    pub fn subscribe_offline<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.subscribe(Scope::Offline, topic, callback)
    }

    pub fn subscribe_online<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.subscribe(Scope::Online, topic, callback)
    }

    pub fn subscribe_all<F>(&self, topic: &str, callback: F) -> Subscription
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.subscribe(Scope::All, topic, callback)
    }

    /// Remove the subscription from the set(s) named by `scope`.
    /// Unknown subscriptions are a no-op. Returns whether anything was removed.
    pub fn unsubscribe(&self, scope: Scope, topic: &str, subscription: &Subscription) -> bool {
        let mut topics = self.lock();
        let Some(entry) = topics.entries.get_mut(topic) else {
            return false;
        };

        let mut removed = false;
        if scope.includes_offline() {
            removed |= entry.offline.remove(&subscription.id).is_some();
        }
        if scope.includes_online() {
            removed |= entry.online.remove(&subscription.id).is_some();
        }
        if entry.is_empty() {
            topics.entries.remove(topic);
        }
        removed
    }

    pub fn unsubscribe_offline(&self, topic: &str, subscription: &Subscription) -> bool {
        self.unsubscribe(Scope::Offline, topic, subscription)
    }

    pub fn unsubscribe_online(&self, topic: &str, subscription: &Subscription) -> bool {
        self.unsubscribe(Scope::Online, topic, subscription)
    }

    pub fn unsubscribe_all(&self, topic: &str, subscription: &Subscription) -> bool {
        self.unsubscribe(Scope::All, topic, subscription)
    }

    /// Invoke every offline callback for `topic`. Returns how many ran.
    pub fn publish_offline(&self, topic: &str, payload: &[u8]) -> usize {
        let callbacks = self.snapshot(topic, |entry| &entry.offline);
        invoke(&callbacks, payload)
    }

    /// Invoke every online callback for `topic`. Returns how many ran.
    pub fn publish_online(&self, topic: &str, payload: &[u8]) -> usize {
        let callbacks = self.snapshot(topic, |entry| &entry.online);
        invoke(&callbacks, payload)
    }

    fn snapshot<S>(&self, topic: &str, select: S) -> Vec<Callback>
    where
        S: Fn(&TopicEntry) -> &HashMap<SubscriptionId, Callback>,
    {
        self.lock()
            .entries
            .get(topic)
            .map(|entry| select(entry).values().cloned().collect())
            .unwrap_or_default()
    }

    /// Topics with at least one online subscriber.
    pub fn online_topics(&self) -> BTreeSet<String> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, entry)| !entry.online.is_empty())
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Number of callbacks registered for `topic` in the given scope.
    /// `Scope::All` counts distinct subscriptions across both sets.
    pub fn subscriber_count(&self, scope: Scope, topic: &str) -> usize {
        let topics = self.lock();
        let Some(entry) = topics.entries.get(topic) else {
            return 0;
        };
        match scope {
            Scope::Offline => entry.offline.len(),
            Scope::Online => entry.online.len(),
            Scope::All => entry
                .offline
                .keys()
                .chain(entry.online.keys())
                .collect::<std::collections::HashSet<_>>()
                .len(),
        }
    }
}

fn invoke(callbacks: &[Callback], payload: &[u8]) -> usize {
    for callback in callbacks {
        callback(payload);
    }
    callbacks.len()
}
