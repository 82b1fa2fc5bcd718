//! Reconciling entity stores.
//!
//! [`SyncCore`] holds the authoritative in-memory state for one entity kind
//! and moves between two modes:
//!
//! - **local**: state is read from and written to the local store only.
//! - **cloud**: a remote subscription scoped to the signed-in user replaces
//!   the state on every delivery (through [`EntityKind::reconcile`]), and
//!   mutations are also queued for the remote.
//!
//! Every mutation is written through to the local store before it returns.
//! Cloud-mode state is cached under a per-user key so that signing out
//! restores exactly the local-only collection.
//!
//! Entities with a remote write still in flight are [`Pending`]: a snapshot
//! taken before that write landed is stale for them, so reconciliation keeps
//! their local version.

pub mod events;
pub mod outbox;
pub mod settings;
pub mod timers;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::SyncResult;
use crate::identity::IdentityListener;
use crate::models::Identity;
use crate::remote::{
    DocumentData, MirrorClient, Scope, Snapshot, SnapshotCallback, SubscriptionHandle,
};
use crate::store::{LocalStore, cache_key};

use outbox::{Outbound, Outbox, Settled};

pub use events::EventStore;
pub use settings::SettingsStore;
pub use timers::TimerStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Local,
    Cloud,
}

/// Per-kind behaviour plugged into [`SyncCore`].
pub trait EntityKind: Send + Sync + 'static {
    type State: Clone + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Name used in logs.
    const LABEL: &'static str;
    const STORAGE_KEY: &'static str;
    /// Keep the local-mode state on entering cloud mode when no cloud cache
    /// exists yet, instead of starting empty.
    const INHERITS_LOCAL_STATE: bool = false;

    fn scope(uid: &str) -> Scope;

    /// Folds a delivered snapshot into `current`. `None` keeps `current`.
    fn reconcile(
        current: &Self::State,
        snapshot: &[crate::remote::Document],
        identity: &Identity,
        pending: &Pending,
    ) -> Option<Self::State>;
}

/// Entity keys with queued or in-flight remote writes.
#[derive(Debug, Default)]
pub struct Pending {
    counts: HashMap<String, usize>,
}

impl Pending {
    pub fn contains(&self, key: &str) -> bool {
        self.counts.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn add(&mut self, key: &str) {
        *self.counts.entry(key.to_string()).or_default() += 1;
    }

    fn settle(&mut self, key: &str) {
        if let Some(count) = self.counts.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(key);
            }
        }
    }
}

/// Entities addressed by a string id.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Replaces pending entries of `delivered` with their local version (or drops
/// them if deleted locally) and appends pending local entries the snapshot
/// does not have yet.
pub fn overlay_pending<T: Keyed + Clone>(
    local: &[T],
    delivered: Vec<T>,
    pending: &Pending,
) -> Vec<T> {
    if pending.is_empty() {
        return delivered;
    }
    let mut merged: Vec<T> = delivered
        .into_iter()
        .filter_map(|remote| {
            let key = remote.key();
            if !pending.contains(key) {
                return Some(remote);
            }
            local.iter().find(|l| l.key() == key).cloned()
        })
        .collect();
    for entry in local {
        if pending.contains(entry.key()) && !merged.iter().any(|m| m.key() == entry.key()) {
            merged.push(entry.clone());
        }
    }
    merged
}

struct Inner<S> {
    state: S,
    mode: Mode,
    identity: Option<Identity>,
    subscription: Option<SubscriptionHandle>,
    // Bumped on every mode change; deliveries from older subscriptions are dropped.
    generation: u64,
    pending: Pending,
}

impl<S> Inner<S> {
    fn storage_key(&self, base: &str) -> String {
        match (&self.mode, &self.identity) {
            (Mode::Cloud, Some(identity)) => cache_key(base, &identity.uid),
            _ => base.to_string(),
        }
    }
}

struct Shared<K: EntityKind> {
    inner: Mutex<Inner<K::State>>,
    notify: watch::Sender<K::State>,
    local: LocalStore,
}

impl<K: EntityKind> Shared<K> {
    fn lock(&self) -> MutexGuard<'_, Inner<K::State>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, inner: &Inner<K::State>) {
        let key = inner.storage_key(K::STORAGE_KEY);
        if let Err(e) = self.local.save(&key, &inner.state) {
            warn!(store = K::LABEL, key = %key, error = %e, "local write-through failed");
        }
    }

    fn publish(&self, inner: &Inner<K::State>) {
        self.notify.send_replace(inner.state.clone());
    }

    fn deliver(&self, generation: u64, delivery: SyncResult<Snapshot>) {
        let snapshot = match delivery {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(store = K::LABEL, error = %e, "remote subscription error");
                return;
            }
        };
        let mut inner = self.lock();
        if inner.generation != generation || inner.mode != Mode::Cloud {
            debug!(store = K::LABEL, "dropping stale delivery");
            return;
        }
        let Some(identity) = inner.identity.clone() else {
            return;
        };
        let Some(next) = K::reconcile(&inner.state, &snapshot, &identity, &inner.pending) else {
            return;
        };
        inner.state = next;
        self.persist(&inner);
        self.publish(&inner);
    }

    fn settle(&self, key: &str) {
        self.lock().pending.settle(key);
    }
}

/// Remote side effects requested by a mutation. Dropped outside cloud mode.
pub struct Effects<'a> {
    identity: Option<&'a Identity>,
    now: i64,
    ops: Vec<Outbound>,
}

impl<'a> Effects<'a> {
    /// The signed-in user, only in cloud mode.
    pub fn cloud(&self) -> Option<&'a Identity> {
        self.identity
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    /// Queues a merge write of `path` on behalf of entity `key`.
    pub fn write(&mut self, key: &str, path: String, data: DocumentData) {
        if self.identity.is_some() {
            self.ops.push(Outbound::Write {
                key: key.to_string(),
                path,
                data,
                merge: true,
            });
        }
    }

    pub fn delete(&mut self, key: &str, path: String) {
        if self.identity.is_some() {
            self.ops.push(Outbound::Delete {
                key: key.to_string(),
                path,
            });
        }
    }
}

pub struct SyncCore<K: EntityKind> {
    shared: Arc<Shared<K>>,
    mirror: MirrorClient,
    outbox: Outbox,
    clock: Arc<dyn Clock>,
}

impl<K: EntityKind> SyncCore<K> {
    /// Must be called from within a Tokio runtime.
    pub fn new(local: LocalStore, mirror: MirrorClient, clock: Arc<dyn Clock>) -> Self {
        let (notify, _) = watch::channel(K::State::default());
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: K::State::default(),
                mode: Mode::Local,
                identity: None,
                subscription: None,
                generation: 0,
                pending: Pending::default(),
            }),
            notify,
            local,
        });
        let weak: Weak<Shared<K>> = Arc::downgrade(&shared);
        let settled: Settled = Arc::new(move |key: &str| {
            if let Some(shared) = weak.upgrade() {
                shared.settle(key);
            }
        });
        let outbox = Outbox::spawn(K::LABEL, mirror.clone(), settled);
        Self {
            shared,
            mirror,
            outbox,
            clock,
        }
    }

    /// Loads the local collection; absent or malformed data yields the default.
    pub fn initialize(&self) {
        let mut inner = self.shared.lock();
        inner.state = self.shared.local.load(K::STORAGE_KEY);
        self.shared.publish(&inner);
    }

    pub fn state(&self) -> K::State {
        self.shared.lock().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<K::State> {
        self.shared.notify.subscribe()
    }

    pub fn mode(&self) -> Mode {
        self.shared.lock().mode
    }

    pub fn identity(&self) -> Option<Identity> {
        self.shared.lock().identity.clone()
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Waits until every remote write queued so far has been attempted.
    pub async fn flush(&self) {
        self.outbox.flush().await;
    }

    /// Applies `f` to the state. When the state changed, writes the result
    /// through to the local store and notifies subscribers. Remote effects `f`
    /// recorded are queued either way.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut K::State, &mut Effects<'_>) -> R) -> R {
        let (result, ops) = {
            let mut guard = self.shared.lock();
            let inner = &mut *guard;
            let identity = match inner.mode {
                Mode::Cloud => inner.identity.as_ref(),
                Mode::Local => None,
            };
            let mut effects = Effects {
                identity,
                now: self.clock.now_millis(),
                ops: Vec::new(),
            };
            let before = inner.state.clone();
            let result = f(&mut inner.state, &mut effects);
            let ops = effects.ops;
            for op in &ops {
                if let Outbound::Write { key, .. } | Outbound::Delete { key, .. } = op {
                    inner.pending.add(key);
                }
            }
            if inner.state != before {
                self.shared.persist(inner);
                self.shared.publish(inner);
            }
            (result, ops)
        };
        for op in ops {
            self.outbox.push(op);
        }
        result
    }

    pub fn on_identity_change(&self, identity: Option<&Identity>) {
        match identity {
            Some(identity) => self.enter_cloud(identity),
            None => self.enter_local(),
        }
    }

    fn enter_cloud(&self, identity: &Identity) {
        let (previous, generation) = {
            let mut inner = self.shared.lock();
            let same_user = inner.identity.as_ref().is_some_and(|i| i.uid == identity.uid);
            if inner.mode == Mode::Cloud && same_user {
                return;
            }
            inner.generation += 1;
            inner.mode = Mode::Cloud;
            inner.identity = Some(identity.clone());
            let cached = self.shared.local.load_opt(&cache_key(K::STORAGE_KEY, &identity.uid));
            match cached {
                Some(state) => inner.state = state,
                None if K::INHERITS_LOCAL_STATE => {}
                None => inner.state = K::State::default(),
            }
            self.shared.publish(&inner);
            (inner.subscription.take(), inner.generation)
        };
        drop(previous);
        info!(store = K::LABEL, uid = %identity.uid, "entering cloud mode");

        if !self.mirror.is_configured() {
            debug!(store = K::LABEL, "remote not configured, no subscription");
            return;
        }
        let weak: Weak<Shared<K>> = Arc::downgrade(&self.shared);
        let callback: SnapshotCallback = Arc::new(move |delivery: SyncResult<Snapshot>| {
            if let Some(shared) = weak.upgrade() {
                shared.deliver(generation, delivery);
            }
        });
        let handle = self.mirror.subscribe(K::scope(&identity.uid), callback);

        let stale = {
            let mut inner = self.shared.lock();
            if inner.generation == generation {
                inner.subscription = Some(handle);
                None
            } else {
                Some(handle)
            }
        };
        drop(stale);
    }

    fn enter_local(&self) {
        let previous = {
            let mut inner = self.shared.lock();
            if inner.mode == Mode::Local {
                return;
            }
            inner.generation += 1;
            inner.mode = Mode::Local;
            inner.identity = None;
            inner.state = self.shared.local.load(K::STORAGE_KEY);
            self.shared.publish(&inner);
            inner.subscription.take()
        };
        drop(previous);
        info!(store = K::LABEL, "entering local mode");
    }
}

impl<K: EntityKind> IdentityListener for SyncCore<K> {
    fn on_identity_change(&self, identity: Option<&Identity>) {
        SyncCore::on_identity_change(self, identity);
    }
}
