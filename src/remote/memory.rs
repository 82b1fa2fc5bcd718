// In-process document store with realtime subscriptions.
//
// Listeners are invoked synchronously, outside the internal lock, right after
// the change that affects them. Failure switches let callers simulate a
// rejecting backend.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{
    BatchWrite, Document, DocumentData, RemoteBackend, Scope, Snapshot, SnapshotCallback,
    SubscriptionHandle,
};
use crate::error::{SyncError, SyncResult};

struct Listener {
    scope: Scope,
    callback: SnapshotCallback,
}

#[derive(Default)]
struct State {
    documents: BTreeMap<String, DocumentData>,
    listeners: HashMap<u64, Listener>,
    fail_writes: bool,
    fail_commits: bool,
}

impl State {
    fn snapshot(&self, scope: &Scope) -> Snapshot {
        self.documents
            .iter()
            .filter(|(path, _)| scope.matches(path))
            .map(|(path, data)| Document {
                path: path.clone(),
                data: data.clone(),
            })
            .collect()
    }

    fn apply(&mut self, path: &str, data: DocumentData, merge: bool) {
        match self.documents.get_mut(path) {
            Some(existing) if merge => merge_into(existing, data),
            _ => {
                self.documents.insert(path.to_string(), data);
            }
        }
    }

    // Snapshots for every listener watching one of `paths`.
    fn pending_deliveries(&self, paths: &[&str]) -> Vec<(SnapshotCallback, Snapshot)> {
        self.listeners
            .values()
            .filter(|l| paths.iter().any(|p| l.scope.matches(p)))
            .map(|l| (l.callback.clone(), self.snapshot(&l.scope)))
            .collect()
    }
}

// Nested maps merge key by key; anything else is replaced.
fn merge_into(target: &mut DocumentData, data: DocumentData) {
    for (key, value) in data {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming)
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn deliver(deliveries: Vec<(SnapshotCallback, Snapshot)>) {
    for (callback, snapshot) in deliveries {
        callback(Ok(snapshot));
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
    next_listener: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every single-document write and delete.
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Reject every batch commit.
    pub fn set_fail_commits(&self, fail: bool) {
        lock(&self.state).fail_commits = fail;
    }

    pub fn document(&self, path: &str) -> Option<DocumentData> {
        lock(&self.state).documents.get(path).cloned()
    }

    pub fn collection(&self, path: &str) -> Snapshot {
        lock(&self.state).snapshot(&Scope::Collection(path.to_string()))
    }

    pub fn document_count(&self) -> usize {
        lock(&self.state).documents.len()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn subscribe(&self, scope: Scope, on_snapshot: SnapshotCallback) -> SubscriptionHandle {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        let initial = {
            let mut state = lock(&self.state);
            let initial = state.snapshot(&scope);
            state.listeners.insert(
                id,
                Listener {
                    scope: scope.clone(),
                    callback: on_snapshot.clone(),
                },
            );
            initial
        };
        debug!(?scope, listener = id, "subscribed");
        on_snapshot(Ok(initial));

        let state: Weak<Mutex<State>> = Arc::downgrade(&self.state);
        SubscriptionHandle::new(move || {
            if let Some(state) = state.upgrade() {
                lock(&state).listeners.remove(&id);
            }
        })
    }

    async fn get(&self, path: &str) -> SyncResult<Option<DocumentData>> {
        Ok(self.document(path))
    }

    async fn write(&self, path: &str, data: DocumentData, merge: bool) -> SyncResult<()> {
        let deliveries = {
            let mut state = lock(&self.state);
            if state.fail_writes {
                return Err(SyncError::Remote(format!("write rejected: {path}")));
            }
            state.apply(path, data, merge);
            state.pending_deliveries(&[path])
        };
        deliver(deliveries);
        Ok(())
    }

    async fn delete(&self, path: &str) -> SyncResult<()> {
        let deliveries = {
            let mut state = lock(&self.state);
            if state.fail_writes {
                return Err(SyncError::Remote(format!("delete rejected: {path}")));
            }
            if state.documents.remove(path).is_none() {
                return Ok(());
            }
            state.pending_deliveries(&[path])
        };
        deliver(deliveries);
        Ok(())
    }

    async fn batch_commit(&self, writes: Vec<BatchWrite>) -> SyncResult<()> {
        let deliveries = {
            let mut state = lock(&self.state);
            if state.fail_commits {
                return Err(SyncError::Remote(format!("batch of {} writes rejected", writes.len())));
            }
            let paths: Vec<String> = writes.iter().map(|w| w.path.clone()).collect();
            for write in writes {
                state.apply(&write.path, write.data, write.merge);
            }
            let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
            state.pending_deliveries(&paths)
        };
        deliver(deliveries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> DocumentData {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn recorder() -> (SnapshotCallback, Arc<Mutex<Vec<Snapshot>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: SnapshotCallback = Arc::new(move |delivery: SyncResult<Snapshot>| {
            sink.lock().unwrap().push(delivery.unwrap());
        });
        (callback, seen)
    }

    #[tokio::test]
    async fn merge_write_keeps_untouched_fields() {
        let backend = MemoryBackend::new();
        backend
            .write(
                "users/u1",
                data(json!({"uid": "u1", "settings": {"volume": 10, "soundEnabled": true}})),
                true,
            )
            .await
            .unwrap();
        backend
            .write("users/u1", data(json!({"settings": {"volume": 80}})), true)
            .await
            .unwrap();

        let doc = backend.document("users/u1").unwrap();
        assert_eq!(doc["uid"], json!("u1"));
        assert_eq!(doc["settings"], json!({"volume": 80, "soundEnabled": true}));

        backend.write("users/u1", data(json!({"uid": "u1"})), false).await.unwrap();
        assert!(backend.document("users/u1").unwrap().get("settings").is_none());
    }

    #[tokio::test]
    async fn subscribers_get_initial_and_change_snapshots() {
        let backend = MemoryBackend::new();
        backend.write("users/u1/timers/a", data(json!({"label": "A"})), true).await.unwrap();

        let (callback, seen) = recorder();
        let handle = backend.subscribe(Scope::Collection("users/u1/timers".into()), callback);
        backend.write("users/u1/timers/b", data(json!({"label": "B"})), true).await.unwrap();
        backend.write("users/u2/timers/c", data(json!({"label": "C"})), true).await.unwrap();
        backend.delete("users/u1/timers/a").await.unwrap();

        {
            let seen = seen.lock().unwrap();
            let sizes: Vec<usize> = seen.iter().map(Vec::len).collect();
            assert_eq!(sizes, vec![1, 2, 1]);
            assert_eq!(seen[2][0].id(), "b");
        }

        handle.cancel();
        assert_eq!(backend.listener_count(), 0);
        backend.write("users/u1/timers/d", data(json!({})), true).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let backend = MemoryBackend::new();
        backend.set_fail_commits(true);
        let writes = vec![
            BatchWrite { path: "events/e1".into(), data: data(json!({"name": "x"})), merge: false },
            BatchWrite {
                path: "users/u1/eventRefs/e1".into(),
                data: data(json!({"eventId": "e1"})),
                merge: false,
            },
        ];
        assert!(backend.batch_commit(writes.clone()).await.is_err());
        assert_eq!(backend.document_count(), 0);

        backend.set_fail_commits(false);
        backend.batch_commit(writes).await.unwrap();
        assert_eq!(backend.document_count(), 2);
    }

    #[tokio::test]
    async fn failed_write_is_reported() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        let err = backend.write("events/e1", DocumentData::new(), true).await.unwrap_err();
        assert!(matches!(err, SyncError::Remote(_)));
        assert!(backend.document("events/e1").is_none());
    }
}
