//! Remote mirror client.
//!
//! The remote side is a document store addressed by slash-separated paths
//! (`users/{uid}/timers/{id}`). Subscriptions deliver the full set of
//! documents in scope on every change; writes are partial merges unless
//! stated otherwise. [`MirrorClient`] wraps a [`RemoteBackend`] and turns
//! every operation into a no-op when the remote is not configured.

pub mod docs;
pub mod memory;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::SyncResult;

pub type DocumentData = Map<String, Value>;

/// Full scope contents, delivered on every change.
pub type Snapshot = Vec<Document>;

pub type SnapshotCallback = Arc<dyn Fn(SyncResult<Snapshot>) + Send + Sync>;

/// What a subscription watches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Direct children of a collection path.
    Collection(String),
    /// A single document.
    Document(String),
}

impl Scope {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Scope::Collection(collection) => parent_path(path) == Some(collection.as_str()),
            Scope::Document(doc) => doc == path,
        }
    }
}

fn parent_path(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(parent, _)| parent)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub data: DocumentData,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// One entry of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchWrite {
    pub path: String,
    pub data: DocumentData,
    pub merge: bool,
}

/// Cancels its subscription when cancelled or dropped.
pub struct SubscriptionHandle {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A realtime document store.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Watch `scope`. The callback may run before this returns.
    fn subscribe(&self, scope: Scope, on_snapshot: SnapshotCallback) -> SubscriptionHandle;

    async fn get(&self, path: &str) -> SyncResult<Option<DocumentData>>;

    async fn write(&self, path: &str, data: DocumentData, merge: bool) -> SyncResult<()>;

    async fn delete(&self, path: &str) -> SyncResult<()>;

    /// Applies every write or none of them.
    async fn batch_commit(&self, writes: Vec<BatchWrite>) -> SyncResult<()>;
}

#[derive(Clone)]
pub struct MirrorClient {
    config: RemoteConfig,
    backend: Option<Arc<dyn RemoteBackend>>,
}

impl MirrorClient {
    pub fn new(config: RemoteConfig, backend: Arc<dyn RemoteBackend>) -> Self {
        Self {
            config,
            backend: Some(backend),
        }
    }

    /// A client with no remote at all.
    pub fn disabled() -> Self {
        Self {
            config: RemoteConfig::default(),
            backend: None,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some() && self.config.is_complete()
    }

    fn backend(&self) -> Option<&Arc<dyn RemoteBackend>> {
        if self.config.is_complete() {
            self.backend.as_ref()
        } else {
            None
        }
    }

    pub fn subscribe(&self, scope: Scope, on_snapshot: SnapshotCallback) -> SubscriptionHandle {
        match self.backend() {
            Some(backend) => backend.subscribe(scope, on_snapshot),
            None => SubscriptionHandle::noop(),
        }
    }

    pub async fn get(&self, path: &str) -> SyncResult<Option<DocumentData>> {
        match self.backend() {
            Some(backend) => backend.get(path).await,
            None => Ok(None),
        }
    }

    pub async fn write(&self, path: &str, data: DocumentData, merge: bool) -> SyncResult<()> {
        let Some(backend) = self.backend() else {
            debug!(path, "remote not configured, skipping write");
            return Ok(());
        };
        backend.write(path, data, merge).await
    }

    pub async fn delete(&self, path: &str) -> SyncResult<()> {
        let Some(backend) = self.backend() else {
            debug!(path, "remote not configured, skipping delete");
            return Ok(());
        };
        backend.delete(path).await
    }

    pub async fn batch_commit(&self, writes: Vec<BatchWrite>) -> SyncResult<()> {
        let Some(backend) = self.backend() else {
            debug!(count = writes.len(), "remote not configured, skipping batch");
            return Ok(());
        };
        backend.batch_commit(writes).await
    }
}
