#![allow(dead_code)]
use std::sync::Arc;

use countdown_sync::AppContext;
use countdown_sync::clock::ManualClock;
use countdown_sync::config::RemoteConfig;
use countdown_sync::identity::StaticAuthProvider;
use countdown_sync::models::Identity;
use countdown_sync::remote::MirrorClient;
use countdown_sync::remote::memory::MemoryBackend;
use countdown_sync::store::{FileStore, LocalStore};
use tempfile::TempDir;

pub const START_MILLIS: i64 = 1_700_000_000_000;

pub fn identity(uid: &str) -> Identity {
    Identity {
        uid: uid.to_string(),
        display_name: Some(format!("User {uid}")),
        email: Some(format!("{uid}@example.com")),
    }
}

/// An app wired to a file store in a temp dir and an in-process remote.
pub struct Harness {
    pub ctx: AppContext,
    pub backend: Arc<MemoryBackend>,
    pub local: LocalStore,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

impl Harness {
    /// Remote configured, sign-in hands out `uid`.
    pub async fn new(uid: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        Self::build(dir, Some(uid), true).await
    }

    /// No remote configured at all.
    pub async fn local_only() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        Self::build(dir, Some("ada"), false).await
    }

    /// A fresh local-only app over the same data directory, as after a restart.
    pub async fn restart(self) -> Self {
        let Harness { dir, .. } = self;
        Self::build(dir, Some("ada"), false).await
    }

    async fn build(dir: TempDir, uid: Option<&str>, configured: bool) -> Self {
        let local = LocalStore::new(Arc::new(FileStore::new(dir.path().join("data"))));
        let backend = Arc::new(MemoryBackend::new());
        let mirror = if configured {
            let config = RemoteConfig::new("key", "example.test", "countdown");
            MirrorClient::new(config, backend.clone())
        } else {
            MirrorClient::disabled()
        };
        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let auth = Arc::new(StaticAuthProvider::new(uid.map(identity)));
        let ctx = AppContext::new(local.clone(), mirror, auth, clock.clone());
        ctx.gateway.initialize().await;
        Self {
            ctx,
            backend,
            local,
            clock,
            dir,
        }
    }

    pub async fn sign_in(&self) -> Identity {
        self.ctx.gateway.sign_in().await.expect("sign in")
    }

    pub async fn sign_out(&self) {
        self.ctx.flush().await;
        self.ctx.gateway.sign_out().await.expect("sign out");
    }
}
