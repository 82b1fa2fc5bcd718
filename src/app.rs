use std::sync::Arc;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::identity::{AuthProvider, IdentityGateway, StaticAuthProvider};
use crate::migration::MigrationCoordinator;
use crate::remote::MirrorClient;
use crate::remote::memory::MemoryBackend;
use crate::store::{FileStore, LocalStore};
use crate::sync::{EventStore, SettingsStore, TimerStore};

/// Everything the host needs, wired together. Cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    pub gateway: Arc<IdentityGateway>,
    pub timers: Arc<TimerStore>,
    pub events: Arc<EventStore>,
    pub settings: Arc<SettingsStore>,
    pub migration: Arc<MigrationCoordinator>,
}

impl AppContext {
    /// Loads every store from `local` and subscribes them to identity
    /// changes. Call [`IdentityGateway::initialize`] afterwards to restore a
    /// session. Must run inside a Tokio runtime.
    pub fn new(
        local: LocalStore,
        mirror: MirrorClient,
        auth: Arc<dyn AuthProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timers = Arc::new(TimerStore::new(local.clone(), mirror.clone(), clock.clone()));
        let events = Arc::new(EventStore::new(local.clone(), mirror.clone(), clock.clone()));
        let settings = Arc::new(SettingsStore::new(local.clone(), mirror.clone(), clock.clone()));
        let migration = Arc::new(MigrationCoordinator::new(local, mirror.clone(), clock.clone()));
        timers.initialize();
        events.initialize();
        settings.initialize();

        let gateway = Arc::new(IdentityGateway::new(auth, mirror, clock));
        gateway.register(timers.clone());
        gateway.register(events.clone());
        gateway.register(settings.clone());
        // Last, so the stores are already in cloud mode when the offer appears.
        gateway.register(migration.clone());

        Self {
            gateway,
            timers,
            events,
            settings,
            migration,
        }
    }

    /// Wiring used by the binary: a file store under `data_dir`, the
    /// in-process document store as remote, and the bundled sign-in provider.
    pub fn from_config(config: &AppConfig) -> Self {
        let local = LocalStore::new(Arc::new(FileStore::new(config.data_dir.clone())));
        let mirror = MirrorClient::new(config.remote.clone(), Arc::new(MemoryBackend::new()));
        if !mirror.is_configured() {
            info!("remote not configured, running local-only");
        }
        let auth = Arc::new(StaticAuthProvider::new(config.dev_identity.clone()));
        Self::new(local, mirror, auth, Arc::new(SystemClock))
    }

    /// Waits for every store's queued remote writes.
    pub async fn flush(&self) {
        self.timers.flush().await;
        self.events.flush().await;
        self.settings.flush().await;
    }
}
