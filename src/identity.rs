//! Identity gateway.
//!
//! Wraps an [`AuthProvider`] and publishes the current sign-in state as a
//! watch value. Entity stores and the migration coordinator register as
//! [`IdentityListener`]s and are called, in registration order, whenever the
//! signed-in user changes.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::models::Identity;
use crate::remote::MirrorClient;
use crate::remote::docs::{UserProfileDoc, user_path};

/// External sign-in provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Session restored from a previous run, if any.
    async fn current(&self) -> SyncResult<Option<Identity>>;
    async fn sign_in(&self) -> SyncResult<Identity>;
    async fn sign_out(&self) -> SyncResult<()>;
}

/// Provider that always signs in as one preconfigured identity.
pub struct StaticAuthProvider {
    identity: Option<Identity>,
    signed_in: Mutex<bool>,
}

impl StaticAuthProvider {
    pub fn new(identity: Option<Identity>) -> Self {
        Self {
            identity,
            signed_in: Mutex::new(false),
        }
    }

    /// Same as [`new`](Self::new) but starts with a live session.
    pub fn signed_in(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            signed_in: Mutex::new(true),
        }
    }

    fn set_signed_in(&self, value: bool) {
        *self.signed_in.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn current(&self) -> SyncResult<Option<Identity>> {
        let signed_in = *self.signed_in.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(if signed_in { self.identity.clone() } else { None })
    }

    async fn sign_in(&self) -> SyncResult<Identity> {
        let identity = self
            .identity
            .clone()
            .ok_or_else(|| SyncError::Auth("no identity configured for sign-in".into()))?;
        self.set_signed_in(true);
        Ok(identity)
    }

    async fn sign_out(&self) -> SyncResult<()> {
        self.set_signed_in(false);
        Ok(())
    }
}

/// Reactive sign-in state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub identity: Option<Identity>,
    pub initialized: bool,
    pub error: Option<String>,
}

impl AuthState {
    pub fn is_present(&self) -> bool {
        self.identity.is_some()
    }
}

pub trait IdentityListener: Send + Sync {
    /// Called after the signed-in user changed; `None` means signed out.
    fn on_identity_change(&self, identity: Option<&Identity>);
}

pub struct IdentityGateway {
    provider: Arc<dyn AuthProvider>,
    mirror: MirrorClient,
    clock: Arc<dyn Clock>,
    state: watch::Sender<AuthState>,
    listeners: Mutex<Vec<Arc<dyn IdentityListener>>>,
}

impl IdentityGateway {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        mirror: MirrorClient,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            provider,
            mirror,
            clock,
            state,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, listener: Arc<dyn IdentityListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    /// Restores a provider session. Without a configured remote the gateway
    /// just reports itself initialized and signed out.
    pub async fn initialize(&self) {
        if !self.mirror.is_configured() {
            self.state.send_modify(|s| s.initialized = true);
            return;
        }
        match self.provider.current().await {
            Ok(Some(identity)) => {
                self.record_profile(&identity).await;
                self.transition(Some(identity));
            }
            Ok(None) => self.state.send_modify(|s| s.initialized = true),
            Err(e) => {
                warn!(error = %e, "restoring session failed");
                self.state.send_modify(|s| {
                    s.initialized = true;
                    s.error = Some(e.to_string());
                });
            }
        }
    }

    pub async fn sign_in(&self) -> SyncResult<Identity> {
        if !self.mirror.is_configured() {
            return Err(SyncError::NotConfigured);
        }
        match self.provider.sign_in().await {
            Ok(identity) => {
                info!(uid = %identity.uid, "signed in");
                self.record_profile(&identity).await;
                self.transition(Some(identity.clone()));
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "sign-in failed");
                self.set_error(e.to_string());
                Err(e)
            }
        }
    }

    pub async fn sign_out(&self) -> SyncResult<()> {
        if !self.mirror.is_configured() {
            return Ok(());
        }
        if let Err(e) = self.provider.sign_out().await {
            warn!(error = %e, "sign-out failed");
            self.set_error(e.to_string());
            return Err(e);
        }
        info!("signed out");
        self.transition(None);
        Ok(())
    }

    pub fn clear_error(&self) {
        self.state.send_modify(|s| s.error = None);
    }

    fn set_error(&self, error: String) {
        self.state.send_modify(|s| s.error = Some(error));
    }

    fn transition(&self, identity: Option<Identity>) {
        let previous = self.state.send_replace(AuthState {
            identity: identity.clone(),
            initialized: true,
            error: None,
        });
        let uid_of = |state: &Option<Identity>| state.as_ref().map(|i| i.uid.clone());
        let changed = uid_of(&previous.identity) != uid_of(&identity);
        if !changed {
            return;
        }
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for listener in listeners {
            listener.on_identity_change(identity.as_ref());
        }
    }

    // Create the user document on first sign-in, otherwise bump lastLoginAt.
    async fn record_profile(&self, identity: &Identity) {
        let path = user_path(&identity.uid);
        let now = self.clock.now_millis();
        let profile = match self.mirror.get(&path).await {
            Ok(Some(_)) => UserProfileDoc::returning(identity, now),
            Ok(None) => UserProfileDoc::first_login(identity, now),
            Err(e) => {
                warn!(uid = %identity.uid, error = %e, "reading user document failed");
                return;
            }
        };
        if let Err(e) = self.mirror.write(&path, profile.to_data(), true).await {
            warn!(uid = %identity.uid, error = %e, "updating user document failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RemoteConfig;
    use crate::remote::memory::MemoryBackend;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Option<String>>>,
    }

    impl IdentityListener for Recorder {
        fn on_identity_change(&self, identity: Option<&Identity>) {
            self.seen.lock().unwrap().push(identity.map(|i| i.uid.clone()));
        }
    }

    fn ada() -> Identity {
        Identity {
            uid: "ada".into(),
            display_name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
        }
    }

    fn gateway(backend: Arc<MemoryBackend>, provider: StaticAuthProvider) -> IdentityGateway {
        let mirror = MirrorClient::new(RemoteConfig::new("k", "d", "p"), backend);
        IdentityGateway::new(Arc::new(provider), mirror, Arc::new(ManualClock::new(1_000)))
    }

    #[tokio::test]
    async fn sign_in_and_out_notify_listeners() {
        let backend = Arc::new(MemoryBackend::new());
        let gateway = gateway(backend.clone(), StaticAuthProvider::new(Some(ada())));
        let recorder = Arc::new(Recorder::default());
        gateway.register(recorder.clone());

        gateway.initialize().await;
        assert!(gateway.state().initialized);
        assert!(!gateway.state().is_present());

        gateway.sign_in().await.unwrap();
        gateway.sign_in().await.unwrap(); // same user, no second notification
        gateway.sign_out().await.unwrap();

        assert_eq!(*recorder.seen.lock().unwrap(), vec![Some("ada".to_string()), None]);
        let profile = backend.document("users/ada").unwrap();
        assert_eq!(profile["uid"], "ada");
        assert_eq!(profile["createdAt"], 1_000);
        assert!(profile.get("settings").is_none());
    }

    #[tokio::test]
    async fn initialize_restores_session() {
        let backend = Arc::new(MemoryBackend::new());
        let gateway = gateway(backend, StaticAuthProvider::signed_in(ada()));
        let recorder = Arc::new(Recorder::default());
        gateway.register(recorder.clone());

        gateway.initialize().await;
        assert_eq!(gateway.identity(), Some(ada()));
        assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_remote_refuses_sign_in() {
        let provider = Arc::new(StaticAuthProvider::new(Some(ada())));
        let clock = Arc::new(ManualClock::new(0));
        let gateway = IdentityGateway::new(provider, MirrorClient::disabled(), clock);
        gateway.initialize().await;

        assert!(matches!(gateway.sign_in().await, Err(SyncError::NotConfigured)));
        assert!(gateway.sign_out().await.is_ok());
        assert!(gateway.state().initialized);
        assert!(!gateway.state().is_present());
    }

    #[tokio::test]
    async fn failed_sign_in_records_error() {
        let backend = Arc::new(MemoryBackend::new());
        let gateway = gateway(backend, StaticAuthProvider::new(None));
        assert!(gateway.sign_in().await.is_err());
        assert!(gateway.state().error.is_some());
        gateway.clear_error();
        assert!(gateway.state().error.is_none());
    }
}
