// Settings store. Remotely the settings sit inside the user document.

use std::sync::Arc;

use tokio::sync::watch;

use super::{EntityKind, Mode, Pending, SyncCore};
use crate::clock::Clock;
use crate::identity::IdentityListener;
use crate::models::{Identity, Settings, SettingsUpdate, ThemePreference};
use crate::remote::docs::{settings_from_doc, settings_to_data, user_path};
use crate::remote::{Document, MirrorClient, Scope};
use crate::store::{LocalStore, SETTINGS_KEY};

pub struct SettingsKind;

impl EntityKind for SettingsKind {
    type State = Settings;

    const LABEL: &'static str = "settings";
    const STORAGE_KEY: &'static str = SETTINGS_KEY;
    const INHERITS_LOCAL_STATE: bool = true;

    fn scope(uid: &str) -> Scope {
        Scope::Document(user_path(uid))
    }

    // A user document without settings leaves the current values alone, and
    // so does any snapshot taken while a settings write is still queued.
    fn reconcile(
        _current: &Settings,
        snapshot: &[Document],
        _identity: &Identity,
        pending: &Pending,
    ) -> Option<Settings> {
        if pending.contains(SETTINGS_ENTITY) {
            return None;
        }
        snapshot.first().and_then(settings_from_doc)
    }
}

// Pending key for the single settings entity.
const SETTINGS_ENTITY: &str = "settings";

pub struct SettingsStore {
    core: SyncCore<SettingsKind>,
}

impl SettingsStore {
    pub fn new(local: LocalStore, mirror: MirrorClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            core: SyncCore::new(local, mirror, clock),
        }
    }

    pub fn initialize(&self) {
        self.core.initialize();
    }

    pub fn settings(&self) -> Settings {
        self.core.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.core.subscribe()
    }

    pub fn mode(&self) -> Mode {
        self.core.mode()
    }

    pub async fn flush(&self) {
        self.core.flush().await;
    }

    pub fn apply(&self, update: SettingsUpdate) -> Settings {
        self.core.mutate(|settings, fx| {
            settings.apply(&update);
            if let Some(identity) = fx.cloud() {
                fx.write(SETTINGS_ENTITY, user_path(&identity.uid), settings_to_data(settings));
            }
            settings.clone()
        })
    }

    pub fn toggle_sound(&self) -> Settings {
        self.apply(SettingsUpdate::ToggleSound)
    }

    pub fn set_sound_on(&self, sound_on: bool) -> Settings {
        self.apply(SettingsUpdate::SetSoundOn { sound_on })
    }

    /// Out-of-range volumes are clamped to 0..=100.
    pub fn set_volume(&self, volume: i64) -> Settings {
        self.apply(SettingsUpdate::SetVolume { volume })
    }

    pub fn set_theme(&self, theme: ThemePreference) -> Settings {
        self.apply(SettingsUpdate::SetTheme { theme })
    }
}

impl IdentityListener for SettingsStore {
    fn on_identity_change(&self, identity: Option<&Identity>) {
        self.core.on_identity_change(identity);
    }
}
