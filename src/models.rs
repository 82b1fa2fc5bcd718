use serde::{Deserialize, Serialize};

pub const MAX_TIMERS: usize = 20;
pub const MAX_TIMER_SECONDS: u32 = 359_999; // 99:59:59
pub const DEFAULT_TIMER_NAME: &str = "Untitled Timer";
pub const DEFAULT_TIMER_SECONDS: u32 = 60;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

/// A countdown timer.
///
/// Only `id`, `name` and `duration_seconds` are mirrored remotely. The run
/// state (`status`, `remaining_seconds`, `end_timestamp`) lives on this device.
/// While running, `end_timestamp` is authoritative and `remaining_seconds` is
/// whatever was cached at the last pause or tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: String,
    pub name: String,
    #[serde(alias = "duration")]
    pub duration_seconds: u32,
    #[serde(alias = "remaining")]
    pub remaining_seconds: u32,
    #[serde(default)]
    pub status: TimerStatus,
    #[serde(default, alias = "endTime")]
    pub end_timestamp: Option<i64>, // epoch millis
}

impl Timer {
    pub fn new(id: String, name: String, duration_seconds: u32) -> Self {
        let duration_seconds = duration_seconds.min(MAX_TIMER_SECONDS);
        Self {
            id,
            name,
            duration_seconds,
            remaining_seconds: duration_seconds,
            status: TimerStatus::Idle,
            end_timestamp: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TimerStatus::Running | TimerStatus::Paused)
    }

    /// Seconds left at `now`, rounded up.
    pub fn remaining_at(&self, now: i64) -> u32 {
        match (self.status, self.end_timestamp) {
            (TimerStatus::Running, Some(end)) => seconds_until(end, now),
            _ => self.remaining_seconds,
        }
    }

    pub fn start(&mut self, now: i64) {
        if self.status == TimerStatus::Running {
            return;
        }
        if self.remaining_seconds == 0 {
            self.remaining_seconds = self.duration_seconds;
        }
        self.status = TimerStatus::Running;
        self.end_timestamp = Some(now + i64::from(self.remaining_seconds) * 1000);
    }

    pub fn pause(&mut self, now: i64) {
        let Some(end) = self.end_timestamp else {
            return;
        };
        self.remaining_seconds = seconds_until(end, now);
        self.status = TimerStatus::Paused;
        self.end_timestamp = None;
    }

    pub fn reset(&mut self) {
        self.status = TimerStatus::Idle;
        self.remaining_seconds = self.duration_seconds;
        self.end_timestamp = None;
    }

    pub fn complete(&mut self) {
        self.status = TimerStatus::Completed;
        self.remaining_seconds = 0;
        self.end_timestamp = None;
    }

    pub fn set_duration(&mut self, seconds: u32) {
        self.duration_seconds = seconds.min(MAX_TIMER_SECONDS);
        self.reset();
    }
}

fn seconds_until(end: i64, now: i64) -> u32 {
    let millis = end - now;
    if millis <= 0 {
        return 0;
    }
    u32::try_from((millis + 999) / 1000).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// A countdown to a fixed moment.
///
/// Provenance is either "owned original" (`owner_id` is the signed-in user,
/// `is_linked_copy == false`) or "linked copy" (`is_linked_copy == true` and
/// `original_event_id` set). Events created before sign-in carry no owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub name: String,
    #[serde(alias = "targetDate")]
    pub target_timestamp: i64,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub owner_display_name: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub share_id: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_linked_copy: bool,
    #[serde(default)]
    pub original_event_id: Option<String>,
    #[serde(default)]
    pub original_owner_id: Option<String>,
    #[serde(default)]
    pub is_orphaned: bool,
}

impl Event {
    /// A fresh original, owned by `owner` when one is signed in.
    pub fn new(
        id: String,
        name: String,
        target_timestamp: i64,
        now: i64,
        owner: Option<&Identity>,
    ) -> Self {
        Self {
            id,
            name,
            target_timestamp,
            created_at: Some(now),
            updated_at: Some(now),
            owner_id: owner.map(|o| o.uid.clone()),
            owner_display_name: owner.and_then(|o| o.display_name.clone()),
            owner_email: owner.and_then(|o| o.email.clone()),
            is_shared: false,
            share_id: None,
            visibility: Visibility::Private,
            is_linked_copy: false,
            original_event_id: None,
            original_owner_id: None,
            is_orphaned: false,
        }
    }

    pub fn is_owned_by(&self, uid: &str) -> bool {
        self.owner_id.as_deref() == Some(uid)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", from = "StoredSettings")]
pub struct Settings {
    pub sound_on: bool,
    pub volume: u8, // 0..=100
    pub theme_preference: ThemePreference,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sound_on: true,
            volume: 70,
            theme_preference: ThemePreference::System,
        }
    }
}

// Everything settings have ever been stored as. `darkMode` predates
// `themePreference` and is folded into it when the latter is missing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredSettings {
    #[serde(alias = "soundEnabled")]
    sound_on: Option<bool>,
    volume: Option<i64>,
    theme_preference: Option<ThemePreference>,
    dark_mode: Option<bool>,
}

impl From<StoredSettings> for Settings {
    fn from(stored: StoredSettings) -> Self {
        let defaults = Settings::default();
        let theme_preference = match (stored.theme_preference, stored.dark_mode) {
            (Some(theme), _) => theme,
            (None, Some(true)) => ThemePreference::Dark,
            (None, Some(false)) => ThemePreference::Light,
            (None, None) => defaults.theme_preference,
        };
        Self {
            sound_on: stored.sound_on.unwrap_or(defaults.sound_on),
            volume: stored.volume.map(clamp_volume).unwrap_or(defaults.volume),
            theme_preference,
        }
    }
}

pub fn clamp_volume(volume: i64) -> u8 {
    volume.clamp(0, 100) as u8
}

/// A signed-in user as reported by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

// Tagged updates: each variant names exactly the fields it may touch.

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TimerUpdate {
    Rename { name: String },
    SetDuration { seconds: u32 },
    Start,
    Pause,
    Reset,
    Complete,
    Tick { remaining: u32 },
}

impl TimerUpdate {
    /// Whether the update touches a remotely mirrored field.
    pub fn is_mirrored(&self) -> bool {
        matches!(self, TimerUpdate::Rename { .. } | TimerUpdate::SetDuration { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EventUpdate {
    Rename { name: String },
    Retarget { target_timestamp: i64 },
    MarkOrphaned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SettingsUpdate {
    ToggleSound,
    SetSoundOn { sound_on: bool },
    SetVolume { volume: i64 },
    SetTheme { theme: ThemePreference },
}

impl Settings {
    pub fn apply(&mut self, update: &SettingsUpdate) {
        match update {
            SettingsUpdate::ToggleSound => self.sound_on = !self.sound_on,
            SettingsUpdate::SetSoundOn { sound_on } => self.sound_on = *sound_on,
            SettingsUpdate::SetVolume { volume } => self.volume = clamp_volume(*volume),
            SettingsUpdate::SetTheme { theme } => self.theme_preference = *theme,
        }
    }
}
