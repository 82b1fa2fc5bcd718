//! Remote document shapes and paths.
//!
//! Timers and settings live under the user's namespace. Events live in one
//! flat collection because they can be seen by more than one user; each user
//! gets a reference record per event they hold.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::warn;

use super::{Document, DocumentData};
use crate::models::{
    DEFAULT_TIMER_NAME, DEFAULT_TIMER_SECONDS, Event, Identity, Settings, ThemePreference, Timer,
    Visibility,
};

pub const EVENTS_COLLECTION: &str = "events";
pub const SHARES_COLLECTION: &str = "shares";

pub fn user_path(uid: &str) -> String {
    format!("users/{uid}")
}

pub fn timers_collection(uid: &str) -> String {
    format!("users/{uid}/timers")
}

pub fn timer_path(uid: &str, timer_id: &str) -> String {
    format!("users/{uid}/timers/{timer_id}")
}

pub fn event_path(event_id: &str) -> String {
    format!("{EVENTS_COLLECTION}/{event_id}")
}

pub fn event_ref_path(uid: &str, event_id: &str) -> String {
    format!("users/{uid}/eventRefs/{event_id}")
}

pub fn share_path(share_id: &str) -> String {
    format!("{SHARES_COLLECTION}/{share_id}")
}

/// Remote timestamps are epoch millis, but older documents may carry
/// `{seconds, nanoseconds}` objects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteTimestamp {
    Millis(i64),
    Fractional(f64),
    Parts {
        seconds: i64,
        #[serde(default)]
        nanoseconds: i64,
    },
}

impl RemoteTimestamp {
    pub fn to_millis(self) -> i64 {
        match self {
            RemoteTimestamp::Millis(ms) => ms,
            RemoteTimestamp::Fractional(ms) => ms.round() as i64,
            RemoteTimestamp::Parts { seconds, nanoseconds } => {
                seconds.saturating_mul(1000).saturating_add(nanoseconds / 1_000_000)
            }
        }
    }
}

impl From<i64> for RemoteTimestamp {
    fn from(ms: i64) -> Self {
        RemoteTimestamp::Millis(ms)
    }
}

fn millis(ts: Option<RemoteTimestamp>) -> Option<i64> {
    ts.map(RemoteTimestamp::to_millis)
}

fn to_data<T: Serialize>(value: &T) -> DocumentData {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => DocumentData::new(),
    }
}

fn from_data<T: DeserializeOwned>(doc: &Document) -> Option<T> {
    match serde_json::from_value(Value::Object(doc.data.clone())) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %doc.path, error = %e, "skipping malformed remote document");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

pub fn split_duration(total_seconds: u32) -> (u32, u32, u32) {
    (total_seconds / 3600, (total_seconds % 3600) / 60, total_seconds % 60)
}

/// Saturates instead of overflowing; callers clamp to the timer maximum.
pub fn join_duration(hours: u32, minutes: u32, seconds: u32) -> u32 {
    hours
        .saturating_mul(3600)
        .saturating_add(minutes.saturating_mul(60))
        .saturating_add(seconds)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<RemoteTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<RemoteTimestamp>,
}

impl TimerDoc {
    /// Remote shape of `timer`. `created_at` is only set for new documents.
    pub fn from_timer(timer: &Timer, now: i64, created_at: Option<i64>) -> Self {
        let (hours, minutes, seconds) = split_duration(timer.duration_seconds);
        Self {
            id: Some(timer.id.clone()),
            label: Some(timer.name.clone()),
            name: None,
            hours: Some(hours),
            minutes: Some(minutes),
            seconds: Some(seconds),
            total_seconds: Some(timer.duration_seconds),
            created_at: created_at.map(RemoteTimestamp::from),
            updated_at: Some(now.into()),
        }
    }

    pub fn to_data(&self) -> DocumentData {
        to_data(self)
    }

    pub fn duration_seconds(&self) -> u32 {
        if let Some(total) = self.total_seconds {
            return total;
        }
        if self.hours.is_some() || self.minutes.is_some() || self.seconds.is_some() {
            return join_duration(
                self.hours.unwrap_or(0),
                self.minutes.unwrap_or(0),
                self.seconds.unwrap_or(0),
            );
        }
        DEFAULT_TIMER_SECONDS
    }

    /// Local timer for this document. Run state always comes back idle.
    pub fn into_timer(self, id: &str) -> Timer {
        let duration = self.duration_seconds();
        let name = [self.label, self.name]
            .into_iter()
            .flatten()
            .find(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_TIMER_NAME.to_string());
        Timer::new(id.to_string(), name, duration)
    }
}

pub fn timer_from_doc(doc: &Document) -> Option<Timer> {
    from_data::<TimerDoc>(doc).map(|d| d.into_timer(doc.id()))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDoc {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub target_date: Option<RemoteTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<RemoteTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<RemoteTimestamp>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub owner_display_name: Option<String>,
    #[serde(default)]
    pub owner_email: Option<String>,
    #[serde(default)]
    pub is_shared: Option<bool>,
    #[serde(default)]
    pub share_id: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub is_linked_copy: Option<bool>,
    #[serde(default)]
    pub original_event_id: Option<String>,
    #[serde(default)]
    pub original_owner_id: Option<String>,
    #[serde(default)]
    pub is_orphaned: Option<bool>,
}

impl EventDoc {
    /// Remote shape of `event`; missing owner fields are filled from `writer`.
    pub fn from_event(event: &Event, writer: &Identity, now: i64, created: bool) -> Self {
        Self {
            id: Some(event.id.clone()),
            name: Some(event.name.clone()),
            target_date: Some(event.target_timestamp.into()),
            created_at: if created {
                Some(event.created_at.unwrap_or(now).into())
            } else {
                None
            },
            updated_at: Some(now.into()),
            owner_id: event.owner_id.clone().or_else(|| Some(writer.uid.clone())),
            owner_display_name: event
                .owner_display_name
                .clone()
                .or_else(|| writer.display_name.clone()),
            owner_email: event.owner_email.clone().or_else(|| writer.email.clone()),
            is_shared: Some(event.is_shared),
            share_id: event.share_id.clone(),
            visibility: Some(event.visibility),
            is_linked_copy: Some(event.is_linked_copy),
            original_event_id: event.original_event_id.clone(),
            original_owner_id: event.original_owner_id.clone(),
            is_orphaned: Some(event.is_orphaned),
        }
    }

    /// An imported local event: owned by `owner`, private, never a copy.
    pub fn migrated(event: &Event, owner: &Identity, now: i64) -> Self {
        Self {
            id: Some(event.id.clone()),
            name: Some(event.name.clone()),
            target_date: Some(event.target_timestamp.into()),
            created_at: Some(now.into()),
            updated_at: Some(now.into()),
            owner_id: Some(owner.uid.clone()),
            owner_display_name: owner.display_name.clone(),
            owner_email: owner.email.clone(),
            is_shared: Some(false),
            share_id: None,
            visibility: Some(Visibility::Private),
            is_linked_copy: Some(false),
            original_event_id: None,
            original_owner_id: None,
            is_orphaned: Some(false),
        }
    }

    pub fn to_data(&self) -> DocumentData {
        to_data(self)
    }

    pub fn into_event(self, id: &str) -> Option<Event> {
        let target_timestamp = millis(self.target_date)?;
        Some(Event {
            id: id.to_string(),
            name: self.name.unwrap_or_default(),
            target_timestamp,
            created_at: millis(self.created_at),
            updated_at: millis(self.updated_at),
            owner_id: self.owner_id,
            owner_display_name: self.owner_display_name,
            owner_email: self.owner_email,
            is_shared: self.is_shared.unwrap_or(false),
            share_id: self.share_id,
            visibility: self.visibility.unwrap_or_default(),
            is_linked_copy: self.is_linked_copy.unwrap_or(false),
            original_event_id: self.original_event_id,
            original_owner_id: self.original_owner_id,
            is_orphaned: self.is_orphaned.unwrap_or(false),
        })
    }
}

pub fn event_from_doc(doc: &Document) -> Option<Event> {
    let event = from_data::<EventDoc>(doc)?.into_event(doc.id());
    if event.is_none() {
        warn!(path = %doc.path, "skipping event without target date");
    }
    event
}

/// Per-user pointer to an event the user can see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventRefDoc {
    pub event_id: String,
    pub added_at: RemoteTimestamp,
    pub is_owner: bool,
    pub original_event_id: Option<String>,
}

impl EventRefDoc {
    pub fn for_event(event: &Event, uid: &str, now: i64) -> Self {
        Self {
            event_id: event.id.clone(),
            added_at: now.into(),
            is_owner: event.owner_id.as_deref().is_none_or(|owner| owner == uid),
            original_event_id: event.original_event_id.clone(),
        }
    }

    pub fn to_data(&self) -> DocumentData {
        to_data(self)
    }
}

/// Public lookup record: share token to event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShareDoc {
    pub share_id: String,
    pub event_id: String,
    pub owner_id: String,
    pub created_at: RemoteTimestamp,
}

impl ShareDoc {
    pub fn to_data(&self) -> DocumentData {
        to_data(self)
    }
}

/// Merge payload that marks a share token as no longer active.
pub fn share_revocation(now: i64) -> DocumentData {
    let mut data = DocumentData::new();
    data.insert("revoked".into(), Value::Bool(true));
    data.insert("revokedAt".into(), Value::from(now));
    data
}

// ---------------------------------------------------------------------------
// Settings and user profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSettings {
    pub sound_enabled: bool,
    pub volume: u8,
    pub theme_preference: ThemePreference,
    // Carried for other clients; this crate never reads them.
    pub vibration_enabled: bool,
    pub keep_screen_awake: bool,
}

impl From<&Settings> for RemoteSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            sound_enabled: settings.sound_on,
            volume: settings.volume,
            theme_preference: settings.theme_preference,
            vibration_enabled: true,
            keep_screen_awake: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct SettingsEnvelope {
    settings: RemoteSettings,
}

/// Merge payload for the user document carrying `settings`.
pub fn settings_to_data(settings: &Settings) -> DocumentData {
    to_data(&SettingsEnvelope {
        settings: settings.into(),
    })
}

/// Settings embedded in a user document, if any.
pub fn settings_from_doc(doc: &Document) -> Option<Settings> {
    let raw = doc.data.get("settings")?;
    match serde_json::from_value(raw.clone()) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!(path = %doc.path, error = %e, "ignoring malformed remote settings");
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<RemoteTimestamp>,
    pub last_login_at: RemoteTimestamp,
}

impl UserProfileDoc {
    pub fn first_login(identity: &Identity, now: i64) -> Self {
        Self {
            uid: Some(identity.uid.clone()),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
            created_at: Some(now.into()),
            last_login_at: now.into(),
        }
    }

    pub fn returning(identity: &Identity, now: i64) -> Self {
        Self {
            uid: None,
            email: None,
            display_name: identity.display_name.clone(),
            created_at: None,
            last_login_at: now.into(),
        }
    }

    pub fn to_data(&self) -> DocumentData {
        to_data(self)
    }
}
