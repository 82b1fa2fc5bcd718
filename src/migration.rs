//! Migration coordinator.
//!
//! When a user signs in while the device still holds local-only timers or
//! events, an offer is published once. Confirming it imports the local data
//! into the user's remote namespace in a single atomic batch and then clears
//! the local-only timer and event collections. Settings stay on the device as
//! an offline fallback.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::identity::IdentityListener;
use crate::models::{Event, Identity, Settings, Timer};
use crate::remote::docs::{
    EventDoc, EventRefDoc, TimerDoc, event_path, event_ref_path, settings_to_data, timer_path,
    user_path,
};
use crate::remote::{BatchWrite, MirrorClient};
use crate::store::{EVENTS_KEY, LocalStore, SETTINGS_KEY, TIMERS_KEY};

/// Pending import, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationOffer {
    pub identity: Identity,
    pub timers: usize,
    pub events: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub timers: usize,
    pub events: usize,
    /// `false` when nothing was sent because the remote is not configured.
    pub committed: bool,
}

pub struct MigrationCoordinator {
    local: LocalStore,
    mirror: MirrorClient,
    clock: Arc<dyn Clock>,
    // Set once an offer was made for the current sign-in.
    offered: Mutex<bool>,
    offer: watch::Sender<Option<MigrationOffer>>,
}

impl MigrationCoordinator {
    pub fn new(local: LocalStore, mirror: MirrorClient, clock: Arc<dyn Clock>) -> Self {
        let (offer, _) = watch::channel(None);
        Self {
            local,
            mirror,
            clock,
            offered: Mutex::new(false),
            offer,
        }
    }

    pub fn pending(&self) -> Option<MigrationOffer> {
        self.offer.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<MigrationOffer>> {
        self.offer.subscribe()
    }

    /// Dismisses the offer. Local data is left untouched and the offer is not
    /// repeated until the next sign-in.
    pub fn decline(&self) -> bool {
        let declined = self.offer.send_replace(None).is_some();
        if declined {
            info!("migration declined");
        }
        declined
    }

    /// Runs the pending migration. On failure the offer is published again
    /// so the user can retry.
    pub async fn confirm(&self) -> SyncResult<MigrationReport> {
        let offer = self.offer.send_replace(None).ok_or(SyncError::NoPendingMigration)?;
        match self.migrate(&offer.identity).await {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(uid = %offer.identity.uid, error = %e, "migration failed, offer kept");
                self.offer.send_replace(Some(offer));
                Err(e)
            }
        }
    }

    /// Imports every local-only timer and event, plus the settings, for
    /// `identity`. All documents are committed together or not at all.
    pub async fn migrate(&self, identity: &Identity) -> SyncResult<MigrationReport> {
        let (timers, stored_timers) = self.local.load_items::<Timer>(TIMERS_KEY);
        let (events, stored_events) = self.local.load_items::<Event>(EVENTS_KEY);
        let settings: Settings = self.local.load(SETTINGS_KEY);

        if !self.mirror.is_configured() {
            info!("remote not configured, migration skipped");
            return Ok(MigrationReport {
                timers: timers.len(),
                events: events.len(),
                committed: false,
            });
        }

        let batch = build_batch(identity, &timers, &events, &settings, self.clock.now_millis());
        let writes = batch.len();
        self.mirror
            .batch_commit(batch)
            .await
            .map_err(|e| SyncError::Migration(e.to_string()))?;

        self.clear_if_complete(TIMERS_KEY, timers.len(), stored_timers)?;
        self.clear_if_complete(EVENTS_KEY, events.len(), stored_events)?;
        info!(
            uid = %identity.uid,
            timers = timers.len(),
            events = events.len(),
            writes,
            "local data migrated"
        );
        Ok(MigrationReport {
            timers: timers.len(),
            events: events.len(),
            committed: true,
        })
    }

    // A key is only cleared when every stored entry made it into the batch.
    fn clear_if_complete(&self, key: &str, migrated: usize, stored: usize) -> SyncResult<()> {
        if migrated == stored {
            return self.local.remove(key);
        }
        warn!(key, migrated, stored, "unreadable local entries, keeping local copy");
        Ok(())
    }

    fn local_counts(&self) -> (usize, usize) {
        let timers = self.local.load_items::<Timer>(TIMERS_KEY).0.len();
        let events = self.local.load_items::<Event>(EVENTS_KEY).0.len();
        (timers, events)
    }
}

impl IdentityListener for MigrationCoordinator {
    fn on_identity_change(&self, identity: Option<&Identity>) {
        let mut offered = self.offered.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(identity) = identity else {
            *offered = false;
            self.offer.send_replace(None);
            return;
        };
        if *offered {
            return;
        }
        let (timers, events) = self.local_counts();
        if timers == 0 && events == 0 {
            return;
        }
        *offered = true;
        let offer = MigrationOffer {
            identity: identity.clone(),
            timers,
            events,
        };
        info!(uid = %identity.uid, timers, events, "offering migration");
        self.offer.send_replace(Some(offer));
    }
}

/// The full import batch: one document per timer and per event, one
/// reference per event and the settings merged into the user document.
pub fn build_batch(
    identity: &Identity,
    timers: &[Timer],
    events: &[Event],
    settings: &Settings,
    now: i64,
) -> Vec<BatchWrite> {
    let uid = &identity.uid;
    let mut batch = Vec::with_capacity(timers.len() + events.len() * 2 + 1);

    for timer in timers {
        batch.push(BatchWrite {
            path: timer_path(uid, &timer.id),
            data: TimerDoc::from_timer(timer, now, Some(now)).to_data(),
            merge: false,
        });
    }

    for event in events {
        batch.push(BatchWrite {
            path: event_path(&event.id),
            data: EventDoc::migrated(event, identity, now).to_data(),
            merge: false,
        });
        let reference = EventRefDoc {
            event_id: event.id.clone(),
            added_at: now.into(),
            is_owner: true,
            original_event_id: None,
        };
        batch.push(BatchWrite {
            path: event_ref_path(uid, &event.id),
            data: reference.to_data(),
            merge: false,
        });
    }

    batch.push(BatchWrite {
        path: user_path(uid),
        data: settings_to_data(settings),
        merge: true,
    });
    batch
}
