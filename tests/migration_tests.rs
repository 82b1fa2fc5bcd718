mod common;

use common::Harness;
use countdown_sync::SyncError;
use countdown_sync::models::{Event, Settings};
use countdown_sync::store::{EVENTS_KEY, SETTINGS_KEY, TIMERS_KEY};

#[tokio::test]
async fn launch_event_is_imported_for_new_user() {
    let h = Harness::new("ada").await;
    h.ctx.events.add("Launch", 2_000_000_000_000);

    h.sign_in().await;
    let offer = h.ctx.migration.pending().unwrap();
    assert_eq!(offer.identity.uid, "ada");
    assert_eq!((offer.timers, offer.events), (0, 1));

    let report = h.ctx.migration.confirm().await.unwrap();
    assert!(report.committed);

    let events = h.backend.collection("events");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data["name"], "Launch");
    assert_eq!(events[0].data["ownerId"], "ada");
    assert_eq!(events[0].data["isLinkedCopy"], false);
    let refs = h.backend.collection("users/ada/eventRefs");
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].data["eventId"], events[0].id());

    assert!(!h.local.has_items(EVENTS_KEY));
    assert!(h.ctx.migration.pending().is_none());

    // The cloud-mode store picks the imported event up from the subscription.
    let cloud = h.ctx.events.events();
    assert_eq!(cloud.len(), 1);
    assert_eq!(cloud[0].owner_id.as_deref(), Some("ada"));

    h.sign_out().await;
    assert!(h.ctx.events.events().is_empty());
}

#[tokio::test]
async fn timers_and_settings_travel_with_the_batch() {
    let h = Harness::new("ada").await;
    h.ctx.timers.add_timer("Tea", 3_725).unwrap();
    h.ctx.timers.add_timer("Eggs", 300).unwrap();
    h.ctx.settings.set_volume(40);

    h.sign_in().await;
    h.ctx.migration.confirm().await.unwrap();

    assert_eq!(h.backend.collection("users/ada/timers").len(), 2);
    let user = h.backend.document("users/ada").unwrap();
    assert_eq!(user["settings"]["volume"], 40);
    assert_eq!(user["uid"], "ada");

    assert!(!h.local.has_items(TIMERS_KEY));
    let kept: Settings = h.local.load(SETTINGS_KEY);
    assert_eq!(kept.volume, 40);

    let names: Vec<String> = h.ctx.timers.timers().into_iter().map(|t| t.name).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Tea".to_string()));
}

#[tokio::test]
async fn rejected_batch_changes_nothing() {
    let h = Harness::new("ada").await;
    h.ctx.events.add("Launch", 1);
    h.ctx.timers.add().unwrap();

    h.sign_in().await;
    let before = h.backend.document_count();
    h.backend.set_fail_commits(true);

    let result = h.ctx.migration.confirm().await;
    assert!(matches!(result, Err(SyncError::Migration(_))));
    assert_eq!(h.backend.document_count(), before);
    assert!(h.local.has_items(EVENTS_KEY));
    assert!(h.local.has_items(TIMERS_KEY));
    assert!(h.ctx.migration.pending().is_some());
}

#[tokio::test]
async fn no_offer_without_local_data() {
    let h = Harness::new("ada").await;
    h.sign_in().await;
    assert!(h.ctx.migration.pending().is_none());
    assert!(matches!(h.ctx.migration.confirm().await, Err(SyncError::NoPendingMigration)));
}

#[tokio::test]
async fn declined_offer_keeps_local_data() {
    let h = Harness::new("ada").await;
    let event = h.ctx.events.add("Launch", 1);
    h.sign_in().await;

    assert!(h.ctx.migration.decline());
    assert!(h.backend.collection("events").is_empty());

    h.sign_out().await;
    let stored: Vec<Event> = h.local.load(EVENTS_KEY);
    assert_eq!(stored, vec![event]);
}
