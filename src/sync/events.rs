// Event store.
//
// Events live in a flat remote collection; the subscription keeps the ones
// owned by the signed-in user. Sharing is only changed by the owner and
// publishes a separate lookup record keyed by the share token. Ownership is
// checked here on the client; the remote's access rules are expected to
// enforce it again.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use super::{Effects, EntityKind, Keyed, Mode, Pending, SyncCore, overlay_pending};
use crate::clock::Clock;
use crate::identity::IdentityListener;
use crate::ids::{generate_id, generate_share_id};
use crate::models::{Event, EventUpdate, Identity, Visibility};
use crate::remote::docs::{
    EVENTS_COLLECTION, EventDoc, EventRefDoc, ShareDoc, event_from_doc, event_path, event_ref_path,
    share_path, share_revocation,
};
use crate::remote::{Document, MirrorClient, Scope};
use crate::store::{EVENTS_KEY, LocalStore};

pub struct EventKind;

impl EntityKind for EventKind {
    type State = Vec<Event>;

    const LABEL: &'static str = "events";
    const STORAGE_KEY: &'static str = EVENTS_KEY;

    fn scope(_uid: &str) -> Scope {
        Scope::Collection(EVENTS_COLLECTION.to_string())
    }

    fn reconcile(
        current: &Vec<Event>,
        snapshot: &[Document],
        identity: &Identity,
        pending: &Pending,
    ) -> Option<Vec<Event>> {
        let owned = snapshot
            .iter()
            .filter_map(event_from_doc)
            .filter(|e| e.is_owned_by(&identity.uid))
            .collect();
        Some(overlay_pending(current, owned, pending))
    }
}

impl Keyed for Event {
    fn key(&self) -> &str {
        &self.id
    }
}

fn mirror_event(fx: &mut Effects<'_>, event: &Event, created: bool) {
    if let Some(identity) = fx.cloud() {
        let now = fx.now();
        let doc = EventDoc::from_event(event, identity, now, created);
        fx.write(&event.id, event_path(&event.id), doc.to_data());
        if created {
            let reference = EventRefDoc::for_event(event, &identity.uid, now);
            let path = event_ref_path(&identity.uid, &event.id);
            fx.write(&event.id, path, reference.to_data());
        }
    }
}

fn unmirror_event(fx: &mut Effects<'_>, event_id: &str) {
    if let Some(identity) = fx.cloud() {
        fx.delete(event_id, event_path(event_id));
        fx.delete(event_id, event_ref_path(&identity.uid, event_id));
    }
}

pub struct EventStore {
    core: SyncCore<EventKind>,
}

impl EventStore {
    pub fn new(local: LocalStore, mirror: MirrorClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            core: SyncCore::new(local, mirror, clock),
        }
    }

    pub fn initialize(&self) {
        self.core.initialize();
    }

    pub fn events(&self) -> Vec<Event> {
        self.core.state()
    }

    pub fn get(&self, id: &str) -> Option<Event> {
        self.events().into_iter().find(|e| e.id == id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Event>> {
        self.core.subscribe()
    }

    pub fn mode(&self) -> Mode {
        self.core.mode()
    }

    pub async fn flush(&self) {
        self.core.flush().await;
    }

    pub fn add(&self, name: &str, target_timestamp: i64) -> Event {
        let id = generate_id(self.core.now());
        self.core.mutate(|events, fx| {
            let event = Event::new(id, name.to_string(), target_timestamp, fx.now(), fx.cloud());
            mirror_event(fx, &event, true);
            events.push(event.clone());
            event
        })
    }

    pub fn remove(&self, id: &str) -> bool {
        self.core.mutate(|events, fx| {
            let before = events.len();
            events.retain(|e| e.id != id);
            let removed = events.len() != before;
            if removed {
                unmirror_event(fx, id);
            }
            removed
        })
    }

    pub fn apply(&self, id: &str, update: EventUpdate) -> Option<Event> {
        self.core.mutate(|events, fx| {
            let event = events.iter_mut().find(|e| e.id == id)?;
            match &update {
                EventUpdate::Rename { name } => event.name = name.clone(),
                EventUpdate::Retarget { target_timestamp } => {
                    event.target_timestamp = *target_timestamp
                }
                EventUpdate::MarkOrphaned => {
                    if !event.is_linked_copy {
                        warn!(event = id, "only linked copies can be orphaned");
                        return None;
                    }
                    event.is_orphaned = true;
                }
            }
            event.updated_at = Some(fx.now());
            let updated = event.clone();
            mirror_event(fx, &updated, false);
            Some(updated)
        })
    }

    pub fn rename(&self, id: &str, name: &str) -> Option<Event> {
        self.apply(id, EventUpdate::Rename { name: name.to_string() })
    }

    pub fn retarget(&self, id: &str, target_timestamp: i64) -> Option<Event> {
        self.apply(id, EventUpdate::Retarget { target_timestamp })
    }

    pub fn mark_orphaned(&self, id: &str) -> Option<Event> {
        self.apply(id, EventUpdate::MarkOrphaned)
    }

    /// Makes an owned event publicly resolvable. Returns the new share token,
    /// or `None` when signed out, not the owner, or the event is unknown.
    pub fn enable_sharing(&self, id: &str) -> Option<String> {
        self.core.mutate(|events, fx| {
            let Some(identity) = fx.cloud() else {
                warn!(event = id, "sharing requires a signed-in user");
                return None;
            };
            let Some(event) = events.iter_mut().find(|e| e.id == id) else {
                warn!(event = id, "cannot share unknown event");
                return None;
            };
            if !event.is_owned_by(&identity.uid) {
                warn!(event = id, uid = %identity.uid, "only the owner can share an event");
                return None;
            }

            let now = fx.now();
            let share_id = generate_share_id();
            event.share_id = Some(share_id.clone());
            event.is_shared = true;
            event.visibility = Visibility::Public;
            event.updated_at = Some(now);

            let updated = event.clone();
            mirror_event(fx, &updated, false);
            let lookup = ShareDoc {
                share_id: share_id.clone(),
                event_id: updated.id.clone(),
                owner_id: identity.uid.clone(),
                created_at: now.into(),
            };
            fx.write(&updated.id, share_path(&share_id), lookup.to_data());
            Some(share_id)
        })
    }

    /// Makes an owned event private again. The token is kept on the event and
    /// its lookup record is marked revoked rather than deleted.
    pub fn disable_sharing(&self, id: &str) -> bool {
        self.core.mutate(|events, fx| {
            let Some(identity) = fx.cloud() else {
                warn!(event = id, "sharing requires a signed-in user");
                return false;
            };
            let Some(event) = events.iter_mut().find(|e| e.id == id) else {
                warn!(event = id, "cannot unshare unknown event");
                return false;
            };
            if !event.is_owned_by(&identity.uid) {
                warn!(event = id, uid = %identity.uid, "only the owner can unshare an event");
                return false;
            }

            let now = fx.now();
            event.is_shared = false;
            event.visibility = Visibility::Private;
            event.updated_at = Some(now);

            let updated = event.clone();
            mirror_event(fx, &updated, false);
            if let Some(share_id) = &updated.share_id {
                fx.write(&updated.id, share_path(share_id), share_revocation(now));
            }
            true
        })
    }

    /// Adds an independent copy of someone else's event to this user's list.
    /// Later edits to the original do not reach the copy.
    pub fn add_linked_copy(&self, original: &Event) -> Option<Event> {
        let id = generate_id(self.core.now());
        self.core.mutate(|events, fx| {
            let Some(identity) = fx.cloud() else {
                warn!(original = %original.id, "linked copies require a signed-in user");
                return None;
            };
            let mut copy = Event::new(
                id,
                original.name.clone(),
                original.target_timestamp,
                fx.now(),
                Some(identity),
            );
            copy.is_linked_copy = true;
            copy.original_event_id = Some(original.id.clone());
            copy.original_owner_id = original.owner_id.clone();

            mirror_event(fx, &copy, true);
            events.push(copy.clone());
            Some(copy)
        })
    }

    pub fn remove_linked_copy(&self, id: &str) -> bool {
        match self.get(id) {
            Some(event) if event.is_linked_copy => self.remove(id),
            Some(_) => {
                warn!(event = id, "not a linked copy");
                false
            }
            None => false,
        }
    }

    pub fn clear_all(&self) {
        self.core.mutate(|events, fx| {
            for event in events.drain(..) {
                unmirror_event(fx, &event.id);
            }
        });
    }
}

impl IdentityListener for EventStore {
    fn on_identity_change(&self, identity: Option<&Identity>) {
        self.core.on_identity_change(identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::cache_key;

    fn identity(uid: &str) -> Identity {
        Identity {
            uid: uid.into(),
            display_name: Some(uid.to_uppercase()),
            email: None,
        }
    }

    fn store(local: &LocalStore) -> EventStore {
        let clock = Arc::new(ManualClock::new(5_000));
        let store = EventStore::new(local.clone(), MirrorClient::disabled(), clock);
        store.initialize();
        store
    }

    #[tokio::test]
    async fn local_events_have_no_owner_and_cannot_be_shared() {
        let local = LocalStore::in_memory();
        let store = store(&local);
        let event = store.add("Launch", 99_000);
        assert_eq!(event.owner_id, None);
        assert_eq!(event.created_at, Some(5_000));

        assert_eq!(store.enable_sharing(&event.id), None);
        assert!(!store.disable_sharing(&event.id));
        assert!(store.add_linked_copy(&event).is_none());
        assert_eq!(store.get(&event.id).unwrap(), event);
    }

    #[tokio::test]
    async fn non_owner_cannot_share() {
        let local = LocalStore::in_memory();
        let mut foreign = Event::new("e1".into(), "Party".into(), 1, 1, Some(&identity("alice")));
        foreign.share_id = Some("oldtoken".into());
        local.save(&cache_key(EVENTS_KEY, "bob"), &vec![foreign.clone()]).unwrap();

        let store = store(&local);
        store.on_identity_change(Some(&identity("bob")));
        assert_eq!(store.events(), vec![foreign.clone()]);

        let rx = store.subscribe();
        assert_eq!(store.enable_sharing("e1"), None);
        assert!(!store.disable_sharing("e1"));
        assert!(!rx.has_changed().unwrap());
        let after = store.get("e1").unwrap();
        assert!(!after.is_shared);
        assert_eq!(after.share_id.as_deref(), Some("oldtoken"));
        assert_eq!(after.visibility, Visibility::Private);
    }

    #[tokio::test]
    async fn owner_can_toggle_sharing_and_gets_fresh_tokens() {
        let local = LocalStore::in_memory();
        let store = store(&local);
        store.on_identity_change(Some(&identity("alice")));

        let event = store.add("Launch", 10);
        assert_eq!(event.owner_id.as_deref(), Some("alice"));
        assert_eq!(event.owner_display_name.as_deref(), Some("ALICE"));

        let first = store.enable_sharing(&event.id).unwrap();
        let shared = store.get(&event.id).unwrap();
        assert!(shared.is_shared);
        assert_eq!(shared.visibility, Visibility::Public);
        assert_eq!(shared.share_id.as_deref(), Some(first.as_str()));

        assert!(store.disable_sharing(&event.id));
        let private = store.get(&event.id).unwrap();
        assert!(!private.is_shared);
        assert_eq!(private.visibility, Visibility::Private);
        assert_eq!(private.share_id.as_deref(), Some(first.as_str()));

        let second = store.enable_sharing(&event.id).unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn linked_copy_is_independent() {
        let local = LocalStore::in_memory();
        let store = store(&local);
        store.on_identity_change(Some(&identity("bob")));

        let alice = identity("alice");
        let original = Event::new("orig".into(), "Concert".into(), 777, 1, Some(&alice));
        let copy = store.add_linked_copy(&original).unwrap();
        assert_ne!(copy.id, original.id);
        assert!(copy.is_linked_copy);
        assert_eq!(copy.owner_id.as_deref(), Some("bob"));
        assert_eq!(copy.original_event_id.as_deref(), Some("orig"));
        assert_eq!(copy.original_owner_id.as_deref(), Some("alice"));
        assert_eq!(copy.target_timestamp, 777);

        assert!(store.mark_orphaned(&copy.id).unwrap().is_orphaned);

        let own = store.add("Mine", 1);
        assert!(!store.remove_linked_copy(&own.id));
        assert!(store.mark_orphaned(&own.id).is_none());
        assert!(store.remove_linked_copy(&copy.id));
        assert_eq!(store.events().len(), 1);
    }

    #[test]
    fn reconcile_keeps_only_owned_events() {
        let docs: Vec<Document> = [("a", "alice"), ("b", "bob")]
            .iter()
            .map(|(id, owner)| {
                let event = Event::new((*id).into(), "x".into(), 1, 1, Some(&identity(owner)));
                Document {
                    path: event_path(id),
                    data: EventDoc::from_event(&event, &identity(owner), 1, true).to_data(),
                }
            })
            .collect();
        let pending = Pending::default();
        let alice = identity("alice");
        let events = EventKind::reconcile(&Vec::new(), &docs, &alice, &pending).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "a");
    }
}
