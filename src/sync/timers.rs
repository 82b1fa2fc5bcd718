// Timer store.
//
// The remote only knows a timer's name and duration. Run state stays on the
// device, so a delivery never interrupts a timer that is running or paused
// here: for those, only the name and duration are taken from the remote.
// Timers with a remote write still queued keep their local version outright.

use std::sync::Arc;

use tokio::sync::watch;

use super::{Effects, EntityKind, Keyed, Mode, Pending, SyncCore, overlay_pending};
use crate::clock::Clock;
use crate::identity::IdentityListener;
use crate::ids::generate_id;
use crate::models::{
    DEFAULT_TIMER_NAME, DEFAULT_TIMER_SECONDS, Identity, MAX_TIMERS, Timer, TimerUpdate,
};
use crate::remote::docs::{TimerDoc, timer_from_doc, timer_path, timers_collection};
use crate::remote::{Document, MirrorClient, Scope};
use crate::store::{LocalStore, TIMERS_KEY};

pub struct TimerKind;

impl EntityKind for TimerKind {
    type State = Vec<Timer>;

    const LABEL: &'static str = "timers";
    const STORAGE_KEY: &'static str = TIMERS_KEY;

    fn scope(uid: &str) -> Scope {
        Scope::Collection(timers_collection(uid))
    }

    fn reconcile(
        current: &Vec<Timer>,
        snapshot: &[Document],
        _identity: &Identity,
        pending: &Pending,
    ) -> Option<Vec<Timer>> {
        let delivered = snapshot.iter().filter_map(timer_from_doc).collect();
        Some(merge_timers(current, delivered, pending))
    }
}

impl Keyed for Timer {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Remote snapshot wins, except for the run state of active local timers
/// and for timers with unsettled remote writes.
pub fn merge_timers(local: &[Timer], delivered: Vec<Timer>, pending: &Pending) -> Vec<Timer> {
    let merged = delivered
        .into_iter()
        .map(|remote| match local.iter().find(|t| t.id == remote.id && t.is_active()) {
            Some(active) => Timer {
                name: remote.name,
                duration_seconds: remote.duration_seconds,
                ..active.clone()
            },
            None => remote,
        })
        .collect();
    overlay_pending(local, merged, pending)
}

fn mirror_timer(fx: &mut Effects<'_>, timer: &Timer, created: bool) {
    if let Some(identity) = fx.cloud() {
        let now = fx.now();
        let doc = TimerDoc::from_timer(timer, now, created.then_some(now));
        fx.write(&timer.id, timer_path(&identity.uid, &timer.id), doc.to_data());
    }
}

fn unmirror_timer(fx: &mut Effects<'_>, timer_id: &str) {
    if let Some(identity) = fx.cloud() {
        fx.delete(timer_id, timer_path(&identity.uid, timer_id));
    }
}

pub struct TimerStore {
    core: SyncCore<TimerKind>,
}

impl TimerStore {
    pub fn new(local: LocalStore, mirror: MirrorClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            core: SyncCore::new(local, mirror, clock),
        }
    }

    pub fn initialize(&self) {
        self.core.initialize();
    }

    pub fn timers(&self) -> Vec<Timer> {
        self.core.state()
    }

    pub fn get(&self, id: &str) -> Option<Timer> {
        self.timers().into_iter().find(|t| t.id == id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Timer>> {
        self.core.subscribe()
    }

    pub fn mode(&self) -> Mode {
        self.core.mode()
    }

    pub async fn flush(&self) {
        self.core.flush().await;
    }

    /// Adds a default timer. `None` once the timer limit is reached.
    pub fn add(&self) -> Option<Timer> {
        self.add_timer(DEFAULT_TIMER_NAME, DEFAULT_TIMER_SECONDS)
    }

    pub fn add_timer(&self, name: &str, duration_seconds: u32) -> Option<Timer> {
        let id = generate_id(self.core.now());
        self.core.mutate(|timers, fx| {
            if timers.len() >= MAX_TIMERS {
                return None;
            }
            let timer = Timer::new(id, name.to_string(), duration_seconds);
            mirror_timer(fx, &timer, true);
            timers.push(timer.clone());
            Some(timer)
        })
    }

    pub fn remove(&self, id: &str) -> bool {
        self.core.mutate(|timers, fx| {
            let before = timers.len();
            timers.retain(|t| t.id != id);
            let removed = timers.len() != before;
            if removed {
                unmirror_timer(fx, id);
            }
            removed
        })
    }

    pub fn apply(&self, id: &str, update: TimerUpdate) -> Option<Timer> {
        self.core.mutate(|timers, fx| {
            let timer = timers.iter_mut().find(|t| t.id == id)?;
            let now = fx.now();
            match &update {
                TimerUpdate::Rename { name } => timer.name = name.clone(),
                TimerUpdate::SetDuration { seconds } => timer.set_duration(*seconds),
                TimerUpdate::Start => timer.start(now),
                TimerUpdate::Pause => timer.pause(now),
                TimerUpdate::Reset => timer.reset(),
                TimerUpdate::Complete => timer.complete(),
                TimerUpdate::Tick { remaining } => timer.remaining_seconds = *remaining,
            }
            let updated = timer.clone();
            if update.is_mirrored() {
                mirror_timer(fx, &updated, false);
            }
            Some(updated)
        })
    }

    pub fn start(&self, id: &str) -> Option<Timer> {
        self.apply(id, TimerUpdate::Start)
    }

    pub fn pause(&self, id: &str) -> Option<Timer> {
        self.apply(id, TimerUpdate::Pause)
    }

    pub fn reset(&self, id: &str) -> Option<Timer> {
        self.apply(id, TimerUpdate::Reset)
    }

    pub fn complete(&self, id: &str) -> Option<Timer> {
        self.apply(id, TimerUpdate::Complete)
    }

    pub fn update_remaining(&self, id: &str, remaining: u32) -> Option<Timer> {
        self.apply(id, TimerUpdate::Tick { remaining })
    }

    pub fn set_duration(&self, id: &str, seconds: u32) -> Option<Timer> {
        self.apply(id, TimerUpdate::SetDuration { seconds })
    }

    pub fn set_name(&self, id: &str, name: &str) -> Option<Timer> {
        self.apply(id, TimerUpdate::Rename { name: name.to_string() })
    }

    pub fn clear_all(&self) {
        self.core.mutate(|timers, fx| {
            for timer in timers.drain(..) {
                unmirror_timer(fx, &timer.id);
            }
        });
    }
}

impl IdentityListener for TimerStore {
    fn on_identity_change(&self, identity: Option<&Identity>) {
        self.core.on_identity_change(identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RemoteConfig;
    use crate::models::TimerStatus;
    use crate::remote::memory::MemoryBackend;

    fn store(clock: Arc<ManualClock>) -> (TimerStore, LocalStore) {
        let local = LocalStore::in_memory();
        let store = TimerStore::new(local.clone(), MirrorClient::disabled(), clock);
        store.initialize();
        (store, local)
    }

    #[test]
    fn merge_keeps_active_run_state() {
        let mut running = Timer::new("a".into(), "Tea".into(), 90);
        running.start(1_000);
        let mut paused = Timer::new("b".into(), "Eggs".into(), 300);
        paused.start(0);
        paused.pause(60_000);
        let mut completed = Timer::new("c".into(), "Rice".into(), 600);
        completed.complete();

        let delivered = vec![
            Timer::new("a".into(), "Green tea".into(), 120),
            Timer::new("b".into(), "Eggs".into(), 300),
            Timer::new("c".into(), "Rice".into(), 600),
            Timer::new("d".into(), "New".into(), 30),
        ];
        let local = [running.clone(), paused.clone(), completed];
        let merged = merge_timers(&local, delivered, &Pending::default());

        assert_eq!(merged.len(), 4);
        assert_eq!(merged[0].status, TimerStatus::Running);
        assert_eq!(merged[0].end_timestamp, running.end_timestamp);
        assert_eq!(merged[0].name, "Green tea");
        assert_eq!(merged[0].duration_seconds, 120);
        assert_eq!(merged[1].status, TimerStatus::Paused);
        assert_eq!(merged[1].remaining_seconds, 240);
        assert_eq!(merged[2].status, TimerStatus::Idle);
        assert_eq!(merged[2].remaining_seconds, 600);
        assert_eq!(merged[3].id, "d");
    }

    #[test]
    fn pending_timers_keep_local_version() {
        let mut queued = Timer::new("b".into(), "Queued".into(), 30);
        queued.start(0);
        let deleted_here = Timer::new("c".into(), "Gone".into(), 30);
        let mut pending = Pending::default();
        pending.add("b");
        pending.add("c");

        let delivered = vec![Timer::new("a".into(), "Remote".into(), 10), deleted_here];
        let merged = merge_timers(&[queued.clone()], delivered, &pending);
        let ids: Vec<&str> = merged.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(merged[1], queued);
    }

    #[tokio::test]
    async fn queued_create_survives_earlier_snapshot() {
        let backend = Arc::new(MemoryBackend::new());
        let mirror = MirrorClient::new(RemoteConfig::new("k", "d", "p"), backend.clone());
        let clock = Arc::new(ManualClock::new(1_000));
        let store = TimerStore::new(LocalStore::in_memory(), mirror, clock);
        store.initialize();
        store.on_identity_change(Some(&Identity {
            uid: "ada".into(),
            display_name: None,
            email: None,
        }));

        store.add_timer("A", 60).unwrap();
        let b = store.add_timer("B", 90).unwrap();
        let started = store.start(&b.id).unwrap();
        store.flush().await;

        let after = store.get(&b.id).unwrap();
        assert_eq!(after.status, TimerStatus::Running);
        assert_eq!(after.end_timestamp, started.end_timestamp);
        assert_eq!(store.timers().len(), 2);
        assert_eq!(backend.collection("users/ada/timers").len(), 2);
    }

    #[test]
    fn merge_drops_timers_missing_remotely() {
        let local = vec![Timer::new("gone".into(), "x".into(), 10)];
        assert!(merge_timers(&local, Vec::new(), &Pending::default()).is_empty());
    }

    #[tokio::test]
    async fn add_start_pause_scenario() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let (store, _) = store(clock.clone());

        let timer = store.add_timer("Tea", 90).unwrap();
        assert_eq!(timer.duration_seconds, 90);
        assert_eq!(timer.remaining_seconds, 90);
        assert_eq!(timer.status, TimerStatus::Idle);

        let started = store.start(&timer.id).unwrap();
        assert_eq!(started.status, TimerStatus::Running);
        assert_eq!(started.end_timestamp, Some(1_700_000_090_000));

        clock.advance(10_000);
        let paused = store.pause(&timer.id).unwrap();
        assert_eq!(paused.status, TimerStatus::Paused);
        assert_eq!(paused.remaining_seconds, 80);
        assert_eq!(paused.end_timestamp, None);
    }

    #[tokio::test]
    async fn every_mutation_is_written_through() {
        let clock = Arc::new(ManualClock::new(0));
        let (store, local) = store(clock);

        let a = store.add().unwrap();
        assert_eq!(local.load::<Vec<Timer>>(TIMERS_KEY), store.timers());
        store.set_name(&a.id, "Laundry");
        assert_eq!(local.load::<Vec<Timer>>(TIMERS_KEY), store.timers());
        store.start(&a.id);
        assert_eq!(local.load::<Vec<Timer>>(TIMERS_KEY), store.timers());
        store.remove(&a.id);
        assert!(local.load::<Vec<Timer>>(TIMERS_KEY).is_empty());
    }

    #[tokio::test]
    async fn limit_and_unknown_ids() {
        let (store, _) = store(Arc::new(ManualClock::new(0)));
        for _ in 0..MAX_TIMERS {
            assert!(store.add().is_some());
        }
        let rx = store.subscribe();
        assert!(store.add().is_none());
        assert_eq!(store.timers().len(), MAX_TIMERS);
        assert!(store.start("missing").is_none());
        assert!(!store.remove("missing"));
        assert!(!rx.has_changed().unwrap());

        store.clear_all();
        assert!(store.timers().is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_each_mutation() {
        let (store, _) = store(Arc::new(ManualClock::new(0)));
        let rx = store.subscribe();
        let timer = store.add().unwrap();
        assert_eq!(rx.borrow().len(), 1);
        store.set_duration(&timer.id, 30);
        assert_eq!(rx.borrow()[0].duration_seconds, 30);
    }
}
