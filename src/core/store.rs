//! # Record store: identity → record, mutated only through per-key transforms.
//!
//! Every operation locks exactly one identity's shard entry, mutates the
//! record, and runs its side effects (observer emission, timer arming) while
//! still holding it. Side effects therefore run exactly once, in the same
//! order as the mutations of that identity.
//!
//! ## Record states
//! ```text
//!              observe (new)                     commit(Pass)
//!   (absent) ───────────────► raw only ─────────────────────────► visible
//!      ▲                         │  commit(Fail)                   │  │
//!      │◄────────────────────────┘                                 │  │ discard / commit(Indefinite)
//!      │                                                           │  ▼
//!      │◄───────── dissociate (no claims left) ────────────────────┘ discarded ── timer ──► retry
//! ```
//!
//! ## Rules
//! - `filtered` is set only by a passing filter commit for the current `raw`.
//! - Raw changes bump the record `generation`; a filter commit carries the
//!   generation it was computed for and is dropped if it no longer matches.
//! - `announced` is what observers were last told. Removals are only emitted
//!   for announced records; announcements that equal the previous one are
//!   suppressed.
//! - Lock order: store entry → timers. Timers never call back into the store.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::timers::DiscardTimers;
use crate::events::{Bus, Event, EventKind};
use crate::filter::FilterOutcome;
use crate::model::{ServiceId, ServiceItem};
use crate::observers::{ObserverEvent, ObserverSet};
use crate::registry::RegistryId;

/// How a record was sighted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Sighting {
    /// Listed by a snapshot.
    Snapshot,
    /// Pushed `Transition::Added`.
    Added,
    /// Pushed `Transition::Refreshed`.
    Refreshed,
}

/// Raw record that must go through the filter before it can be committed.
#[derive(Clone, Debug)]
pub(crate) struct PendingFilter {
    pub(crate) raw: ServiceItem,
    pub(crate) generation: u64,
}

/// Result of a filter commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Commit {
    /// Applied.
    Applied,
    /// Record was replaced or removed meanwhile; nothing changed.
    Stale,
}

/// What a fired discard timer should do next.
#[derive(Debug)]
pub(crate) enum RetryPlan {
    /// Nothing left to do (record gone or already undiscarded).
    Done,
    /// A filtered record is still held: undiscard it.
    Undiscard,
    /// Filter must be re-run.
    Refilter(PendingFilter),
}

struct RecordEntry {
    raw: ServiceItem,
    filtered: Option<ServiceItem>,
    announced: Option<ServiceItem>,
    announce_stamp: u64,
    tracking: Option<RegistryId>,
    claims: HashSet<RegistryId>,
    discarded: bool,
    generation: u64,
    /// `raw` was last replaced by a same-version sighting (payload-equal, or
    /// a refresh of the same registration): announce the result as a change.
    in_place: bool,
}

impl RecordEntry {
    /// Tells observers about `item`, relative to what they were told before.
    fn announce(&mut self, observers: &ObserverSet, item: ServiceItem) {
        let stamp = match self.announced.replace(item.clone()) {
            None => observers.emit(ObserverEvent::Added(item)),
            Some(old) if old == item => return,
            Some(old) if self.in_place || old.same_version(&item) => {
                observers.emit(ObserverEvent::Changed { old, new: item })
            }
            Some(old) => {
                observers.emit(ObserverEvent::Removed(old));
                observers.emit(ObserverEvent::Added(item))
            }
        };
        self.announce_stamp = stamp;
    }

    /// Stores a filter-approved record and makes it visible.
    fn set_filtered(&mut self, observers: &ObserverSet, timers: &DiscardTimers, filtered: ServiceItem) {
        self.filtered = Some(filtered.clone());
        self.discarded = false;
        timers.cancel(&filtered.id);
        self.announce(observers, filtered);
    }

    /// Emits a removal if observers currently see this record.
    fn retract(&mut self, observers: &ObserverSet) {
        if let Some(old) = self.announced.take() {
            observers.emit(ObserverEvent::Removed(old));
        }
    }

    fn visible(&self) -> Option<&ServiceItem> {
        if self.discarded { None } else { self.filtered.as_ref() }
    }
}

/// Read-only copy of one record (diagnostics and tests).
#[derive(Clone, Debug)]
pub(crate) struct RecordView {
    pub(crate) raw: ServiceItem,
    pub(crate) filtered: Option<ServiceItem>,
    pub(crate) tracking: Option<RegistryId>,
    pub(crate) claims: usize,
    pub(crate) discarded: bool,
}

/// Concurrent identity → record map.
pub(crate) struct RecordStore {
    records: DashMap<ServiceId, RecordEntry>,
    next_generation: AtomicU64,
    observers: Arc<ObserverSet>,
    timers: Arc<DiscardTimers>,
    bus: Bus,
}

impl RecordStore {
    pub(crate) fn new(observers: Arc<ObserverSet>, timers: Arc<DiscardTimers>, bus: Bus) -> Self {
        Self {
            records: DashMap::new(),
            next_generation: AtomicU64::new(1),
            observers,
            timers,
            bus,
        }
    }

    fn bump(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Runs `f` on the record for `id` while holding its entry.
    ///
    /// `f` returns the result and whether the record must be deleted.
    /// Returns `None` if the record does not exist.
    fn modify<R>(&self, id: &ServiceId, f: impl FnOnce(&mut RecordEntry) -> (R, bool)) -> Option<R> {
        match self.records.entry(id.clone()) {
            Entry::Occupied(mut slot) => {
                let (out, delete) = f(slot.get_mut());
                if delete {
                    slot.remove();
                }
                Some(out)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Records a sighting of `item` reported by `registry`.
    ///
    /// Returns the raw record to filter when the sighting is new or changes
    /// the record; `None` when it only adds a claim or changes nothing.
    pub(crate) fn observe(&self, registry: &RegistryId, item: ServiceItem, sighting: Sighting) -> Option<PendingFilter> {
        match self.records.entry(item.id.clone()) {
            Entry::Vacant(slot) => {
                let generation = self.bump();
                let pending = PendingFilter {
                    raw: item.clone(),
                    generation,
                };
                slot.insert(RecordEntry {
                    raw: item,
                    filtered: None,
                    announced: None,
                    announce_stamp: 0,
                    tracking: Some(registry.clone()),
                    claims: HashSet::from([registry.clone()]),
                    discarded: false,
                    generation,
                    in_place: false,
                });
                Some(pending)
            }
            Entry::Occupied(mut slot) => {
                let e = slot.get_mut();
                e.claims.insert(registry.clone());
                if e.tracking.is_none() {
                    e.tracking = Some(registry.clone());
                } else if e.tracking.as_ref() != Some(registry) {
                    return None;
                }

                let same_payload = e.raw.same_version(&item);
                let same_version = sighting == Sighting::Refreshed || same_payload;
                let identical = same_payload && e.raw.same_attributes(&item);

                if e.discarded {
                    let undiscard = sighting == Sighting::Added || !same_version;
                    if !undiscard {
                        if !identical {
                            e.raw = item;
                            e.filtered = None;
                            e.generation = self.bump();
                            e.in_place = same_version;
                            // A filter run pending for the old raw record is now stale.
                            self.timers.ensure_scheduled(&e.raw.id);
                        }
                        return None;
                    }
                } else if identical {
                    return None;
                }

                e.raw = item;
                e.filtered = None;
                e.generation = self.bump();
                e.in_place = same_version;
                Some(PendingFilter {
                    raw: e.raw.clone(),
                    generation: e.generation,
                })
            }
        }
    }

    /// Applies a filter outcome computed for `pending`.
    ///
    /// - `Pass`: stores `filtered`, undiscards, disarms the timer, announces.
    /// - `Fail`: retracts if announced and deletes the record.
    /// - `Indefinite`: marks discarded, retracts if announced, arms the timer.
    pub(crate) fn commit(&self, id: &ServiceId, generation: u64, outcome: FilterOutcome, filtered: ServiceItem) -> Commit {
        let observers = &self.observers;
        let timers = &self.timers;
        let bus = &self.bus;
        self.modify(id, |e| {
            if e.generation != generation {
                return (Commit::Stale, false);
            }
            match outcome {
                FilterOutcome::Pass => {
                    e.set_filtered(observers, timers, filtered);
                    (Commit::Applied, false)
                }
                FilterOutcome::Fail => {
                    e.retract(observers);
                    timers.cancel(id);
                    (Commit::Applied, true)
                }
                FilterOutcome::Indefinite => {
                    e.filtered = None;
                    if !e.discarded {
                        e.discarded = true;
                        bus.publish(
                            Event::new(EventKind::ServiceDiscarded)
                                .with_service(id.clone())
                                .with_reason("indefinite"),
                        );
                    }
                    e.retract(observers);
                    timers.schedule(id);
                    (Commit::Applied, false)
                }
            }
        })
        .unwrap_or(Commit::Stale)
    }

    /// Replaces raw and filtered record together without a filter run.
    ///
    /// Creates the record (claimed by `registry`) if it does not exist.
    #[cfg(test)]
    pub(crate) fn set_filtered_record(&self, registry: &RegistryId, item: ServiceItem) {
        let generation = self.bump();
        let mut e = match self.records.entry(item.id.clone()) {
            Entry::Occupied(slot) => slot.into_ref(),
            Entry::Vacant(slot) => slot.insert(RecordEntry {
                raw: item.clone(),
                filtered: None,
                announced: None,
                announce_stamp: 0,
                tracking: Some(registry.clone()),
                claims: HashSet::from([registry.clone()]),
                discarded: false,
                generation,
                in_place: false,
            }),
        };
        e.claims.insert(registry.clone());
        e.raw = item.clone();
        e.generation = generation;
        e.in_place = false;
        e.set_filtered(&self.observers, &self.timers, item);
    }

    /// Marks a visible record discarded, retracts it and arms the retry timer.
    ///
    /// A filter outcome still in flight for the record is superseded.
    /// No-op (returns `false`) if the record is absent or already discarded.
    pub(crate) fn discard(&self, id: &ServiceId) -> bool {
        self.modify(id, |e| {
            if e.discarded {
                return (false, false);
            }
            e.discarded = true;
            e.generation = self.bump();
            e.retract(&self.observers);
            self.bus.publish(
                Event::new(EventKind::ServiceDiscarded)
                    .with_service(id.clone())
                    .with_reason("explicit"),
            );
            self.timers.schedule(id);
            (true, false)
        })
        .unwrap_or(false)
    }

    /// Clears the discarded flag, disarms the timer and re-announces a
    /// filtered record if there is one.
    ///
    /// Returns `false` if the record was not discarded.
    pub(crate) fn undiscard(&self, id: &ServiceId) -> bool {
        self.modify(id, |e| {
            if !e.discarded {
                return (false, false);
            }
            e.discarded = false;
            self.timers.cancel(id);
            if let Some(filtered) = e.filtered.clone() {
                e.announce(&self.observers, filtered);
            }
            (true, false)
        })
        .unwrap_or(false)
    }

    /// Decides what a fired discard timer does for `id`.
    ///
    /// - absent or not discarded: nothing
    /// - discarded with a filtered record (explicit discard): undiscard
    /// - discarded without one (indefinite filter): re-run the filter
    pub(crate) fn retry(&self, id: &ServiceId) -> RetryPlan {
        self.modify(id, |e| {
            if !e.discarded {
                return (RetryPlan::Done, false);
            }
            match e.filtered {
                Some(_) => (RetryPlan::Undiscard, false),
                None => (
                    RetryPlan::Refilter(PendingFilter {
                        raw: e.raw.clone(),
                        generation: e.generation,
                    }),
                    false,
                ),
            }
        })
        .unwrap_or(RetryPlan::Done)
    }

    /// Removes `registry`'s claim on `id`.
    ///
    /// When no claim remains the record is deleted; a removal is emitted only
    /// if observers currently see it (a discarded record was retracted at
    /// discard time and goes silently). Returns `true` if the record was deleted.
    pub(crate) fn dissociate_registry(&self, id: &ServiceId, registry: &RegistryId) -> bool {
        self.modify(id, |e| {
            if !e.claims.remove(registry) {
                return (false, false);
            }
            if e.tracking.as_ref() == Some(registry) {
                e.tracking = e.claims.iter().next().cloned();
            }
            if !e.claims.is_empty() {
                return (false, false);
            }
            e.retract(&self.observers);
            self.timers.cancel(id);
            (true, true)
        })
        .unwrap_or(false)
    }

    /// Identities currently claimed by `registry`.
    pub(crate) fn claimed_by(&self, registry: &RegistryId) -> Vec<ServiceId> {
        self.records
            .iter()
            .filter(|r| r.value().claims.contains(registry))
            .map(|r| r.key().clone())
            .collect()
    }

    /// Records that are filtered and not discarded.
    pub(crate) fn visible(&self) -> Vec<ServiceItem> {
        self.records
            .iter()
            .filter_map(|r| r.value().visible().cloned())
            .collect()
    }

    /// Records observers currently see, with the stamp of their last announcement.
    pub(crate) fn announced(&self) -> Vec<(ServiceItem, u64)> {
        self.records
            .iter()
            .filter_map(|r| {
                let e = r.value();
                e.announced.clone().map(|item| (item, e.announce_stamp))
            })
            .collect()
    }

    pub(crate) fn view(&self, id: &ServiceId) -> Option<RecordView> {
        self.records.get(id).map(|r| {
            let e = r.value();
            RecordView {
                raw: e.raw.clone(),
                filtered: e.filtered.clone(),
                tracking: e.tracking.clone(),
                claims: e.claims.len(),
                discarded: e.discarded,
            }
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub(crate) fn timer_pending(&self, id: &ServiceId) -> bool {
        self.timers.is_pending(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceProxy;
    use crate::testing::RecordingObserver;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct Fixture {
        store: RecordStore,
        timers: Arc<DiscardTimers>,
        events: mpsc::UnboundedReceiver<ObserverEvent>,
        _fired: mpsc::UnboundedReceiver<ServiceId>,
    }

    fn fixture() -> Fixture {
        let bus = Bus::new(64);
        let observers = Arc::new(ObserverSet::new(64, bus.clone()));
        let (obs, events) = RecordingObserver::new("rec");
        observers.add(obs, Vec::new);
        let (tx, fired) = mpsc::unbounded_channel();
        let timers = Arc::new(DiscardTimers::new(
            Duration::from_secs(60),
            tx,
            CancellationToken::new(),
            bus.clone(),
        ));
        Fixture {
            store: RecordStore::new(observers, Arc::clone(&timers), bus),
            timers,
            events,
            _fired: fired,
        }
    }

    fn item(id: &str, version: u64) -> ServiceItem {
        ServiceItem::new(id, ServiceProxy::new("tcp://h:1", version))
    }

    fn reg(id: &str) -> RegistryId {
        RegistryId::from(id)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ObserverEvent>) -> ObserverEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timely")
            .expect("open")
    }

    async fn quiet(rx: &mut mpsc::UnboundedReceiver<ObserverEvent>) {
        let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(got.is_err(), "unexpected event: {got:?}");
    }

    fn pass(f: &Fixture, p: PendingFilter) -> Commit {
        f.store
            .commit(&p.raw.id.clone(), p.generation, FilterOutcome::Pass, p.raw)
    }

    #[tokio::test]
    async fn test_new_record_announced_after_pass() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        assert!(f.store.visible().is_empty());
        assert_eq!(pass(&f, p), Commit::Applied);

        assert_eq!(next(&mut f.events).await, ObserverEvent::Added(item("svc-1", 1)));
        assert_eq!(f.store.visible(), vec![item("svc-1", 1)]);
    }

    #[tokio::test]
    async fn test_identical_sighting_is_noop() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p);
        next(&mut f.events).await;

        assert!(f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).is_none());
        quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn test_pass_twice_emits_once() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p.clone());
        let before = f.store.view(&ServiceId::from("svc-1")).expect("exists");
        pass(&f, p);
        let after = f.store.view(&ServiceId::from("svc-1")).expect("exists");

        assert_eq!(before.filtered, after.filtered);
        assert_eq!(before.discarded, after.discarded);
        assert_eq!(next(&mut f.events).await, ObserverEvent::Added(item("svc-1", 1)));
        quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn test_attribute_change_emits_changed() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p);
        next(&mut f.events).await;

        let changed = item("svc-1", 1).with_attribute("zone", "b");
        let p = f.store.observe(&reg("a"), changed.clone(), Sighting::Refreshed).expect("changed");
        // Raw changed: not visible until re-filtered.
        assert!(f.store.view(&changed.id).expect("exists").filtered.is_none());
        pass(&f, p);

        assert_eq!(
            next(&mut f.events).await,
            ObserverEvent::Changed {
                old: item("svc-1", 1),
                new: changed
            }
        );
    }

    #[tokio::test]
    async fn test_version_change_emits_removed_then_added() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p);
        next(&mut f.events).await;

        let p = f.store.observe(&reg("a"), item("svc-1", 2), Sighting::Snapshot).expect("replaced");
        pass(&f, p);
        assert_eq!(next(&mut f.events).await, ObserverEvent::Removed(item("svc-1", 1)));
        assert_eq!(next(&mut f.events).await, ObserverEvent::Added(item("svc-1", 2)));
    }

    #[tokio::test]
    async fn test_refresh_with_new_payload_emits_changed() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p);
        next(&mut f.events).await;

        let refreshed = item("svc-1", 2).with_attribute("zone", "eu");
        let p = f.store.observe(&reg("a"), refreshed.clone(), Sighting::Refreshed).expect("changed");
        pass(&f, p);

        assert_eq!(
            next(&mut f.events).await,
            ObserverEvent::Changed {
                old: item("svc-1", 1),
                new: refreshed
            }
        );
        quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn test_discard_supersedes_filter_in_flight() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p);
        next(&mut f.events).await;

        let changed = item("svc-1", 1).with_attribute("zone", "eu");
        let in_flight = f.store.observe(&reg("a"), changed, Sighting::Refreshed).expect("changed");
        let id = ServiceId::from("svc-1");
        assert!(f.store.discard(&id));
        assert_eq!(next(&mut f.events).await, ObserverEvent::Removed(item("svc-1", 1)));

        assert_eq!(pass(&f, in_flight), Commit::Stale);
        assert!(f.store.view(&id).expect("retained").discarded);
        assert!(f.store.visible().is_empty());
        quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn test_stale_commit_is_dropped() {
        let mut f = fixture();
        let old = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        let new = f.store.observe(&reg("a"), item("svc-1", 2), Sighting::Snapshot).expect("replaced");

        assert_eq!(pass(&f, old), Commit::Stale);
        quiet(&mut f.events).await;
        assert_eq!(pass(&f, new), Commit::Applied);
        assert_eq!(next(&mut f.events).await, ObserverEvent::Added(item("svc-1", 2)));
    }

    #[tokio::test]
    async fn test_other_registry_only_adds_claim() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p);
        next(&mut f.events).await;

        assert!(f.store.observe(&reg("b"), item("svc-1", 2), Sighting::Snapshot).is_none());
        let view = f.store.view(&ServiceId::from("svc-1")).expect("exists");
        assert_eq!(view.claims, 2);
        assert_eq!(view.tracking, Some(reg("a")));
        quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn test_fail_retracts_and_deletes() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p);
        next(&mut f.events).await;

        let p = f.store.observe(&reg("a"), item("svc-1", 2), Sighting::Snapshot).expect("replaced");
        let id = p.raw.id.clone();
        f.store.commit(&id, p.generation, FilterOutcome::Fail, p.raw);
        assert_eq!(next(&mut f.events).await, ObserverEvent::Removed(item("svc-1", 1)));
        assert!(f.store.view(&id).is_none());
    }

    #[tokio::test]
    async fn test_fail_of_unannounced_record_is_silent() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        let id = p.raw.id.clone();
        f.store.commit(&id, p.generation, FilterOutcome::Fail, p.raw);
        assert_eq!(f.store.len(), 0);
        quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn test_indefinite_discards_and_arms_timer() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p);
        next(&mut f.events).await;

        let changed = item("svc-1", 1).with_attribute("k", "v");
        let p = f.store.observe(&reg("a"), changed, Sighting::Refreshed).expect("changed");
        let id = p.raw.id.clone();
        f.store.commit(&id, p.generation, FilterOutcome::Indefinite, p.raw);

        assert_eq!(next(&mut f.events).await, ObserverEvent::Removed(item("svc-1", 1)));
        let view = f.store.view(&id).expect("retained");
        assert!(view.discarded);
        assert!(f.timers.is_pending(&id));
        assert!(matches!(f.store.retry(&id), RetryPlan::Refilter(_)));
    }

    #[tokio::test]
    async fn test_explicit_discard_then_retry_reannounces() {
        let mut f = fixture();
        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).expect("new");
        pass(&f, p);
        next(&mut f.events).await;

        let id = ServiceId::from("svc-1");
        assert!(f.store.discard(&id));
        assert!(!f.store.discard(&id));
        assert_eq!(next(&mut f.events).await, ObserverEvent::Removed(item("svc-1", 1)));
        assert!(f.store.visible().is_empty());

        assert!(matches!(f.store.retry(&id), RetryPlan::Undiscard));
        assert!(f.store.undiscard(&id));
        assert_eq!(next(&mut f.events).await, ObserverEvent::Added(item("svc-1", 1)));
        assert!(matches!(f.store.retry(&id), RetryPlan::Done));
        quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn test_undiscard_guard() {
        let mut f = fixture();
        let id = ServiceId::from("svc-1");
        assert!(!f.store.undiscard(&id));

        f.store.set_filtered_record(&reg("a"), item("svc-1", 1));
        assert_eq!(next(&mut f.events).await, ObserverEvent::Added(item("svc-1", 1)));
        assert!(!f.store.undiscard(&id));

        f.store.discard(&id);
        next(&mut f.events).await;
        assert!(f.store.undiscard(&id));
        assert!(!f.timers.is_pending(&id));
        assert_eq!(next(&mut f.events).await, ObserverEvent::Added(item("svc-1", 1)));
    }

    #[tokio::test]
    async fn test_same_version_sighting_keeps_discarded() {
        let mut f = fixture();
        f.store.set_filtered_record(&reg("a"), item("svc-1", 1));
        next(&mut f.events).await;
        let id = ServiceId::from("svc-1");
        f.store.discard(&id);
        next(&mut f.events).await;

        assert!(f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Snapshot).is_none());
        assert!(f.store.view(&id).expect("exists").discarded);

        let p = f.store.observe(&reg("a"), item("svc-1", 1), Sighting::Added).expect("undiscard path");
        pass(&f, p);
        assert_eq!(next(&mut f.events).await, ObserverEvent::Added(item("svc-1", 1)));
        assert!(!f.store.view(&id).expect("exists").discarded);
        assert!(!f.timers.is_pending(&id));
    }

    #[tokio::test]
    async fn test_dissociate_last_claim_removes() {
        let mut f = fixture();
        let id = ServiceId::from("svc-1");
        f.store.set_filtered_record(&reg("a"), item("svc-1", 1));
        f.store.observe(&reg("b"), item("svc-1", 1), Sighting::Snapshot);
        next(&mut f.events).await;

        assert!(!f.store.dissociate_registry(&id, &reg("a")));
        assert_eq!(f.store.view(&id).expect("exists").tracking, Some(reg("b")));
        quiet(&mut f.events).await;

        assert!(f.store.dissociate_registry(&id, &reg("b")));
        assert_eq!(next(&mut f.events).await, ObserverEvent::Removed(item("svc-1", 1)));
        assert_eq!(f.store.len(), 0);
    }

    #[tokio::test]
    async fn test_dissociate_discarded_is_silent() {
        let mut f = fixture();
        let id = ServiceId::from("svc-1");
        f.store.set_filtered_record(&reg("a"), item("svc-1", 1));
        next(&mut f.events).await;
        f.store.discard(&id);
        next(&mut f.events).await;

        assert!(f.store.dissociate_registry(&id, &reg("a")));
        assert!(!f.timers.is_pending(&id));
        quiet(&mut f.events).await;
    }

    #[tokio::test]
    async fn test_claimed_by_and_announced() {
        let f = fixture();
        f.store.set_filtered_record(&reg("a"), item("svc-1", 1));
        f.store.set_filtered_record(&reg("b"), item("svc-2", 1));
        f.store.observe(&reg("b"), item("svc-1", 1), Sighting::Snapshot);

        let mut claimed = f.store.claimed_by(&reg("b"));
        claimed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(claimed, vec![ServiceId::from("svc-1"), ServiceId::from("svc-2")]);
        assert_eq!(f.store.announced().len(), 2);
    }
}
