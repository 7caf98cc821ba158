//! # Non-blocking fan-out of view changes to observers.
//!
//! Provides [`ObserverSet`] — distributes [`ObserverEvent`]s to every
//! registered observer without blocking the emitter.
//!
//! ## Architecture
//! ```text
//! emit(event)  (called inside a record transform)
//!     │ stamp = next_stamp++
//!     ├──► [queue 1] ──► worker 1 ──► observer1.added/removed/changed()
//!     │    (bounded)         └──────► panic → ObserverPanicked
//!     ├──► [queue 2] ──► worker 2 ──► observer2...
//!     └──► [queue N] ──► worker N ──► observerN...
//! ```
//!
//! ## Rules
//! - **Copy-on-write set**: `emit` loads the current channel list without locking;
//!   `add`/`remove` swap in a new list.
//! - **Overflow**: event dropped for that observer only, `ObserverOverflow` published.
//! - **Isolation**: a slow or panicking observer doesn't affect others.
//! - **Per-observer FIFO**.
//!
//! ## Replay
//! A newly added observer first receives `added` for every visible record.
//! Every emitted event carries a global stamp, and every visible record
//! remembers the stamp of its last announcement. The new worker drops live
//! events the replay already reflects:
//! ```text
//! register channel ─► start = stamp ─► snapshot view ─► end = stamp
//!   ev.stamp <  start                  → skip (reflected in snapshot)
//!   ev.stamp >= end                    → deliver
//!   in snapshot with stamp s           → deliver iff ev.stamp > s
//!   not in snapshot                    → deliver Added; Removed/Changed only after a delivered Added
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::observe::{Observe, ObserverEvent, deliver};
use crate::events::{Bus, Event};
use crate::model::{ServiceId, ServiceItem};

/// Handle identifying a registered observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Event plus the stamp it was emitted with.
struct Stamped {
    stamp: u64,
    event: ObserverEvent,
}

/// Per-observer channel metadata.
struct ObserverChannel {
    id: ObserverId,
    name: &'static str,
    sender: mpsc::Sender<Arc<Stamped>>,
}

/// Visible records at registration time, with their announcement stamps.
struct Replay {
    items: Vec<(ServiceItem, u64)>,
    start: u64,
    end: u64,
}

/// Drops live events already reflected by the replay.
struct ReplayFilter {
    stamps: HashMap<ServiceId, u64>,
    live: HashSet<ServiceId>,
    start: u64,
    end: u64,
}

impl ReplayFilter {
    fn admit(&mut self, st: &Stamped) -> bool {
        if st.stamp >= self.end {
            return true;
        }
        if st.stamp < self.start {
            return false;
        }
        let id = st.event.service_id();
        if let Some(&seen) = self.stamps.get(id) {
            return st.stamp > seen;
        }
        match &st.event {
            ObserverEvent::Added(_) => {
                self.live.insert(id.clone());
                true
            }
            ObserverEvent::Removed(_) => self.live.remove(id),
            ObserverEvent::Changed { .. } => self.live.contains(id),
        }
    }
}

/// Fan-out coordinator for cache observers.
pub struct ObserverSet {
    channels: ArcSwap<Vec<Arc<ObserverChannel>>>,
    workers: Mutex<HashMap<ObserverId, JoinHandle<()>>>,
    next_id: AtomicU64,
    next_stamp: AtomicU64,
    default_capacity: usize,
    bus: Bus,
}

impl ObserverSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new(default_capacity: usize, bus: Bus) -> Self {
        Self {
            channels: ArcSwap::from_pointee(Vec::new()),
            workers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            next_stamp: AtomicU64::new(1),
            default_capacity: default_capacity.max(1),
            bus,
        }
    }

    /// Registers an observer and spawns its worker.
    ///
    /// `snapshot` is invoked after the observer's queue is live and must return
    /// every visible record with the stamp of its last announcement.
    pub fn add<F>(&self, observer: Arc<dyn Observe>, snapshot: F) -> ObserverId
    where
        F: FnOnce() -> Vec<(ServiceItem, u64)>,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cap = observer.queue_capacity().unwrap_or(self.default_capacity).max(1);
        let name = observer.name();
        let (tx, rx) = mpsc::channel::<Arc<Stamped>>(cap);
        let (replay_tx, replay_rx) = oneshot::channel::<Replay>();

        let handle = tokio::spawn(run_worker(observer, rx, replay_rx, self.bus.clone()));
        self.workers.lock().insert(id, handle);

        let channel = Arc::new(ObserverChannel { id, name, sender: tx });
        self.channels.rcu(|cur| {
            let mut next = Vec::with_capacity(cur.len() + 1);
            next.extend(cur.iter().cloned());
            next.push(Arc::clone(&channel));
            next
        });

        let start = self.next_stamp.load(Ordering::SeqCst);
        let items = snapshot();
        let end = self.next_stamp.load(Ordering::SeqCst);
        let _ = replay_tx.send(Replay { items, start, end });
        id
    }

    /// Unregisters an observer; its worker drains what is already queued and exits.
    ///
    /// Returns `false` if the id is unknown.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut found = false;
        self.channels.rcu(|cur| {
            found = cur.iter().any(|c| c.id == id);
            cur.iter()
                .filter(|c| c.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        self.workers.lock().remove(&id);
        found
    }

    /// Emits an event to every observer and returns its stamp.
    ///
    /// - Uses `try_send` (non-blocking)
    /// - On queue full/closed: drops the event for that observer, publishes `ObserverOverflow`
    pub fn emit(&self, event: ObserverEvent) -> u64 {
        let stamp = self.next_stamp.fetch_add(1, Ordering::SeqCst);
        let channels = self.channels.load();
        if channels.is_empty() {
            return stamp;
        }

        let stamped = Arc::new(Stamped { stamp, event });
        for channel in channels.iter() {
            match channel.sender.try_send(Arc::clone(&stamped)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.bus.publish(Event::observer_overflow(channel.name, "full"));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.bus.publish(Event::observer_overflow(channel.name, "closed"));
                }
            }
        }
        stamp
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.load().len()
    }

    /// True if no observer is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.load().is_empty()
    }

    /// Closes every queue and waits for the workers to drain.
    pub async fn shutdown(&self) {
        self.channels.store(Arc::new(Vec::new()));
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain().map(|(_, h)| h).collect();
        for h in workers {
            let _ = h.await;
        }
    }
}

/// Worker loop: replay first, then live events.
async fn run_worker(
    observer: Arc<dyn Observe>,
    mut rx: mpsc::Receiver<Arc<Stamped>>,
    replay_rx: oneshot::Receiver<Replay>,
    bus: Bus,
) {
    let mut filter = match replay_rx.await {
        Ok(replay) => {
            let mut stamps = HashMap::with_capacity(replay.items.len());
            for (item, stamp) in replay.items {
                stamps.insert(item.id.clone(), stamp);
                deliver_guarded(observer.as_ref(), &ObserverEvent::Added(item), &bus).await;
            }
            Some(ReplayFilter {
                stamps,
                live: HashSet::new(),
                start: replay.start,
                end: replay.end,
            })
        }
        Err(_) => None,
    };

    while let Some(st) = rx.recv().await {
        if let Some(f) = filter.as_mut() {
            if !f.admit(&st) {
                continue;
            }
        }
        deliver_guarded(observer.as_ref(), &st.event, &bus).await;
    }
}

/// Delivers one event, converting a panic into `ObserverPanicked`.
async fn deliver_guarded(observer: &dyn Observe, event: &ObserverEvent, bus: &Bus) {
    let fut = deliver(observer, event);
    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
        let info = {
            let any = &*panic_err;
            if let Some(msg) = any.downcast_ref::<&'static str>() {
                (*msg).to_string()
            } else if let Some(msg) = any.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            }
        };
        bus.publish(Event::observer_panicked(observer.name(), info));
    }
}
