//! # Discard-retry timers.
//!
//! One cancellable sleeping task per discarded identity. When a timer fires,
//! the identity is handed to the retry worker (see `core::reconcile`), which
//! re-checks the record through the store.
//!
//! ```text
//! schedule(id) ──► spawn: select { sleep(discard_wait) , cancelled }
//!                              │ fired
//!                              ▼
//!                   pending.remove(id) if same generation
//!                              │
//!                              ▼
//!                     fired_tx.send(id) ──► retry worker
//! ```
//!
//! ## Rules
//! - At most one timer per identity; rescheduling cancels the previous one.
//! - Every timer is a child of the runtime token (cancelled on terminate).
//! - Called from inside record transforms: never touches the record store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::model::ServiceId;

/// Armed timer bookkeeping.
struct Armed {
    generation: u64,
    cancel: CancellationToken,
}

pub(crate) struct DiscardTimers {
    pending: Arc<Mutex<HashMap<ServiceId, Armed>>>,
    next_generation: AtomicU64,
    delay: Duration,
    fired_tx: mpsc::UnboundedSender<ServiceId>,
    runtime_token: CancellationToken,
    bus: Bus,
}

impl DiscardTimers {
    pub(crate) fn new(
        delay: Duration,
        fired_tx: mpsc::UnboundedSender<ServiceId>,
        runtime_token: CancellationToken,
        bus: Bus,
    ) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
            delay,
            fired_tx,
            runtime_token,
            bus,
        }
    }

    /// Arms (or re-arms) the timer for `id`.
    pub(crate) fn schedule(&self, id: &ServiceId) {
        if self.runtime_token.is_cancelled() {
            return;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.runtime_token.child_token();

        let previous = self.pending.lock().insert(
            id.clone(),
            Armed {
                generation,
                cancel: cancel.clone(),
            },
        );
        if let Some(prev) = previous {
            prev.cancel.cancel();
        }

        self.bus.publish(
            Event::new(EventKind::DiscardRetryScheduled)
                .with_service(id.clone())
                .with_delay(self.delay),
        );

        let delay = self.delay;
        let id = id.clone();
        let tx = self.fired_tx.clone();
        let bus = self.bus.clone();
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let current = {
                        let mut map = pending.lock();
                        match map.get(&id) {
                            Some(armed) if armed.generation == generation => {
                                map.remove(&id);
                                true
                            }
                            _ => false,
                        }
                    };
                    if current {
                        bus.publish(Event::new(EventKind::DiscardRetryFired).with_service(id.clone()));
                        let _ = tx.send(id);
                    }
                }
            }
        });
    }

    /// Arms the timer for `id` unless one is already armed.
    pub(crate) fn ensure_scheduled(&self, id: &ServiceId) {
        if !self.is_pending(id) {
            self.schedule(id);
        }
    }

    /// Disarms the timer for `id`. Returns `true` if one was armed.
    pub(crate) fn cancel(&self, id: &ServiceId) -> bool {
        match self.pending.lock().remove(id) {
            Some(armed) => {
                armed.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// True if a timer is armed for `id`.
    pub(crate) fn is_pending(&self, id: &ServiceId) -> bool {
        self.pending.lock().contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timers(delay: Duration) -> (DiscardTimers, mpsc::UnboundedReceiver<ServiceId>, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        (DiscardTimers::new(delay, tx, token.clone(), Bus::new(16)), rx, token)
    }

    #[tokio::test]
    async fn test_timer_fires_once() {
        let (t, mut rx, _token) = timers(Duration::from_millis(20));
        let id = ServiceId::from("svc-1");
        t.schedule(&id);
        assert!(t.is_pending(&id));

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert_eq!(fired.ok().flatten(), Some(id.clone()));
        assert!(!t.is_pending(&id));
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_fires() {
        let (t, mut rx, _token) = timers(Duration::from_millis(20));
        let id = ServiceId::from("svc-1");
        t.schedule(&id);
        assert!(t.cancel(&id));
        assert!(!t.cancel(&id));

        let fired = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_reschedule_replaces_previous_timer() {
        let (t, mut rx, _token) = timers(Duration::from_millis(30));
        let id = ServiceId::from("svc-1");
        t.schedule(&id);
        t.schedule(&id);
        t.ensure_scheduled(&id);

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert_eq!(first.ok().flatten(), Some(id));
        let second = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_runtime_cancel_stops_timers() {
        let (t, mut rx, token) = timers(Duration::from_millis(20));
        t.schedule(&ServiceId::from("svc-1"));
        token.cancel();
        t.schedule(&ServiceId::from("svc-2"));
        assert!(!t.is_pending(&ServiceId::from("svc-2")));

        let fired = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(fired.is_err());
    }
}
