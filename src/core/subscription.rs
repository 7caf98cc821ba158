//! # Registry subscriptions and their ordering gate.
//!
//! A [`Subscription`] exists for every registry whose subscribe call
//! succeeded and that has not been dropped. It owns:
//! - the sequence cursor (last applied notification),
//! - the ordering gate (`suspended`), held while a notification or a
//!   snapshot is applied,
//! - the queue of notifications waiting for the gate, ordered by sequence.
//!
//! ## Gate
//! ```text
//! acquire(poll):
//!   loop {
//!     discarded?  → None
//!     !suspended? → suspended = true, Some(Gate)
//!     wait(wake, poll)          bounded; every wake re-checks
//!   }
//! drop(Gate):  suspended = false, wake all
//! close(poll): wait until !suspended, then discarded = true (gate stays open)
//! ```
//! The gate is only given back by dropping its [`Gate`] guard, so work that
//! panics while holding it still reopens it.
//!
//! [`SubscriptionSet`] is the published set, indexed by registry and by the
//! `(source_id, event_id)` pair echoed in notifications. Publication wakes
//! notifications that arrived before their subscription was visible.

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::registry::{BySequence, LeaseHandle, Notification, RegistryId, RegistryRef, SourceId, SubscriptionGrant};

/// Mutable subscription state, guarded by one lock.
struct SubState {
    cursor: u64,
    suspended: bool,
    discarded: bool,
    pending: BinaryHeap<BySequence>,
}

/// Position of a notification relative to the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Order {
    /// `sequence == cursor + 1`.
    Contiguous,
    /// `sequence <= cursor`.
    Stale,
    /// `sequence > cursor + 1`: transitions may have been missed.
    Gap { cursor: u64 },
}

/// One live subscription with a registry.
pub(crate) struct Subscription {
    pub(crate) id: RegistryId,
    pub(crate) registry: RegistryRef,
    pub(crate) source_id: SourceId,
    pub(crate) event_id: u64,
    pub(crate) lease: LeaseHandle,
    state: Mutex<SubState>,
    wake: Notify,
}

impl Subscription {
    /// Creates a subscription with its gate already held by the caller.
    pub(crate) fn new_suspended(registry: RegistryRef, grant: SubscriptionGrant) -> Arc<Self> {
        Arc::new(Self {
            id: registry.id(),
            registry,
            source_id: grant.source_id,
            event_id: grant.event_id,
            lease: grant.lease,
            state: Mutex::new(SubState {
                cursor: grant.initial_sequence,
                suspended: true,
                discarded: false,
                pending: BinaryHeap::new(),
            }),
            wake: Notify::new(),
        })
    }

    /// Takes the gate. Returns `None` if the subscription was discarded.
    pub(crate) async fn acquire(&self, poll: Duration) -> Option<Gate<'_>> {
        loop {
            let notified = self.wake.notified();
            {
                let mut st = self.state.lock();
                if st.discarded {
                    return None;
                }
                if !st.suspended {
                    st.suspended = true;
                    return Some(Gate { sub: self });
                }
            }
            let _ = tokio::time::timeout(poll, notified).await;
        }
    }

    /// Guard for the gate taken by [`new_suspended`](Self::new_suspended).
    ///
    /// Call once, from the task that created the subscription.
    pub(crate) fn held(&self) -> Gate<'_> {
        Gate { sub: self }
    }

    fn release(&self) {
        self.state.lock().suspended = false;
        self.wake.notify_waiters();
    }

    /// Waits for in-flight work to finish, then marks the subscription discarded.
    ///
    /// Queued notifications are dropped. Returns `false` if it was already discarded.
    pub(crate) async fn close(&self, poll: Duration) -> bool {
        loop {
            let notified = self.wake.notified();
            {
                let mut st = self.state.lock();
                if st.discarded {
                    return false;
                }
                if !st.suspended {
                    st.discarded = true;
                    st.pending.clear();
                    drop(st);
                    self.wake.notify_waiters();
                    return true;
                }
            }
            let _ = tokio::time::timeout(poll, notified).await;
        }
    }

    /// Marks the subscription discarded without waiting for the gate.
    pub(crate) fn abandon(&self) {
        let mut st = self.state.lock();
        st.discarded = true;
        st.pending.clear();
        drop(st);
        self.wake.notify_waiters();
    }

    #[cfg(test)]
    pub(crate) fn is_discarded(&self) -> bool {
        self.state.lock().discarded
    }

    /// Queues a notification until the gate holder picks it up.
    pub(crate) fn enqueue(&self, notification: Notification) {
        let mut st = self.state.lock();
        if !st.discarded {
            st.pending.push(BySequence(notification));
        }
    }

    /// Pops the lowest queued notification and classifies it against the cursor.
    ///
    /// Contiguous and gap notifications move the cursor to their sequence.
    /// Must be called while holding the gate.
    pub(crate) fn next_pending(&self) -> Option<(Notification, Order)> {
        let mut st = self.state.lock();
        let BySequence(n) = st.pending.pop()?;
        let order = if n.sequence <= st.cursor {
            Order::Stale
        } else if n.sequence == st.cursor + 1 {
            st.cursor = n.sequence;
            Order::Contiguous
        } else {
            let cursor = st.cursor;
            st.cursor = n.sequence;
            Order::Gap { cursor }
        };
        Some((n, order))
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> u64 {
        self.state.lock().cursor
    }
}

/// Exclusive hold on a subscription's gate; dropping it gives the gate back
/// and wakes every waiter.
pub(crate) struct Gate<'a> {
    sub: &'a Subscription,
}

impl Drop for Gate<'_> {
    fn drop(&mut self) {
        self.sub.release();
    }
}

#[derive(Default)]
struct SetInner {
    by_registry: HashMap<RegistryId, Arc<Subscription>>,
    by_source: HashMap<(SourceId, u64), Arc<Subscription>>,
}

/// Published subscriptions.
#[derive(Default)]
pub(crate) struct SubscriptionSet {
    inner: RwLock<SetInner>,
    published: Notify,
}

impl SubscriptionSet {
    /// Makes `sub` visible to notification processing.
    pub(crate) fn publish(&self, sub: Arc<Subscription>) {
        {
            let mut inner = self.inner.write();
            inner
                .by_source
                .insert((sub.source_id, sub.event_id), Arc::clone(&sub));
            inner.by_registry.insert(sub.id.clone(), sub);
        }
        self.published.notify_waiters();
    }

    /// Removes the subscription for `registry`.
    pub(crate) fn remove(&self, registry: &RegistryId) -> Option<Arc<Subscription>> {
        let mut inner = self.inner.write();
        let sub = inner.by_registry.remove(registry)?;
        inner.by_source.remove(&(sub.source_id, sub.event_id));
        Some(sub)
    }

    pub(crate) fn get(&self, registry: &RegistryId) -> Option<Arc<Subscription>> {
        self.inner.read().by_registry.get(registry).cloned()
    }

    /// Subscription a notification belongs to, if published.
    pub(crate) fn find(&self, source_id: SourceId, event_id: u64) -> Option<Arc<Subscription>> {
        self.inner.read().by_source.get(&(source_id, event_id)).cloned()
    }

    /// Like [`find`](Self::find), waiting up to `wait` for the subscription to be published.
    pub(crate) async fn wait_for(&self, source_id: SourceId, event_id: u64, wait: Duration) -> Option<Arc<Subscription>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.published.notified();
            if let Some(sub) = self.find(source_id, event_id) {
                return Some(sub);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.find(source_id, event_id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn all(&self) -> Vec<Arc<Subscription>> {
        self.inner.read().by_registry.values().cloned().collect()
    }

    /// Removes and returns every subscription.
    pub(crate) fn take_all(&self) -> Vec<Arc<Subscription>> {
        let mut inner = self.inner.write();
        inner.by_source.clear();
        inner.by_registry.drain().map(|(_, sub)| sub).collect()
    }

    pub(crate) fn registries(&self) -> Vec<RegistryId> {
        self.inner.read().by_registry.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ServiceId;
    use crate::testing::FakeRegistry;

    fn grant(source: u64, initial: u64) -> SubscriptionGrant {
        SubscriptionGrant {
            source_id: SourceId(source),
            event_id: 1,
            initial_sequence: initial,
            lease: LeaseHandle::new(source, Duration::from_secs(60)),
        }
    }

    fn note(seq: u64) -> Notification {
        Notification::removed(SourceId(1), 1, seq, ServiceId::from("svc-1"))
    }

    const POLL: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_classification_against_cursor() {
        let sub = Subscription::new_suspended(FakeRegistry::new("a"), grant(1, 5));
        for seq in [8, 5, 6, 4] {
            sub.enqueue(note(seq));
        }
        assert_eq!(sub.next_pending().map(|(n, o)| (n.sequence, o)), Some((4, Order::Stale)));
        assert_eq!(sub.next_pending().map(|(n, o)| (n.sequence, o)), Some((5, Order::Stale)));
        assert_eq!(sub.next_pending().map(|(n, o)| (n.sequence, o)), Some((6, Order::Contiguous)));
        assert_eq!(
            sub.next_pending().map(|(n, o)| (n.sequence, o)),
            Some((8, Order::Gap { cursor: 6 }))
        );
        assert_eq!(sub.cursor(), 8);
        assert!(sub.next_pending().is_none());
    }

    #[tokio::test]
    async fn test_gate_is_exclusive() {
        let sub = Subscription::new_suspended(FakeRegistry::new("a"), grant(1, 0));
        let held = sub.held();
        let waiter = {
            let sub = Arc::clone(&sub);
            tokio::spawn(async move { sub.acquire(POLL).await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.expect("join"));
    }

    #[tokio::test]
    async fn test_gate_reopens_when_holder_panics() {
        let sub = Subscription::new_suspended(FakeRegistry::new("a"), grant(1, 0));
        let holder = {
            let sub = Arc::clone(&sub);
            tokio::spawn(async move {
                let _gate = sub.held();
                panic!("holder failed");
            })
        };
        assert!(holder.await.is_err());

        let closed = tokio::time::timeout(Duration::from_secs(1), sub.close(POLL)).await;
        assert_eq!(closed.ok(), Some(true));
        assert!(sub.is_discarded());
    }

    #[tokio::test]
    async fn test_close_waits_for_holder_and_rejects_later_acquire() {
        let sub = Subscription::new_suspended(FakeRegistry::new("a"), grant(1, 0));
        sub.enqueue(note(1));
        let closer = {
            let sub = Arc::clone(&sub);
            tokio::spawn(async move { sub.close(POLL).await })
        };
        let held = sub.held();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!closer.is_finished());

        drop(held);
        assert!(closer.await.expect("join"));
        assert!(sub.is_discarded());
        assert!(sub.acquire(POLL).await.is_none());
        assert!(sub.next_pending().is_none());
        assert!(!sub.close(POLL).await);
    }

    #[tokio::test]
    async fn test_wait_for_publication() {
        let set = Arc::new(SubscriptionSet::default());
        let waiter = {
            let set = Arc::clone(&set);
            tokio::spawn(async move { set.wait_for(SourceId(7), 1, Duration::from_secs(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        set.publish(Subscription::new_suspended(FakeRegistry::new("a"), grant(7, 0)));

        let found = waiter.await.expect("join").expect("published");
        assert_eq!(found.id, RegistryId::from("a"));
        assert_eq!(set.registries(), vec![RegistryId::from("a")]);
    }

    #[tokio::test]
    async fn test_wait_for_gives_up() {
        let set = SubscriptionSet::default();
        assert!(set.wait_for(SourceId(9), 1, Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_unindexes_both_keys() {
        let set = SubscriptionSet::default();
        set.publish(Subscription::new_suspended(FakeRegistry::new("a"), grant(3, 0)));
        assert!(set.find(SourceId(3), 1).is_some());
        assert!(set.remove(&RegistryId::from("a")).is_some());
        assert!(set.find(SourceId(3), 1).is_none());
        assert!(set.get(&RegistryId::from("a")).is_none());
        assert!(set.all().is_empty());
    }

    #[tokio::test]
    async fn test_take_all_empties_set() {
        let set = SubscriptionSet::default();
        set.publish(Subscription::new_suspended(FakeRegistry::new("a"), grant(1, 0)));
        set.publish(Subscription::new_suspended(FakeRegistry::new("b"), grant(2, 0)));
        assert_eq!(set.take_all().len(), 2);
        assert!(set.registries().is_empty());
        assert!(set.find(SourceId(1), 1).is_none());
    }
}
