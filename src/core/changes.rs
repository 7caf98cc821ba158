//! # Push notification processing.
//!
//! ```text
//! NotificationSink ──► dispatcher ──spawn──► process(n)
//!                                              │ wait_for(source_id, event_id)   bounded by publish_wait
//!                                              ▼
//!                                         sub.enqueue(n)
//!                                              │
//!                                              ▼
//!                                   drain: acquire gate ─► pop lowest sequence
//!                                              │
//!                     ┌────────────────────────┼──────────────────────────┐
//!                  Stale                  Contiguous                    Gap
//!           NotificationIgnored      apply by transition        ResyncRequested
//!                                                               snapshot reconcile
//!                                              │
//!                                        release gate, loop until queue empty
//! ```
//!
//! Every notification task races the runtime token and stops on terminate.
//! The queue is a min-heap, so a contiguous notification that arrived late
//! is applied before a later one that would otherwise reveal a gap.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::engine::Engine;
use super::store::Sighting;
use super::subscription::{Order, Subscription};
use crate::events::{Event, EventKind};
use crate::registry::{Notification, Transition};

impl Engine {
    /// Spawns the task that fans inbound notifications out to processing tasks.
    pub(crate) fn spawn_dispatcher(self: &Arc<Self>, mut rx: mpsc::UnboundedReceiver<Notification>) {
        let me = Arc::clone(self);
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(n) => {
                            let me = Arc::clone(&me);
                            let token = token.clone();
                            tokio::spawn(async move {
                                tokio::select! {
                                    _ = token.cancelled() => {}
                                    _ = me.process_notification(n) => {}
                                }
                            });
                        }
                        None => break,
                    }
                }
            }
        });
    }

    async fn process_notification(&self, n: Notification) {
        let sub = self
            .subscriptions
            .wait_for(n.source_id, n.event_id, self.cfg.publish_wait)
            .await;
        let Some(sub) = sub else {
            self.bus.publish(
                Event::new(EventKind::NotificationDropped)
                    .with_service(n.service_id)
                    .with_sequence(n.sequence)
                    .with_reason(format!("no subscription for {}/{}", n.source_id, n.event_id)),
            );
            return;
        };

        sub.enqueue(n);
        self.drain(&sub).await;
    }

    /// Applies queued notifications in sequence order until the queue is empty.
    async fn drain(&self, sub: &Arc<Subscription>) {
        let poll = self.cfg.gate_poll_clamped();
        loop {
            let Some(_gate) = sub.acquire(poll).await else {
                return;
            };
            let Some((n, order)) = sub.next_pending() else {
                return;
            };

            match order {
                Order::Stale => {
                    self.bus.publish(
                        Event::new(EventKind::NotificationIgnored)
                            .with_registry(sub.id.clone())
                            .with_service(n.service_id)
                            .with_sequence(n.sequence),
                    );
                }
                Order::Contiguous => self.apply_notification(sub, n),
                Order::Gap { cursor } => {
                    self.bus.publish(
                        Event::new(EventKind::ResyncRequested)
                            .with_registry(sub.id.clone())
                            .with_sequence(n.sequence)
                            .with_reason(format!("cursor={cursor}")),
                    );
                    self.reconcile_snapshot(sub).await;
                }
            }
        }
    }

    /// Applies one contiguous notification. Caller holds the gate.
    fn apply_notification(&self, sub: &Subscription, n: Notification) {
        let sighting = match n.transition {
            Transition::Removed => {
                self.store.dissociate_registry(&n.service_id, &sub.id);
                return;
            }
            Transition::Added => Sighting::Added,
            Transition::Refreshed => Sighting::Refreshed,
        };

        match n.item {
            Some(item) if item.is_usable() => self.reconcile_item(&sub.id, item, sighting),
            _ => {
                self.bus.publish(
                    Event::new(EventKind::NotificationDropped)
                        .with_registry(sub.id.clone())
                        .with_service(n.service_id)
                        .with_sequence(n.sequence)
                        .with_reason("unusable payload"),
                );
            }
        }
    }
}
