//! # Subscribe and drop tasks.
//!
//! ```text
//! add_registry(R)  ─► known += R ─► scheduler.submit(Subscribe(R))
//!   subscribe(template, sink, lease_duration)
//!     ├─ Err          → known -= R, FailureReporter(Subscribe), SubscribeFailed
//!     ├─ terminated   → cancel_lease, nothing published
//!     └─ Ok(grant)    → publish subscription (gate held) ─► RegistrySubscribed
//!                       ─► snapshot reconcile ─► release gate
//!
//! drop_registry(R) ─► known -= R ─► cancel_tasks_for(R) ─► scheduler.submit(Drop(R))
//!   cancel_lease ─► close gate (waits for in-flight work) ─► unpublish
//!   ─► dissociate R from every record it claims ─► RegistryDropped
//! ```
//!
//! Subscribe work is never aborted once the registry call is in flight:
//! a grant obtained after termination must still have its lease cancelled.

use std::sync::Arc;

use super::engine::Engine;
use super::scheduler::TaskKind;
use super::subscription::Subscription;
use crate::events::{Event, EventKind};
use crate::registry::{CallContext, LeaseHandle, RegistryId, RegistryRef};

impl Engine {
    /// Queues a subscribe task unless `registry` is already known.
    pub(crate) fn submit_add(self: &Arc<Self>, registry: RegistryRef) {
        let id = registry.id();
        let Some(claim) = self.claim_registry(&id) else {
            tracing::debug!(registry = %id, "registry already added");
            return;
        };
        let me = Arc::clone(self);
        self.scheduler
            .submit(TaskKind::Subscribe, id, async move { me.run_subscribe(registry, claim).await });
    }

    /// Cancels queued work for `id` and queues a drop task.
    pub(crate) fn submit_drop(self: &Arc<Self>, id: RegistryId) {
        self.known.lock().remove(&id);
        let cancelled = self.scheduler.cancel_tasks_for(&id);
        if cancelled > 0 {
            tracing::debug!(registry = %id, cancelled, "queued registry tasks cancelled");
        }
        let me = Arc::clone(self);
        let task_id = id.clone();
        self.scheduler
            .submit(TaskKind::Drop, task_id, async move { me.run_drop(id).await });
    }

    async fn run_subscribe(self: Arc<Self>, registry: RegistryRef, claim: u64) {
        if self.is_terminated() {
            return;
        }
        let id = registry.id();
        let grant = match registry
            .subscribe(&self.template, self.sink.clone(), self.cfg.lease_duration)
            .await
        {
            Ok(grant) => grant,
            Err(e) => {
                // A failed add leaves the registry addable again.
                self.release_claim(&id, claim);
                self.report(&e, &id, CallContext::Subscribe);
                self.bus.publish(
                    Event::new(EventKind::SubscribeFailed)
                        .with_registry(id)
                        .with_reason(e.as_label()),
                );
                return;
            }
        };

        if self.is_terminated() {
            self.cancel_lease(&registry, &id, &grant.lease).await;
            return;
        }

        let initial = grant.initial_sequence;
        let sub = Subscription::new_suspended(registry, grant);
        let _gate = sub.held();
        self.subscriptions.publish(Arc::clone(&sub));

        // Termination may have swept the set before publication.
        if self.is_terminated() {
            if self.subscriptions.remove(&id).is_some() {
                sub.abandon();
                self.cancel_lease(&sub.registry, &id, &sub.lease).await;
            }
            return;
        }

        self.bus.publish(
            Event::new(EventKind::RegistrySubscribed)
                .with_registry(id)
                .with_sequence(initial),
        );

        tokio::select! {
            _ = self.runtime_token.cancelled() => {}
            _ = self.reconcile_snapshot(&sub) => {}
        }
    }

    async fn run_drop(self: Arc<Self>, id: RegistryId) {
        if self.is_terminated() {
            return;
        }
        let Some(sub) = self.subscriptions.get(&id) else {
            return;
        };

        self.cancel_lease(&sub.registry, &id, &sub.lease).await;
        if !sub.close(self.cfg.gate_poll_clamped()).await {
            // Terminated while waiting; termination owns the teardown.
            return;
        }
        self.subscriptions.remove(&id);

        let claimed = self.store.claimed_by(&id);
        for service in &claimed {
            self.store.dissociate_registry(service, &id);
        }

        self.bus.publish(
            Event::new(EventKind::RegistryDropped)
                .with_registry(id)
                .with_reason(format!("dissociated={}", claimed.len())),
        );
    }

    pub(crate) async fn cancel_lease(&self, registry: &RegistryRef, id: &RegistryId, lease: &LeaseHandle) {
        if let Err(e) = registry.cancel_lease(lease).await {
            self.report(&e, id, CallContext::CancelLease);
        }
    }
}
