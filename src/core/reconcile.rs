//! # Snapshot reconciliation, filter pipeline and discard retries.
//!
//! ## Snapshot
//! ```text
//! list(template) ──► Err     → FailureReporter (List), store untouched
//!                ├─► Ok(None) → protocol violation: panic
//!                └─► Ok(Some(items))
//!                      ├─ claimed_by(registry) \ listed  → dissociate (orphans)
//!                      └─ each usable item               → reconcile_item(Snapshot)
//! ```
//!
//! ## Filter pipeline
//! `reconcile_item` records the sighting in the store; if the store asks for
//! it, the filter runs outside any lock and its outcome is committed against
//! the generation it was computed for. A commit that lost the race is
//! dropped: whoever replaced the record runs the filter again.
//!
//! ## Discard retries
//! Fired timers arrive on a channel; the retry worker asks the store what to
//! do and re-runs the filter for records discarded by an indefinite outcome.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::engine::Engine;
use super::store::{Commit, PendingFilter, RetryPlan, Sighting};
use super::subscription::Subscription;
use crate::events::{Event, EventKind};
use crate::filter::apply_filter;
use crate::model::{ServiceId, ServiceItem};
use crate::registry::{CallContext, RegistryId};

impl Engine {
    /// Pulls a full listing from `sub`'s registry and reconciles the store with it.
    ///
    /// Caller holds the subscription's gate.
    ///
    /// # Panics
    /// If the registry answers without a listing (protocol violation).
    pub(crate) async fn reconcile_snapshot(&self, sub: &Subscription) {
        let listing = match sub.registry.list(&self.template).await {
            Ok(Some(items)) => items,
            Ok(None) => panic!("registry {} answered list without a listing", sub.id),
            Err(e) => {
                self.report(&e, &sub.id, CallContext::List);
                return;
            }
        };

        let listed: HashSet<ServiceId> = listing.iter().map(|item| item.id.clone()).collect();
        let orphans: Vec<ServiceId> = self
            .store
            .claimed_by(&sub.id)
            .into_iter()
            .filter(|id| !listed.contains(id))
            .collect();
        for id in &orphans {
            self.store.dissociate_registry(id, &sub.id);
        }

        let total = listing.len();
        for item in listing {
            if item.is_usable() {
                self.reconcile_item(&sub.id, item, Sighting::Snapshot);
            }
        }

        tracing::trace!(registry = %sub.id, listed = total, orphaned = orphans.len(), "snapshot reconciled");
        self.bus.publish(
            Event::new(EventKind::SnapshotApplied)
                .with_registry(sub.id.clone())
                .with_reason(format!("listed={} orphaned={}", total, orphans.len())),
        );
    }

    /// Records one sighting and runs the filter when the store asks for it.
    pub(crate) fn reconcile_item(&self, registry: &RegistryId, item: ServiceItem, sighting: Sighting) {
        if let Some(pending) = self.store.observe(registry, item, sighting) {
            self.filter_and_commit(pending);
        }
    }

    fn filter_and_commit(&self, pending: PendingFilter) {
        let (outcome, filtered) = apply_filter(self.filter.as_deref(), &pending.raw);
        tracing::trace!(service = %pending.raw.id, ?outcome, "filter applied");
        if self.store.commit(&pending.raw.id, pending.generation, outcome, filtered) == Commit::Stale {
            tracing::trace!(service = %pending.raw.id, "filter outcome superseded");
        }
    }

    /// Spawns the worker that handles fired discard timers.
    pub(crate) fn spawn_retry_worker(self: &Arc<Self>, mut fired: mpsc::UnboundedReceiver<ServiceId>) {
        let me = Arc::clone(self);
        let token = self.runtime_token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = fired.recv() => match msg {
                        Some(id) => me.retry_discarded(&id),
                        None => break,
                    }
                }
            }
        });
    }

    fn retry_discarded(&self, id: &ServiceId) {
        match self.store.retry(id) {
            RetryPlan::Done => {}
            RetryPlan::Undiscard => {
                self.store.undiscard(id);
            }
            RetryPlan::Refilter(pending) => self.filter_and_commit(pending),
        }
    }
}
