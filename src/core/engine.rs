//! # Shared engine state.
//!
//! [`Engine`] owns every runtime component of one cache and is shared by the
//! worker pools through `Arc`. Behavior is split across sibling modules:
//! - `registries.rs`: subscribe/drop tasks
//! - `changes.rs`: push notification processing
//! - `reconcile.rs`: snapshot reconciliation, filter pipeline, discard retries

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::scheduler::TaskScheduler;
use super::store::RecordStore;
use super::subscription::SubscriptionSet;
use super::timers::DiscardTimers;
use crate::config::CacheConfig;
use crate::error::RegistryError;
use crate::events::Bus;
use crate::filter::FilterRef;
use crate::model::{ServiceId, Template};
use crate::observers::ObserverSet;
use crate::registry::{CallContext, FailureReporter, Notification, NotificationSink, RegistryId};

/// Collaborators supplied by the builder.
pub(crate) struct EngineParts {
    pub(crate) cfg: CacheConfig,
    pub(crate) template: Template,
    pub(crate) filter: Option<FilterRef>,
    pub(crate) reporter: Arc<dyn FailureReporter>,
}

pub(crate) struct Engine {
    pub(crate) cfg: CacheConfig,
    pub(crate) template: Template,
    pub(crate) filter: Option<FilterRef>,
    pub(crate) store: RecordStore,
    pub(crate) subscriptions: SubscriptionSet,
    pub(crate) scheduler: Arc<TaskScheduler>,
    pub(crate) observers: Arc<ObserverSet>,
    pub(crate) reporter: Arc<dyn FailureReporter>,
    pub(crate) bus: Bus,
    pub(crate) runtime_token: CancellationToken,
    /// Stops the log listener; cancelled last on terminate.
    pub(crate) log_token: CancellationToken,
    pub(crate) sink: NotificationSink,
    /// Registries added and not dropped since, keyed to the claim of the add
    /// that introduced them.
    pub(crate) known: Mutex<HashMap<RegistryId, u64>>,
    next_claim: AtomicU64,
    terminated: AtomicBool,
}

impl Engine {
    /// Builds the engine and spawns its long-lived workers.
    ///
    /// Must be called within a Tokio runtime.
    pub(crate) fn start(parts: EngineParts) -> Arc<Self> {
        let EngineParts {
            cfg,
            template,
            filter,
            reporter,
        } = parts;

        let bus = Bus::new(cfg.bus_capacity_clamped());
        let runtime_token = CancellationToken::new();
        let observers = Arc::new(ObserverSet::new(cfg.observer_queue_capacity, bus.clone()));

        let (fired_tx, fired_rx) = mpsc::unbounded_channel::<ServiceId>();
        let timers = Arc::new(DiscardTimers::new(
            cfg.discard_wait,
            fired_tx,
            runtime_token.clone(),
            bus.clone(),
        ));
        let store = RecordStore::new(Arc::clone(&observers), timers, bus.clone());
        let scheduler = TaskScheduler::new(bus.clone(), runtime_token.clone(), cfg.concurrency_limit());

        let (note_tx, note_rx) = mpsc::unbounded_channel::<Notification>();

        let log_token = CancellationToken::new();
        #[cfg(feature = "logging")]
        crate::events::LogWriter::new().spawn(&bus, log_token.clone());

        let engine = Arc::new(Self {
            cfg,
            template,
            filter,
            store,
            subscriptions: SubscriptionSet::default(),
            scheduler,
            observers,
            reporter,
            bus,
            runtime_token,
            log_token,
            sink: NotificationSink::new(note_tx),
            known: Mutex::new(HashMap::new()),
            next_claim: AtomicU64::new(1),
            terminated: AtomicBool::new(false),
        });

        engine.spawn_dispatcher(note_rx);
        engine.spawn_retry_worker(fired_rx);
        engine
    }

    #[inline]
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Records `id` as known. Returns the new claim, or `None` if it already was.
    pub(crate) fn claim_registry(&self, id: &RegistryId) -> Option<u64> {
        let mut known = self.known.lock();
        if known.contains_key(id) {
            return None;
        }
        let claim = self.next_claim.fetch_add(1, Ordering::Relaxed);
        known.insert(id.clone(), claim);
        Some(claim)
    }

    /// Forgets `id` if it is still held under `claim`.
    pub(crate) fn release_claim(&self, id: &RegistryId, claim: u64) {
        let mut known = self.known.lock();
        if known.get(id) == Some(&claim) {
            known.remove(id);
        }
    }

    /// Flips the terminated flag. Returns `true` for the first caller only.
    pub(crate) fn mark_terminated(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }

    /// Hands a registry failure to the reporter.
    pub(crate) fn report(&self, error: &RegistryError, registry: &RegistryId, context: CallContext) {
        self.reporter.report(error, registry, context, self.is_terminated());
    }
}
