//! # LookupCache: public surface of the engine.
//!
//! ```text
//! add_registry / drop_registry   fire-and-forget, ordered per registry
//! discard(id)                    hide a record until re-confirmed
//! lookup_one / lookup_many       random sample of visible records
//! add_observer / remove_observer fan-out of added/removed/changed
//! events()                       diagnostic bus
//! terminate()                    idempotent shutdown
//! ```
//!
//! ## Termination order
//! 1. stop accepting calls (`CacheError::Terminated` from then on)
//! 2. cancel the runtime token: queued registry tasks, notification tasks,
//!    discard timers and the retry worker stop
//! 3. unpublish every subscription and cancel its lease
//! 4. publish `Terminated`, then shut the observer workers down

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::broadcast;

use super::builder::CacheBuilder;
use super::engine::Engine;
use crate::error::CacheError;
use crate::events::{Event, EventKind};
use crate::filter::{Filter, FilterOutcome, apply_filter};
use crate::model::{ServiceId, ServiceItem, Template};
use crate::observers::{Observe, ObserverId};
use crate::registry::{RegistryId, RegistryRef};

/// Client-side cache of service records reconciled across registries.
///
/// Cheap to clone; clones share the same engine.
///
/// ## Example
/// ```rust,no_run
/// use regcache::{LookupCache, RegistryRef, Template};
///
/// # async fn demo(registry: RegistryRef) -> Result<(), regcache::CacheError> {
/// let cache = LookupCache::builder(Template::any().with_attribute("tier", "gold")).build();
/// cache.add_registry(registry)?;
///
/// if let Some(item) = cache.lookup_one(None)? {
///     println!("using {}", item.id);
/// }
/// cache.terminate().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LookupCache {
    engine: Arc<Engine>,
}

impl LookupCache {
    /// Starts building a cache for records matching `template`.
    #[must_use]
    pub fn builder(template: Template) -> CacheBuilder {
        CacheBuilder::new(template)
    }

    pub(crate) fn from_engine(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    #[cfg(test)]
    pub(crate) fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    fn ensure_running(&self) -> Result<(), CacheError> {
        if self.engine.is_terminated() {
            Err(CacheError::Terminated)
        } else {
            Ok(())
        }
    }

    /// Subscribes to `registry` and loads its current listing.
    ///
    /// Returns immediately; failures go to the failure reporter.
    /// Adding a registry that is already known does nothing.
    pub fn add_registry(&self, registry: RegistryRef) -> Result<(), CacheError> {
        self.ensure_running()?;
        self.engine.submit_add(registry);
        Ok(())
    }

    /// Tears down the subscription with `registry` and forgets its records.
    ///
    /// A subscribe task for `registry` that has not started yet is cancelled.
    pub fn drop_registry(&self, registry: &RegistryId) -> Result<(), CacheError> {
        self.ensure_running()?;
        self.engine.submit_drop(registry.clone());
        Ok(())
    }

    /// Hides a visible record until the discard timer re-confirms it.
    ///
    /// Returns `Ok(false)` if the record is unknown or already discarded.
    pub fn discard(&self, id: &ServiceId) -> Result<bool, CacheError> {
        self.ensure_running()?;
        Ok(self.engine.store.discard(id))
    }

    /// Returns one visible record chosen at random, optionally narrowed by `filter`.
    pub fn lookup_one(&self, filter: Option<&dyn Filter>) -> Result<Option<ServiceItem>, CacheError> {
        Ok(self.lookup_many(filter, 1)?.pop())
    }

    /// Returns up to `max` distinct visible records, sampled uniformly at random.
    ///
    /// With `filter`, only candidates it passes are returned (as rewritten by it).
    pub fn lookup_many(&self, filter: Option<&dyn Filter>, max: usize) -> Result<Vec<ServiceItem>, CacheError> {
        self.ensure_running()?;
        if max == 0 {
            return Ok(Vec::new());
        }

        let mut candidates = self.engine.store.visible();
        candidates.shuffle(&mut rand::rng());

        let mut out = Vec::with_capacity(max.min(candidates.len()));
        for item in candidates {
            if out.len() == max {
                break;
            }
            match filter {
                None => out.push(item),
                Some(f) => {
                    if let (FilterOutcome::Pass, checked) = apply_filter(Some(f), &item) {
                        out.push(checked);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Registers an observer.
    ///
    /// The observer first receives `added` for every record currently
    /// visible, then live changes.
    pub fn add_observer(&self, observer: Arc<dyn Observe>) -> Result<ObserverId, CacheError> {
        self.ensure_running()?;
        let store = &self.engine.store;
        Ok(self.engine.observers.add(observer, || store.announced()))
    }

    /// Unregisters an observer. Returns `Ok(false)` if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> Result<bool, CacheError> {
        self.ensure_running()?;
        Ok(self.engine.observers.remove(id))
    }

    /// Subscribes to diagnostic events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.engine.bus.subscribe()
    }

    /// Registries with a live subscription.
    #[must_use]
    pub fn registries(&self) -> Vec<RegistryId> {
        self.engine.subscriptions.registries()
    }

    /// Template records must match.
    #[must_use]
    pub fn template(&self) -> &Template {
        &self.engine.template
    }

    /// True once [`terminate`](Self::terminate) was called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.engine.is_terminated()
    }

    /// Shuts the cache down. Idempotent; only the first call does the work.
    pub async fn terminate(&self) {
        let engine = &self.engine;
        if !engine.mark_terminated() {
            return;
        }
        engine.runtime_token.cancel();

        for sub in engine.subscriptions.take_all() {
            sub.abandon();
            engine.cancel_lease(&sub.registry, &sub.id, &sub.lease).await;
        }

        engine.bus.publish(Event::new(EventKind::Terminated));
        engine.observers.shutdown().await;
        engine.log_token.cancel();
    }
}
