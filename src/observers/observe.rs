//! # Core observer trait
//!
//! `Observe` is the extension point for reacting to changes of the cache's
//! visible view. Each observer is driven by a dedicated worker loop fed by a
//! bounded queue owned by the [`ObserverSet`](super::ObserverSet).
//!
//! ## Contract
//! - Implementations may be slow; they do **not** block the cache nor other observers.
//! - Per-observer FIFO: notifications for one record arrive in the order
//!   the cache produced them.
//! - If a queue overflows, notifications for that observer are **dropped**
//!   and an [`EventKind::ObserverOverflow`](crate::EventKind::ObserverOverflow) is published.
//!
//! ## Example
//! ```rust
//! use regcache::{Observe, ServiceItem};
//!
//! struct Audit;
//!
//! #[async_trait::async_trait]
//! impl Observe for Audit {
//!     async fn added(&self, item: &ServiceItem) {
//!         println!("+ {}", item.id);
//!     }
//!     async fn removed(&self, item: &ServiceItem) {
//!         println!("- {}", item.id);
//!     }
//!     fn name(&self) -> &'static str { "audit" }
//! }
//! ```

use async_trait::async_trait;

use crate::model::ServiceItem;

/// One change of the visible view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObserverEvent {
    /// Record became visible.
    Added(ServiceItem),
    /// Record stopped being visible.
    Removed(ServiceItem),
    /// Visible record changed in place.
    Changed {
        /// Previously announced state.
        old: ServiceItem,
        /// New state.
        new: ServiceItem,
    },
}

impl ObserverEvent {
    /// Identity of the record the event is about.
    pub fn service_id(&self) -> &crate::model::ServiceId {
        match self {
            ObserverEvent::Added(item) | ObserverEvent::Removed(item) => &item.id,
            ObserverEvent::Changed { new, .. } => &new.id,
        }
    }
}

/// Contract for cache observers.
///
/// Called from an observer-dedicated worker task. All methods default to no-ops.
///
/// Delivery is lossy under overflow: when this observer's queue is full the
/// notification is dropped for it alone, so its picture of the view can
/// diverge from the cache's until a later notification for the same record.
/// Size [`queue_capacity`](Self::queue_capacity) for the expected burst and
/// watch for `ObserverOverflow` on [`LookupCache::events`](crate::LookupCache::events).
#[async_trait]
pub trait Observe: Send + Sync + 'static {
    /// A record became visible.
    async fn added(&self, _item: &ServiceItem) {}

    /// A visible record went away.
    async fn removed(&self, _item: &ServiceItem) {}

    /// A visible record changed in place: new attributes, or a new payload
    /// delivered as a refresh of the same registration.
    async fn changed(&self, _old: &ServiceItem, _new: &ServiceItem) {}

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this observer's queue (`None` = cache default).
    fn queue_capacity(&self) -> Option<usize> {
        None
    }
}

/// Dispatches `event` to the matching [`Observe`] method.
pub(crate) async fn deliver(observer: &dyn Observe, event: &ObserverEvent) {
    match event {
        ObserverEvent::Added(item) => observer.added(item).await,
        ObserverEvent::Removed(item) => observer.removed(item).await,
        ObserverEvent::Changed { old, new } => observer.changed(old, new).await,
    }
}
