//! # Diagnostic events emitted by the cache runtime.
//!
//! The [`EventKind`] enum classifies events across four categories:
//! - **Registry lifecycle**: subscribe outcome, drop
//! - **Reconciliation**: snapshots, resynchronization, ignored/dropped notifications
//! - **Discard handling**: discards and their retry timers
//! - **Runtime health**: cancelled tasks, observer overflow/panic, termination
//!
//! These are not the observer notifications (`added`/`removed`/`changed`);
//! they describe what the engine is doing, for logs and tests.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use regcache::{Event, EventKind, RegistryId};
//!
//! let ev = Event::new(EventKind::ResyncRequested)
//!     .with_registry(RegistryId::from("reg-a"))
//!     .with_sequence(8)
//!     .with_reason("gap after 5");
//!
//! assert_eq!(ev.kind, EventKind::ResyncRequested);
//! assert_eq!(ev.sequence, Some(8));
//! assert_eq!(ev.reason.as_deref(), Some("gap after 5"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::model::ServiceId;
use crate::registry::RegistryId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Registry lifecycle ===
    /// Subscription established and published.
    ///
    /// Sets:
    /// - `registry`: registry id
    /// - `sequence`: initial sequence number
    RegistrySubscribed,

    /// Subscribe call failed; no subscription was left behind.
    ///
    /// Sets:
    /// - `registry`: registry id
    /// - `reason`: error label
    SubscribeFailed,

    /// Subscription torn down and its records dissociated.
    ///
    /// Sets:
    /// - `registry`: registry id
    RegistryDropped,

    // === Reconciliation ===
    /// Full listing pulled from a registry and applied to the store.
    ///
    /// Sets:
    /// - `registry`: registry id
    /// - `reason`: `listed=<n> orphaned=<m>`
    SnapshotApplied,

    /// Sequence gap detected; a snapshot replaces the notification.
    ///
    /// Sets:
    /// - `registry`: registry id
    /// - `sequence`: sequence of the notification that revealed the gap
    /// - `reason`: cursor before the gap
    ResyncRequested,

    /// Duplicate or stale notification ignored.
    ///
    /// Sets:
    /// - `registry`: registry id
    /// - `service`: record identity
    /// - `sequence`: notification sequence
    NotificationIgnored,

    /// Notification dropped (no published subscription within the wait bound,
    /// unusable payload, or subscription discarded).
    ///
    /// Sets:
    /// - `service`: record identity
    /// - `sequence`: notification sequence
    /// - `reason`: why it was dropped
    NotificationDropped,

    // === Discard handling ===
    /// Record marked discarded (explicitly or by an indefinite filter outcome).
    ///
    /// Sets:
    /// - `service`: record identity
    /// - `reason`: `explicit` or `indefinite`
    ServiceDiscarded,

    /// Discard-retry timer armed.
    ///
    /// Sets:
    /// - `service`: record identity
    /// - `delay_ms`: timer delay
    DiscardRetryScheduled,

    /// Discard-retry timer fired.
    ///
    /// Sets:
    /// - `service`: record identity
    DiscardRetryFired,

    // === Runtime health ===
    /// Queued registry task cancelled before it started.
    ///
    /// Sets:
    /// - `registry`: registry id
    /// - `reason`: task kind
    TaskCancelled,

    /// Observer queue full or closed; the notification was dropped for it.
    ///
    /// Sets:
    /// - `reason`: `observer=<name> reason=<full|closed>`
    ObserverOverflow,

    /// Observer panicked while handling a notification.
    ///
    /// Sets:
    /// - `reason`: panic info
    ObserverPanicked,

    /// Cache terminated.
    Terminated,
}

/// Diagnostic event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Registry concerned, if any.
    pub registry: Option<RegistryId>,
    /// Record concerned, if any.
    pub service: Option<ServiceId>,
    /// Notification sequence number, if any.
    pub sequence: Option<u64>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            registry: None,
            service: None,
            sequence: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a registry id.
    #[inline]
    pub fn with_registry(mut self, registry: RegistryId) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Attaches a record identity.
    #[inline]
    pub fn with_service(mut self, service: ServiceId) -> Self {
        self.service = Some(service);
        self
    }

    /// Attaches a notification sequence number.
    #[inline]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates an observer overflow event.
    #[inline]
    pub fn observer_overflow(observer: &str, reason: &'static str) -> Self {
        Event::new(EventKind::ObserverOverflow).with_reason(format!("observer={observer} reason={reason}"))
    }

    /// Creates an observer panic event.
    #[inline]
    pub fn observer_panicked(observer: &str, info: String) -> Self {
        Event::new(EventKind::ObserverPanicked).with_reason(format!("observer={observer} info={info}"))
    }
}
