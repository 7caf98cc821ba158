//! # LogWriter — diagnostic events to `tracing`
//!
//! Writes every [`Event`] published on the bus as one structured `tracing`
//! record. Enabled by the `logging` feature (on by default).
//!
//! ## Example output (with a fmt subscriber)
//! ```text
//! DEBUG regcache: registry subscribed registry=reg-a sequence=Some(5)
//! DEBUG regcache: resync requested registry=reg-a sequence=Some(8) reason=Some("cursor=5")
//!  WARN regcache: observer overflow reason=Some("observer=audit reason=full")
//! ```

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use super::bus::Bus;
use super::event::{Event, EventKind};

/// Event writer.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Writes one event.
    pub fn write(&self, e: &Event) {
        let registry = e.registry.as_ref().map(|r| r.as_str());
        let service = e.service.as_ref().map(|s| s.as_str());
        let reason = e.reason.as_deref();

        match e.kind {
            EventKind::RegistrySubscribed => {
                tracing::debug!(?registry, sequence = ?e.sequence, "registry subscribed");
            }
            EventKind::SubscribeFailed => {
                tracing::warn!(?registry, ?reason, "registry subscribe failed");
            }
            EventKind::RegistryDropped => {
                tracing::debug!(?registry, "registry dropped");
            }
            EventKind::SnapshotApplied => {
                tracing::debug!(?registry, ?reason, "snapshot applied");
            }
            EventKind::ResyncRequested => {
                tracing::debug!(?registry, sequence = ?e.sequence, ?reason, "resync requested");
            }
            EventKind::NotificationIgnored => {
                tracing::trace!(?registry, ?service, sequence = ?e.sequence, "notification ignored");
            }
            EventKind::NotificationDropped => {
                tracing::debug!(?service, sequence = ?e.sequence, ?reason, "notification dropped");
            }
            EventKind::ServiceDiscarded => {
                tracing::debug!(?service, ?reason, "service discarded");
            }
            EventKind::DiscardRetryScheduled => {
                tracing::trace!(?service, delay_ms = ?e.delay_ms, "discard retry scheduled");
            }
            EventKind::DiscardRetryFired => {
                tracing::trace!(?service, "discard retry fired");
            }
            EventKind::TaskCancelled => {
                tracing::debug!(?registry, ?reason, "registry task cancelled");
            }
            EventKind::ObserverOverflow => {
                tracing::warn!(?reason, "observer overflow");
            }
            EventKind::ObserverPanicked => {
                tracing::warn!(?reason, "observer panicked");
            }
            EventKind::Terminated => {
                tracing::debug!("cache terminated");
            }
        }
    }

    /// Spawns a listener that writes bus events until `token` is cancelled.
    ///
    /// Events already queued when `token` fires are written first.
    pub(crate) fn spawn(self, bus: &Bus, token: CancellationToken) {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => self.write(&ev),
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(n)) => {
                            tracing::warn!(skipped = n, "log listener lagged");
                        }
                    },
                    _ = token.cancelled() => break,
                }
            }
        });
    }
}
