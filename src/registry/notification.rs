//! # Push notifications from registries.
//!
//! A registry pushes one [`Notification`] per transition of a record relative
//! to the subscription template:
//!
//! ```text
//! Transition::Removed   match    → no match   (record left the result set)
//! Transition::Added     no match → match      (record entered the result set)
//! Transition::Refreshed match    → match      (record changed, still matching)
//! ```
//!
//! Every notification carries the subscription's `source_id`/`event_id` and a
//! per-subscription `sequence`. Sequences increase by exactly one per
//! transition; a jump means transitions may have been missed.

use std::cmp::Ordering;
use std::fmt;

use tokio::sync::mpsc;

use crate::model::{ServiceId, ServiceItem};

/// Identifier of the registry-side event source of one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src-{}", self.0)
    }
}

/// Kind of transition reported by a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Record no longer matches the template.
    Removed,
    /// Record newly matches the template.
    Added,
    /// Record still matches the template but changed.
    Refreshed,
}

/// One pushed transition.
#[derive(Clone, Debug)]
pub struct Notification {
    /// Event source of the subscription this notification belongs to.
    pub source_id: SourceId,
    /// Registration identifier of that subscription.
    pub event_id: u64,
    /// Per-subscription sequence number.
    pub sequence: u64,
    /// Identity of the record that transitioned.
    pub service_id: ServiceId,
    /// New state of the record (`None` for removals).
    pub item: Option<ServiceItem>,
    /// Transition kind.
    pub transition: Transition,
}

impl Notification {
    /// Builds a removal notification.
    pub fn removed(source_id: SourceId, event_id: u64, sequence: u64, service_id: ServiceId) -> Self {
        Self {
            source_id,
            event_id,
            sequence,
            service_id,
            item: None,
            transition: Transition::Removed,
        }
    }

    /// Builds an addition or refresh notification carrying `item`.
    pub fn with_item(
        source_id: SourceId,
        event_id: u64,
        sequence: u64,
        transition: Transition,
        item: ServiceItem,
    ) -> Self {
        Self {
            source_id,
            event_id,
            sequence,
            service_id: item.id.clone(),
            item: Some(item),
            transition,
        }
    }
}

/// Pending notifications are ordered by sequence so the lowest pops first.
pub(crate) struct BySequence(pub Notification);

impl PartialEq for BySequence {
    fn eq(&self, other: &Self) -> bool {
        self.0.sequence == other.0.sequence
    }
}

impl Eq for BySequence {}

impl PartialOrd for BySequence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BySequence {
    // Reversed: `BinaryHeap` is a max-heap.
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.sequence.cmp(&self.0.sequence)
    }
}

/// Handle through which a registry pushes notifications into a cache.
///
/// Cheap to clone; every subscription of a cache shares the same sink.
#[derive(Clone, Debug)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    /// Delivers a notification.
    ///
    /// Returns `false` if the cache has been terminated.
    pub fn notify(&self, notification: Notification) -> bool {
        self.tx.send(notification).is_ok()
    }

    /// True once the cache stopped accepting notifications.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    fn removal(seq: u64) -> BySequence {
        BySequence(Notification::removed(SourceId(1), 1, seq, ServiceId::from("svc")))
    }

    #[test]
    fn test_lowest_sequence_pops_first() {
        let mut heap = BinaryHeap::new();
        heap.push(removal(9));
        heap.push(removal(7));
        heap.push(removal(8));
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|n| n.0.sequence)).collect();
        assert_eq!(order, vec![7, 8, 9]);
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = NotificationSink::new(tx);
        assert!(sink.notify(removal(1).0));
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.notify(removal(2).0));
    }
}
