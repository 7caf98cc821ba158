//! In-crate test doubles: a scriptable registry and a recording observer.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, broadcast, mpsc};

use crate::error::RegistryError;
use crate::events::{Event, EventKind};
use crate::model::{ServiceId, ServiceItem, Template};
use crate::observers::{Observe, ObserverEvent};
use crate::registry::{
    LeaseHandle, Notification, NotificationSink, RegistryClient, RegistryId, SourceId, SubscriptionGrant, Transition,
};

static NEXT_SOURCE: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct FakeState {
    items: BTreeMap<ServiceId, ServiceItem>,
    sink: Option<NotificationSink>,
    source: Option<SourceId>,
    sequence: u64,
    subscribe_calls: usize,
    list_calls: usize,
    leases: Vec<u64>,
    cancelled: Vec<u64>,
    fail_subscribe: Option<RegistryError>,
    fail_list: Option<RegistryError>,
    list_without_listing: bool,
}

/// Registry double: holds a listing, hands out grants, pushes notifications on demand.
pub(crate) struct FakeRegistry {
    id: RegistryId,
    state: Mutex<FakeState>,
    /// When present, `subscribe` waits for a permit.
    subscribe_gate: Option<Arc<Semaphore>>,
}

impl FakeRegistry {
    pub(crate) fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: RegistryId::from(id),
            state: Mutex::new(FakeState::default()),
            subscribe_gate: None,
        })
    }

    /// Registry whose `subscribe` blocks until [`release_subscribe`](Self::release_subscribe).
    pub(crate) fn blocking(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: RegistryId::from(id),
            state: Mutex::new(FakeState::default()),
            subscribe_gate: Some(Arc::new(Semaphore::new(0))),
        })
    }

    pub(crate) fn release_subscribe(&self) {
        if let Some(gate) = &self.subscribe_gate {
            gate.add_permits(1);
        }
    }

    /// Sets a record in the listing without notifying.
    pub(crate) fn put(&self, item: ServiceItem) {
        self.state.lock().items.insert(item.id.clone(), item);
    }

    /// Removes a record from the listing without notifying.
    pub(crate) fn forget(&self, id: &str) {
        self.state.lock().items.remove(&ServiceId::from(id));
    }

    /// Updates the listing and pushes a notification with the next sequence.
    pub(crate) fn push(&self, transition: Transition, item: ServiceItem) -> u64 {
        let mut st = self.state.lock();
        st.sequence += 1;
        let seq = st.sequence;
        st.items.insert(item.id.clone(), item.clone());
        let n = Notification::with_item(st.source.unwrap_or(SourceId(0)), 1, seq, transition, item);
        if let Some(sink) = &st.sink {
            sink.notify(n);
        }
        seq
    }

    /// Removes a record from the listing and pushes a removal.
    pub(crate) fn push_removed(&self, id: &str) -> u64 {
        let mut st = self.state.lock();
        st.sequence += 1;
        let seq = st.sequence;
        st.items.remove(&ServiceId::from(id));
        let n = Notification::removed(st.source.unwrap_or(SourceId(0)), 1, seq, ServiceId::from(id));
        if let Some(sink) = &st.sink {
            sink.notify(n);
        }
        seq
    }

    /// Pushes an arbitrary notification stamped with this registry's source.
    pub(crate) fn push_raw(&self, sequence: u64, transition: Transition, item: Option<ServiceItem>, id: &str) {
        let st = self.state.lock();
        let n = Notification {
            source_id: st.source.unwrap_or(SourceId(0)),
            event_id: 1,
            sequence,
            service_id: ServiceId::from(id),
            item,
            transition,
        };
        if let Some(sink) = &st.sink {
            sink.notify(n);
        }
    }

    /// Advances the sequence as if `n` notifications were lost.
    pub(crate) fn skip(&self, n: u64) {
        self.state.lock().sequence += n;
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.state.lock().sequence
    }

    pub(crate) fn fail_subscribe(&self, err: RegistryError) {
        self.state.lock().fail_subscribe = Some(err);
    }

    pub(crate) fn recover_subscribe(&self) {
        self.state.lock().fail_subscribe = None;
    }

    pub(crate) fn fail_list(&self, err: Option<RegistryError>) {
        self.state.lock().fail_list = err;
    }

    pub(crate) fn answer_without_listing(&self) {
        self.state.lock().list_without_listing = true;
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub(crate) fn leases(&self) -> Vec<u64> {
        self.state.lock().leases.clone()
    }

    pub(crate) fn cancelled_leases(&self) -> Vec<u64> {
        self.state.lock().cancelled.clone()
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    fn id(&self) -> RegistryId {
        self.id.clone()
    }

    async fn subscribe(
        &self,
        _template: &Template,
        sink: NotificationSink,
        duration: Duration,
    ) -> Result<SubscriptionGrant, RegistryError> {
        self.state.lock().subscribe_calls += 1;
        if let Some(gate) = &self.subscribe_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let mut st = self.state.lock();
        if let Some(err) = st.fail_subscribe.clone() {
            return Err(err);
        }
        let source = SourceId(NEXT_SOURCE.fetch_add(1, Ordering::Relaxed));
        let lease = LeaseHandle::new(source.0, duration);
        st.source = Some(source);
        st.sink = Some(sink);
        st.leases.push(lease.id());
        Ok(SubscriptionGrant {
            source_id: source,
            event_id: 1,
            initial_sequence: st.sequence,
            lease,
        })
    }

    async fn list(&self, template: &Template) -> Result<Option<Vec<ServiceItem>>, RegistryError> {
        let mut st = self.state.lock();
        st.list_calls += 1;
        if let Some(err) = st.fail_list.clone() {
            return Err(err);
        }
        if st.list_without_listing {
            return Ok(None);
        }
        Ok(Some(
            st.items.values().filter(|i| template.matches(i)).cloned().collect(),
        ))
    }

    async fn renew_lease(&self, _lease: &LeaseHandle, _duration: Duration) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn cancel_lease(&self, lease: &LeaseHandle) -> Result<(), RegistryError> {
        let mut st = self.state.lock();
        st.cancelled.push(lease.id());
        st.sink = None;
        Ok(())
    }
}

/// Observer that forwards every event to a channel.
pub(crate) struct RecordingObserver {
    name: &'static str,
    tx: mpsc::UnboundedSender<ObserverEvent>,
}

impl RecordingObserver {
    pub(crate) fn new(name: &'static str) -> (Arc<Self>, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { name, tx }), rx)
    }
}

#[async_trait]
impl Observe for RecordingObserver {
    async fn added(&self, item: &ServiceItem) {
        let _ = self.tx.send(ObserverEvent::Added(item.clone()));
    }

    async fn removed(&self, item: &ServiceItem) {
        let _ = self.tx.send(ObserverEvent::Removed(item.clone()));
    }

    async fn changed(&self, old: &ServiceItem, new: &ServiceItem) {
        let _ = self.tx.send(ObserverEvent::Changed {
            old: old.clone(),
            new: new.clone(),
        });
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Next observer event, failing the test after two seconds.
pub(crate) async fn next_event(rx: &mut mpsc::UnboundedReceiver<ObserverEvent>) -> ObserverEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("observer event within 2s")
        .expect("observer channel open")
}

/// Asserts no observer event arrives within `ms` milliseconds.
pub(crate) async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<ObserverEvent>, ms: u64) {
    let got = tokio::time::timeout(Duration::from_millis(ms), rx.recv()).await;
    assert!(got.is_err(), "unexpected observer event: {got:?}");
}

/// Waits for the first diagnostic event of `kind`.
pub(crate) async fn wait_for_kind(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == kind => return ev,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("bus closed"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind:?} event within 2s"))
}

/// Polls `cond` until it holds, failing the test after two seconds.
pub(crate) async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
