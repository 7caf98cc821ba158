//! # Registry client contract.
//!
//! [`RegistryClient`] is the boundary to a remote service registry. The cache
//! consumes three calls:
//!
//! ```text
//! subscribe(template, sink, duration) ──► SubscriptionGrant { source_id, event_id, initial_sequence, lease }
//! list(template)                      ──► Some(Vec<ServiceItem>)   (None = protocol violation)
//! cancel_lease(lease)                 ──► ()
//! ```
//!
//! Transport, proxy preparation and lease renewal live behind this trait.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::model::{ServiceItem, Template};
use crate::registry::notification::{NotificationSink, SourceId};

/// Opaque, comparable identity of a registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryId(Arc<str>);

impl RegistryId {
    /// Creates a new registry identity.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegistryId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque lease granted by a registry for a notification subscription.
///
/// Renewal is owned by an external collaborator; the cache only cancels it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LeaseHandle {
    id: u64,
    duration: Duration,
}

impl LeaseHandle {
    /// Creates a lease handle.
    pub fn new(id: u64, duration: Duration) -> Self {
        Self { id, duration }
    }

    /// Registry-assigned lease identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Duration granted by the registry.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Result of a successful [`RegistryClient::subscribe`] call.
#[derive(Clone, Debug)]
pub struct SubscriptionGrant {
    /// Identifier echoed in every notification of this subscription.
    pub source_id: SourceId,
    /// Registration identifier echoed alongside `source_id`.
    pub event_id: u64,
    /// Sequence number of the last transition before the subscription began.
    pub initial_sequence: u64,
    /// Lease covering the subscription.
    pub lease: LeaseHandle,
}

/// Contract for a remote registry.
///
/// Implementations must be cheap to share (`Arc<dyn RegistryClient>`).
#[async_trait]
pub trait RegistryClient: Send + Sync + 'static {
    /// Stable identity of this registry.
    fn id(&self) -> RegistryId;

    /// Starts pushing notifications for records matching `template` into `sink`.
    async fn subscribe(
        &self,
        template: &Template,
        sink: NotificationSink,
        duration: Duration,
    ) -> Result<SubscriptionGrant, RegistryError>;

    /// Returns every record currently matching `template`.
    ///
    /// `Ok(None)` means the registry answered without a listing, which breaks
    /// the contract and is treated as fatal by the cache.
    async fn list(&self, template: &Template) -> Result<Option<Vec<ServiceItem>>, RegistryError>;

    /// Extends a lease.
    async fn renew_lease(&self, lease: &LeaseHandle, duration: Duration) -> Result<(), RegistryError>;

    /// Cancels a lease; the registry stops pushing notifications for it.
    async fn cancel_lease(&self, lease: &LeaseHandle) -> Result<(), RegistryError>;
}

/// Shared handle to a registry client.
pub type RegistryRef = Arc<dyn RegistryClient>;
