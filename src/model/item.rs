//! # Service records as reported by registries.
//!
//! A [`ServiceItem`] is one registry's description of a service: its
//! [`ServiceId`], the identity-defining payload ([`ServiceProxy`]) and a list
//! of descriptive [`Attribute`]s.
//!
//! ## Version vs. attributes
//! ```text
//! same_payload(old, new) ─┬─ true  → same version; compare attributes
//!                         └─ false → new version (re-registration)
//! ```
//! Version equality is decided by deep payload comparison, never by pointer
//! identity: a registry may legitimately re-deliver a structurally distinct
//! but logically identical proxy.

use std::fmt;
use std::sync::Arc;

/// Opaque, comparable identity of a service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(Arc<str>);

impl ServiceId {
    /// Creates a new service identity.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ServiceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Identity-defining payload of a service record.
///
/// Two proxies with equal `endpoint` and `version` denote the same
/// registration of the service, even when they are distinct allocations.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceProxy {
    /// Where the service can be reached.
    pub endpoint: Arc<str>,
    /// Registration version advertised by the service.
    pub version: u64,
}

impl ServiceProxy {
    /// Creates a new proxy.
    pub fn new(endpoint: impl Into<Arc<str>>, version: u64) -> Self {
        Self {
            endpoint: endpoint.into(),
            version,
        }
    }

    /// Deep payload comparison used to decide whether two sightings are the
    /// same version of a service.
    #[inline]
    pub fn same_payload(&self, other: &ServiceProxy) -> bool {
        self.version == other.version && *self.endpoint == *other.endpoint
    }
}

/// Descriptive `name = value` pair attached to a service record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Attribute {
    /// Attribute name.
    pub name: Arc<str>,
    /// Attribute value.
    pub value: Arc<str>,
}

impl Attribute {
    /// Creates a new attribute.
    pub fn new(name: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One service record as reported by a registry.
///
/// `service` is `None` when the registry could not produce a usable payload
/// (e.g. it failed to decode it). Such records are skipped by the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceItem {
    /// Service identity.
    pub id: ServiceId,
    /// Identity-defining payload, if usable.
    pub service: Option<ServiceProxy>,
    /// Descriptive attributes.
    pub attributes: Vec<Attribute>,
}

impl ServiceItem {
    /// Creates a record with a usable payload and no attributes.
    pub fn new(id: impl Into<ServiceId>, service: ServiceProxy) -> Self {
        Self {
            id: id.into(),
            service: Some(service),
            attributes: Vec::new(),
        }
    }

    /// Returns the record with an additional attribute.
    pub fn with_attribute(mut self, name: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    /// Returns the value of the first attribute with the given name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| &*a.name == name)
            .map(|a| &*a.value)
    }

    /// True if the record carries a usable payload.
    #[inline]
    pub fn is_usable(&self) -> bool {
        self.service.is_some()
    }

    /// True if both records carry equal payloads (same version).
    ///
    /// Records without a payload never compare as the same version.
    pub fn same_version(&self, other: &ServiceItem) -> bool {
        match (&self.service, &other.service) {
            (Some(a), Some(b)) => a.same_payload(b),
            _ => false,
        }
    }

    /// True if both records carry the same attributes, counting repeats,
    /// in any order.
    pub fn same_attributes(&self, other: &ServiceItem) -> bool {
        if self.attributes.len() != other.attributes.len() {
            return false;
        }
        sorted_attributes(&self.attributes) == sorted_attributes(&other.attributes)
    }
}

fn sorted_attributes(attributes: &[Attribute]) -> Vec<(&str, &str)> {
    let mut pairs: Vec<(&str, &str)> = attributes.iter().map(|a| (&*a.name, &*a.value)).collect();
    pairs.sort_unstable();
    pairs
}
