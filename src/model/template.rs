//! # Query template.
//!
//! A [`Template`] is the fixed query a cache hands to every registry it
//! subscribes to. Matching is done registry-side; [`Template::matches`] is
//! the reference predicate registries (and tests) can use.

use super::item::{Attribute, ServiceId, ServiceItem};

/// Query used to select records of interest.
///
/// Empty fields act as wildcards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Template {
    /// Exact identity to match, if any.
    pub service_id: Option<ServiceId>,
    /// Attributes every matching record must carry.
    pub attributes: Vec<Attribute>,
}

impl Template {
    /// Template matching every record.
    pub fn any() -> Self {
        Self::default()
    }

    /// Returns the template restricted to one identity.
    pub fn with_service_id(mut self, id: impl Into<ServiceId>) -> Self {
        self.service_id = Some(id.into());
        self
    }

    /// Returns the template with an additional required attribute.
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    /// True if `item` satisfies every constraint of the template.
    pub fn matches(&self, item: &ServiceItem) -> bool {
        if let Some(id) = &self.service_id {
            if *id != item.id {
                return false;
            }
        }
        self.attributes.iter().all(|a| item.attributes.contains(a))
    }
}
