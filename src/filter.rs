//! # Record filters.
//!
//! A [`Filter`] decides whether a record is usable by the cache's clients.
//! It has three outcomes:
//!
//! ```text
//! check(&mut item) ─┬─ Pass       → record usable (item may have been rewritten)
//!                   ├─ Fail       → record permanently excluded
//!                   └─ Indefinite → transient failure; retry later
//! ```
//!
//! [`FilterFn`] wraps a closure, so most filters are one-liners:
//!
//! ```rust
//! use regcache::{Filter, FilterFn, FilterOutcome, ServiceItem};
//!
//! let gold_only = FilterFn::arc("gold-only", |item: &mut ServiceItem| {
//!     match item.attribute("tier") {
//!         Some("gold") => FilterOutcome::Pass,
//!         Some(_) => FilterOutcome::Fail,
//!         None => FilterOutcome::Indefinite,
//!     }
//! });
//! assert_eq!(gold_only.name(), "gold-only");
//! ```

use std::borrow::Cow;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::model::ServiceItem;

/// Outcome of one filter run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOutcome {
    /// Record is usable.
    Pass,
    /// Record is excluded.
    Fail,
    /// Could not decide now; the record is retried later.
    Indefinite,
}

/// Predicate applied to every record before it becomes visible.
pub trait Filter: Send + Sync + 'static {
    /// Classifies `item`; on [`FilterOutcome::Pass`] the item may have been rewritten in place.
    fn check(&self, item: &mut ServiceItem) -> FilterOutcome;

    /// Human-readable name (for logs).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Shared handle to a filter.
pub type FilterRef = Arc<dyn Filter>;

/// Closure-backed filter.
#[derive(Debug)]
pub struct FilterFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> FilterFn<F>
where
    F: Fn(&mut ServiceItem) -> FilterOutcome + Send + Sync + 'static,
{
    /// Creates a new closure-backed filter.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the filter and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> Filter for FilterFn<F>
where
    F: Fn(&mut ServiceItem) -> FilterOutcome + Send + Sync + 'static,
{
    fn check(&self, item: &mut ServiceItem) -> FilterOutcome {
        (self.f)(item)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Runs `filter` against a copy of `item`.
///
/// No filter means every record passes. A panicking filter is treated as a
/// transient failure ([`FilterOutcome::Indefinite`]).
pub(crate) fn apply_filter(filter: Option<&dyn Filter>, item: &ServiceItem) -> (FilterOutcome, ServiceItem) {
    let mut candidate = item.clone();
    let Some(filter) = filter else {
        return (FilterOutcome::Pass, candidate);
    };

    match catch_unwind(AssertUnwindSafe(|| filter.check(&mut candidate))) {
        Ok(outcome) => (outcome, candidate),
        Err(_) => {
            tracing::warn!(
                filter = filter.name(),
                service = %item.id,
                "filter panicked; treating outcome as indefinite"
            );
            (FilterOutcome::Indefinite, item.clone())
        }
    }
}
