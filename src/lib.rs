//! # regcache
//!
//! **regcache** keeps a client-side, continuously reconciled cache of service
//! records advertised by remote registries.
//!
//! Registries push change notifications; the cache also pulls full listings
//! to heal after missed or out-of-order notifications, and merges both
//! sources into one view. Records pass through a pluggable filter before
//! they become visible, and local observers are told about every change.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Registry A  │   │  Registry B  │   │  Registry C  │
//!     │ list / push  │   │ list / push  │   │ list / push  │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  LookupCache (engine)                                             │
//! │  - TaskScheduler (subscribe/drop ordered per registry)            │
//! │  - Subscriptions (cursor + ordering gate per registry)            │
//! │  - RecordStore (identity → record, per-key atomic transforms)     │
//! │  - Filter pipeline + discard-retry timers                         │
//! └──────┬───────────────────────────────────┬────────────────────────┘
//!        ▼                                   ▼
//! ┌───────────────────────┐       ┌──────────────────────────────────┐
//! │ ObserverSet           │       │ Bus (diagnostic events)          │
//! │ per-observer queues   │       │ LogWriter / LookupCache::events()│
//! └───┬─────────┬─────────┘       └──────────────────────────────────┘
//!     ▼         ▼
//!  added()   removed() / changed()
//! ```
//!
//! ### Notification ordering
//! ```text
//! sequence == cursor + 1  → apply, advance cursor
//! sequence <= cursor      → ignore (duplicate or stale)
//! sequence >  cursor + 1  → gap: pull a snapshot instead
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                         |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Cache**         | Registries in, visible records out, random lookups.           | [`LookupCache`], [`CacheBuilder`]          |
//! | **Registries**    | Contract the cache consumes; push notifications.              | [`RegistryClient`], [`NotificationSink`]   |
//! | **Filtering**     | Three-outcome predicate applied before records become visible.| [`Filter`], [`FilterFn`], [`FilterOutcome`]|
//! | **Observers**     | Asynchronous added/removed/changed delivery.                  | [`Observe`], [`ObserverEvent`]             |
//! | **Diagnostics**   | Broadcast event stream, written through `tracing`.            | [`Event`], [`EventKind`], [`LogWriter`]    |
//! | **Errors**        | Terminated cache, registry call failures.                     | [`CacheError`], [`RegistryError`]          |
//! | **Configuration** | Lease duration, discard delay, bounded waits, queue sizes.    | [`CacheConfig`]                            |
//!
//! ## Optional features
//! - `logging` (default): writes every diagnostic event through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use regcache::{FilterFn, FilterOutcome, LookupCache, Observe, ServiceItem, Template};
//!
//! struct Print;
//!
//! #[async_trait::async_trait]
//! impl Observe for Print {
//!     async fn added(&self, item: &ServiceItem) {
//!         println!("+ {}", item.id);
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let healthy = FilterFn::arc("healthy", |item: &mut ServiceItem| {
//!         match item.attribute("health") {
//!             Some("up") => FilterOutcome::Pass,
//!             Some("down") => FilterOutcome::Fail,
//!             _ => FilterOutcome::Indefinite,
//!         }
//!     });
//!
//!     let cache = LookupCache::builder(Template::any())
//!         .with_filter(healthy)
//!         .with_observers(vec![Arc::new(Print) as Arc<dyn Observe>])
//!         .build();
//!
//!     // cache.add_registry(my_registry)?;
//!     assert!(cache.lookup_one(None).unwrap().is_none());
//!     cache.terminate().await;
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod filter;
mod model;
mod observers;
mod registry;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use config::CacheConfig;
pub use core::{CacheBuilder, LookupCache};
pub use error::{CacheError, RegistryError};
pub use events::{Bus, Event, EventKind, LogWriter};
pub use filter::{Filter, FilterFn, FilterOutcome, FilterRef};
pub use model::{Attribute, ServiceId, ServiceItem, ServiceProxy, Template};
pub use observers::{Observe, ObserverEvent, ObserverId};
pub use registry::{
    CallContext, FailureReporter, LeaseHandle, LogReporter, Notification, NotificationSink, RegistryClient,
    RegistryId, RegistryRef, SourceId, SubscriptionGrant, Transition,
};
