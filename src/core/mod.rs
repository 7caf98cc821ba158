//! Runtime core: reconciliation engine and lifecycle.
//!
//! The public API from this module is [`LookupCache`] and its
//! [`CacheBuilder`]; everything else is internal.
//!
//! ## Wiring
//! ```text
//!                 add_registry / drop_registry
//!                              │
//!                              ▼
//!                       TaskScheduler ──► Subscribe(R) / Drop(R) tasks
//!                              │                     │
//!                    publish Subscription      snapshot reconcile
//!                              │                     │
//! registry ─notify─► dispatcher ─► gate + cursor ────┤
//!                                                    ▼
//!                                   RecordStore (per-key transforms)
//!                                     │         │            │
//!                                 filter     DiscardTimers  ObserverSet
//!                                              │  fired        │
//!                                              ▼               ▼
//!                                         retry worker    observer workers
//!
//! every component ──► Bus ──► LogWriter / events()
//! ```
//!
//! Internal modules:
//! - [`engine`]: shared state and worker start-up;
//! - [`registries`]: subscribe/drop tasks;
//! - [`changes`]: push notification ordering and application;
//! - [`reconcile`]: snapshot diffing, filter pipeline, discard retries;
//! - [`store`]: record store and its atomic transforms;
//! - [`subscription`]: subscriptions, ordering gate, published set;
//! - [`scheduler`]: dependency-ordered registry tasks;
//! - [`timers`]: discard-retry timers.

mod builder;
mod cache;
mod changes;
mod engine;
mod reconcile;
mod registries;
mod scheduler;
mod store;
mod subscription;
mod timers;


pub use builder::CacheBuilder;
pub use cache::LookupCache;
