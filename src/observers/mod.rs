//! # Observers of the cache's visible view.
//!
//! ## Architecture
//! ```text
//! Record Store transform ── emit(ObserverEvent) ──► ObserverSet
//!                                                      │
//!                                        ┌─────────────┼─────────────┐
//!                                        ▼             ▼             ▼
//!                                   [queue 1]     [queue 2]     [queue N]
//!                                        │             │             │
//!                                 obs1.added()  obs2.removed() obsN.changed()
//! ```

mod observe;
mod observer_set;

pub use observe::{Observe, ObserverEvent};
pub use observer_set::{ObserverId, ObserverSet};
