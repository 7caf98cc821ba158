//! Data model shared by the cache and its collaborators.
//!
//! ## Contents
//! - [`ServiceId`], [`ServiceProxy`], [`Attribute`], [`ServiceItem`] service records
//! - [`Template`] the query a cache subscribes with

mod item;
mod template;

pub use item::{Attribute, ServiceId, ServiceItem, ServiceProxy};
pub use template::Template;
