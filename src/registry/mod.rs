//! Remote registry boundary.
//!
//! ## Contents
//! - [`RegistryClient`], [`RegistryRef`], [`RegistryId`] the registry contract
//! - [`SubscriptionGrant`], [`LeaseHandle`] what a subscribe call returns
//! - [`Notification`], [`Transition`], [`NotificationSink`] pushed transitions
//! - [`FailureReporter`], [`LogReporter`], [`CallContext`] failure reporting

mod client;
mod failure;
mod notification;

pub use client::{LeaseHandle, RegistryClient, RegistryId, RegistryRef, SubscriptionGrant};
pub use failure::{CallContext, FailureReporter, LogReporter};
pub use notification::{Notification, NotificationSink, SourceId, Transition};

pub(crate) use notification::BySequence;
