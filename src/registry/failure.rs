//! # Registry call failure reporting.
//!
//! Registry failures are never thrown back across the cache boundary.
//! They are handed to a [`FailureReporter`]; the default [`LogReporter`]
//! writes them through `tracing`.

use std::fmt;

use crate::error::RegistryError;
use crate::registry::client::RegistryId;

/// Registry call that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallContext {
    /// `RegistryClient::subscribe`.
    Subscribe,
    /// `RegistryClient::list`.
    List,
    /// `RegistryClient::cancel_lease`.
    CancelLease,
}

impl CallContext {
    /// Short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CallContext::Subscribe => "subscribe",
            CallContext::List => "list",
            CallContext::CancelLease => "cancel_lease",
        }
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Receives registry call failures.
///
/// Called from cache worker tasks; implementations must not block.
pub trait FailureReporter: Send + Sync + 'static {
    /// Reports one failed call.
    ///
    /// `terminated` is `true` when the failure happened while the cache was
    /// shutting down (such failures are usually expected).
    fn report(&self, error: &RegistryError, registry: &RegistryId, context: CallContext, terminated: bool);
}

/// Default reporter: writes failures through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl FailureReporter for LogReporter {
    fn report(&self, error: &RegistryError, registry: &RegistryId, context: CallContext, terminated: bool) {
        if terminated {
            tracing::debug!(
                registry = %registry,
                call = context.as_label(),
                error = error.as_label(),
                "registry call failed during termination: {}",
                error.as_message()
            );
        } else {
            tracing::warn!(
                registry = %registry,
                call = context.as_label(),
                error = error.as_label(),
                retryable = error.is_retryable(),
                "registry call failed: {}",
                error.as_message()
            );
        }
    }
}
