//! Error types used by the cache and its registry collaborators.
//!
//! This module defines two main error enums:
//!
//! - [`CacheError`] — errors returned by the public [`LookupCache`](crate::LookupCache) surface.
//! - [`RegistryError`] — errors returned by [`RegistryClient`](crate::RegistryClient) calls.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! Registry errors never cross the cache boundary: they are handed to the
//! [`FailureReporter`](crate::FailureReporter) instead.

use thiserror::Error;

/// # Errors produced by the cache itself.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache was terminated; no further calls are accepted.
    #[error("lookup cache terminated")]
    Terminated,
}

impl CacheError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use regcache::CacheError;
    ///
    /// assert_eq!(CacheError::Terminated.as_label(), "cache_terminated");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            CacheError::Terminated => "cache_terminated",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            CacheError::Terminated => "cache terminated; call rejected".to_string(),
        }
    }
}

/// # Errors produced by a remote registry call.
///
/// Returned by [`RegistryClient`](crate::RegistryClient) implementations for
/// `subscribe`, `list` and lease calls.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry could not be reached.
    #[error("registry unavailable: {reason}")]
    Unavailable {
        /// Transport level detail.
        reason: String,
    },

    /// The registry refused the request.
    #[error("registry rejected request: {reason}")]
    Rejected {
        /// Rejection detail reported by the registry.
        reason: String,
    },

    /// The call did not complete in time.
    #[error("registry call timed out")]
    Timeout,

    /// The lease referenced by the call is not known to the registry.
    #[error("unknown lease {lease}")]
    LeaseUnknown {
        /// Lease identifier.
        lease: u64,
    },
}

impl RegistryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use regcache::RegistryError;
    ///
    /// assert_eq!(RegistryError::Timeout.as_label(), "registry_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::Unavailable { .. } => "registry_unavailable",
            RegistryError::Rejected { .. } => "registry_rejected",
            RegistryError::Timeout => "registry_timeout",
            RegistryError::LeaseUnknown { .. } => "registry_lease_unknown",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RegistryError::Unavailable { reason } => format!("unavailable: {reason}"),
            RegistryError::Rejected { reason } => format!("rejected: {reason}"),
            RegistryError::Timeout => "timeout".to_string(),
            RegistryError::LeaseUnknown { lease } => format!("lease {lease} unknown"),
        }
    }

    /// Indicates whether the same call may succeed later.
    ///
    /// Returns `true` for [`RegistryError::Unavailable`] and [`RegistryError::Timeout`].
    ///
    /// # Example
    /// ```
    /// use regcache::RegistryError;
    ///
    /// assert!(RegistryError::Timeout.is_retryable());
    /// assert!(!RegistryError::Rejected { reason: "nope".into() }.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::Unavailable { .. } | RegistryError::Timeout
        )
    }
}
