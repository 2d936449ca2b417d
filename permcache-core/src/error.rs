//! Error types for permission cache operations
//!
//! Every error carries:
//! - A human-readable message
//! - A stable error code for programmatic handling
//! - A category for grouping
//!
//! The distinction that matters most on the authorization path is between a
//! *denial* (`Ok(false)` from a check) and an *unknown* answer caused by the
//! store being unreachable. The latter is always an error, never `false`.
//!
//! # Example
//!
//! ```rust
//! use permcache_core::error::{ErrorCategory, PermCacheError};
//!
//! fn handle(err: PermCacheError) {
//!     if err.is_store_unavailable() {
//!         // caller decides fail-open vs fail-closed
//!     }
//!     match err.category() {
//!         ErrorCategory::Validation => println!("bad input"),
//!         ErrorCategory::Unavailable => println!("try again later"),
//!         _ => println!("other error"),
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for permission cache operations
pub type Result<T> = std::result::Result<T, PermCacheError>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input validation failed
    Validation,
    /// A backing dependency (store or cache) could not answer
    Unavailable,
    /// Configuration is unusable
    Configuration,
    /// Serialization or I/O failure
    External,
    /// Internal invariant broken
    Internal,
}

/// Errors that can occur in permission cache operations
#[derive(Error, Debug)]
pub enum PermCacheError {
    // ═══════════════════════════════════════════════════════════════════════
    // Backing dependencies
    // ═══════════════════════════════════════════════════════════════════════

    /// The permission store could not be reached or refused the call
    #[error("Permission store '{store}' unavailable: {reason}. The answer is unknown, not denied.")]
    StoreUnavailable { store: String, reason: String },

    /// The permission store did not answer within the configured timeout
    #[error("Permission store '{store}' timed out after {timeout_ms}ms. The answer is unknown, not denied.")]
    StoreTimeout { store: String, timeout_ms: u64 },

    /// The cache backend failed on an operation whose failure cannot be ignored
    #[error("Cache backend '{backend}' unavailable: {reason}")]
    CacheUnavailable { backend: String, reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Request validation
    // ═══════════════════════════════════════════════════════════════════════

    /// Subject, resource or action is malformed
    #[error("Invalid grant request: {field} {reason}")]
    InvalidGrantRequest { field: &'static str, reason: String },

    /// Configuration is invalid
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════════════════

    /// JSON serialization or deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal error that shouldn't happen
    #[error("Internal error: {reason}. This is a bug; please report it.")]
    Internal { reason: String },
}

impl PermCacheError {
    /// Shorthand for a store failure
    pub fn store_unavailable(store: impl Into<String>, reason: impl Into<String>) -> Self {
        PermCacheError::StoreUnavailable {
            store: store.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a cache backend failure
    pub fn cache_unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        PermCacheError::CacheUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a rejected identifier
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        PermCacheError::InvalidGrantRequest {
            field,
            reason: reason.into(),
        }
    }

    /// True when the store could not produce an answer (down or too slow)
    ///
    /// Callers of a permission check must treat this as "unknown", and make
    /// their own fail-open or fail-closed decision.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            PermCacheError::StoreUnavailable { .. } | PermCacheError::StoreTimeout { .. }
        )
    }

    /// A copy of a store-unavailability error, `None` for any other kind
    ///
    /// Used to hand one failed load's outcome to every caller queued on it.
    pub fn replicate_unavailable(&self) -> Option<Self> {
        match self {
            PermCacheError::StoreUnavailable { store, reason } => {
                Some(PermCacheError::StoreUnavailable {
                    store: store.clone(),
                    reason: reason.clone(),
                })
            }
            PermCacheError::StoreTimeout { store, timeout_ms } => {
                Some(PermCacheError::StoreTimeout {
                    store: store.clone(),
                    timeout_ms: *timeout_ms,
                })
            }
            _ => None,
        }
    }

    /// Returns true if this error might succeed on retry
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PermCacheError::StoreUnavailable { .. }
                | PermCacheError::StoreTimeout { .. }
                | PermCacheError::CacheUnavailable { .. }
        )
    }

    /// Returns the error category for grouping
    pub fn category(&self) -> ErrorCategory {
        match self {
            PermCacheError::StoreUnavailable { .. }
            | PermCacheError::StoreTimeout { .. }
            | PermCacheError::CacheUnavailable { .. } => ErrorCategory::Unavailable,

            PermCacheError::InvalidGrantRequest { .. } => ErrorCategory::Validation,

            PermCacheError::Config { .. } => ErrorCategory::Configuration,

            PermCacheError::Json(_) | PermCacheError::Io { .. } => ErrorCategory::External,

            PermCacheError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            PermCacheError::StoreUnavailable { .. } => "STORE_UNAVAILABLE",
            PermCacheError::StoreTimeout { .. } => "STORE_TIMEOUT",
            PermCacheError::CacheUnavailable { .. } => "CACHE_UNAVAILABLE",
            PermCacheError::InvalidGrantRequest { .. } => "INVALID_GRANT_REQUEST",
            PermCacheError::Config { .. } => "INVALID_CONFIG",
            PermCacheError::Json(_) => "JSON_ERROR",
            PermCacheError::Io { .. } => "IO_ERROR",
            PermCacheError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Converts this error to a JSON-serializable response object
    ///
    /// ```json
    /// {
    ///   "error": {
    ///     "code": "STORE_UNAVAILABLE",
    ///     "message": "Permission store 'file' unavailable: ...",
    ///     "category": "unavailable",
    ///     "recoverable": true
    ///   }
    /// }
    /// ```
    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.to_string(),
                category: self.category(),
                recoverable: self.is_recoverable(),
            },
        }
    }
}

impl From<std::io::Error> for PermCacheError {
    fn from(err: std::io::Error) -> Self {
        PermCacheError::Io {
            message: err.to_string(),
        }
    }
}

/// JSON-serializable error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail for JSON responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code (e.g., "STORE_UNAVAILABLE")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Error category
    pub category: ErrorCategory,
    /// Whether retry might succeed
    pub recoverable: bool,
}
