//! Error types for the poll trigger
//!
//! Errors carry the context an operator needs to act on a log line: the
//! offending schedule string, the image reference that failed to register,
//! or the operation that ran out of time.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for poll trigger operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Namespace enumeration failed, so no deployments could be gathered
    #[error("failed to enumerate namespaces: {source}")]
    Enumeration {
        /// What the cluster accessor reported
        source: Box<Error>,
    },

    /// A poll schedule could not be parsed
    #[error("invalid poll schedule '{schedule}': {message}")]
    Schedule {
        /// The schedule string as it was found
        schedule: String,
        /// Why it was rejected
        message: String,
    },

    /// The watcher refused or failed to register an image
    #[error("failed to watch image '{image}': {message}")]
    Watch {
        /// Image reference that was being registered
        image: String,
        /// Description of what failed
        message: String,
    },

    /// An operation exceeded its time bound
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that was running (e.g., "scan")
        operation: String,
        /// The bound that was exceeded
        after: Duration,
    },

    /// Invalid runtime configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "accessor", "watcher")
        context: String,
    },
}

impl Error {
    /// Wrap an accessor failure that prevented namespace enumeration
    pub fn enumeration(source: Error) -> Self {
        Self::Enumeration {
            source: Box::new(source),
        }
    }

    /// Create a schedule error for the given expression
    pub fn schedule(schedule: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Schedule {
            schedule: schedule.into(),
            message: msg.into(),
        }
    }

    /// Create a watch error for the given image reference
    pub fn watch(image: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Watch {
            image: image.into(),
            message: msg.into(),
        }
    }

    /// Create a timeout error for a named operation
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if the next scan can be expected to clear this error
    ///
    /// Schedule and configuration errors need a label or flag change.
    /// Everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Enumeration { source } => source.is_retryable(),
            Error::Schedule { .. } => false,
            Error::Watch { .. } => true,
            Error::Timeout { .. } => true,
            Error::Config { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}
