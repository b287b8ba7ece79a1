//! Error types for DataFS stores.
//!
//! Every fallible operation returns a [`Result<T>`], an alias for
//! `Result<T, DataFsError>`.
//!
//! # Error Categories
//!
//! - **Construction**: [`Construction`], [`Config`]
//! - **Lifecycle misuse**: [`IllegalState`]
//! - **Capabilities**: [`Unsupported`]
//! - **Caller input**: [`NotFound`], [`InvalidArgument`]
//! - **Teardown**: [`CloseFailed`]
//! - **System errors**: [`Io`]
//!
//! [`Construction`]: DataFsError::Construction
//! [`Config`]: DataFsError::Config
//! [`IllegalState`]: DataFsError::IllegalState
//! [`Unsupported`]: DataFsError::Unsupported
//! [`NotFound`]: DataFsError::NotFound
//! [`InvalidArgument`]: DataFsError::InvalidArgument
//! [`CloseFailed`]: DataFsError::CloseFailed
//! [`Io`]: DataFsError::Io

use std::path::PathBuf;

use crate::capacity::Capability;

/// Result type alias for operations that may return a DataFsError.
pub type Result<T> = std::result::Result<T, DataFsError>;

/// Error types for DataFS operations.
#[derive(Debug, thiserror::Error)]
pub enum DataFsError {
    /// The store could not be constructed over the given root.
    #[error("cannot construct store at {}: {reason}", .path.display())]
    Construction {
        /// The root the store was asked to use.
        path: PathBuf,
        /// Why the root was rejected.
        reason: String,
    },

    /// The store was used in a lifecycle state that doesn't permit the call.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The backend does not offer the requested operation.
    #[error("unsupported operation: {operation}{}", requires(.capability))]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
        /// The capability the backend lacks, if the operation is capability-gated.
        capability: Option<Capability>,
    },

    /// No object exists under the given name.
    #[error("not found: {0}")]
    NotFound(String),

    /// A caller-supplied argument was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// One or more handles failed to close during a bulk close.  If the
    /// backend teardown failed too, it is the last entry.
    #[error("failed to close {} handle(s): {}", .0.len(), summarize(.0))]
    CloseFailed(Vec<(String, std::io::Error)>),

    /// The store configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn requires(capability: &Option<Capability>) -> String {
    match capability {
        Some(capability) => format!(" (requires {capability})"),
        None => String::new(),
    }
}

fn summarize(failures: &[(String, std::io::Error)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl DataFsError {
    pub(crate) fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported {
            operation,
            capability: None,
        }
    }

    pub(crate) fn missing(operation: &'static str, capability: Capability) -> Self {
        Self::Unsupported {
            operation,
            capability: Some(capability),
        }
    }

    /// True if this error reports an operation the backend doesn't offer.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// True if this error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True if this error reports lifecycle misuse.
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState(_))
    }
}
