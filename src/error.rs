//! # Errors
//!
//! Error taxonomy shared by configuration resolution, OIDC provisioning and
//! the admission flows.
//!
//! - [`Error::Validation`] is always raised before any mutation is attempted.
//! - [`Error::Fetch`] covers non-2xx responses and transport failures.
//! - [`Error::Persistence`] wraps object store failures.
//! - [`Error::NotFound`] means the object does not exist yet.

use crate::store::StoreError;
use thiserror::Error;

/// Result alias used across the operator core
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing or a value is out of range
    #[error("validation failed: {0}")]
    Validation(String),

    /// A web source or OIDC endpoint could not be read
    #[error("fetch from {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    /// A configuration fragment is not a valid document
    #[error("invalid configuration document from {origin}: {reason}")]
    Document { origin: String, reason: String },

    /// A referenced object or data key does not exist
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// The object store rejected a create/update/delete
    #[error("persistence failure: {0}")]
    Persistence(StoreError),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn fetch(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Short machine-friendly label, used as a metric and event reason
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Fetch { .. } => "fetch",
            Self::Document { .. } => "document",
            Self::NotFound { .. } => "not_found",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, name } => Self::NotFound { kind, name },
            other => Self::Persistence(other),
        }
    }
}
