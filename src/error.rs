//! Error types for Vault SSL bundle resolution

use bundle_core::ReferenceError;
use thiserror::Error;

use crate::bundle::Slot;

/// Result type alias for Vault SSL bundle resolution
pub type Result<T> = std::result::Result<T, Error>;

/// Vault SSL bundle errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed secret reference expression
    #[error("Invalid secret reference: {0}")]
    InvalidReference(#[from] ReferenceError),

    /// Vault returned no document, or an empty one
    #[error("No data found at Vault path '{path}'")]
    SecretNotFound {
        /// Secret path
        path: String,
    },

    /// Vault refused the read
    #[error("Permission denied reading Vault path '{path}'")]
    PermissionDenied {
        /// Secret path
        path: String,
    },

    /// Any other secret store failure
    #[error("Secret store error at '{path}': {message}")]
    Store {
        /// Secret path
        path: String,
        /// Failure detail
        message: String,
    },

    /// A required field could not be extracted
    #[error("Field '{field}' ({slot}) could not be resolved from Vault path '{path}'")]
    UnresolvedField {
        /// Bundle slot that needed the value
        slot: Slot,
        /// Secret path
        path: String,
        /// Field name
        field: String,
    },

    /// Resolution failed for one bundle
    #[error("Failed to load SSL bundle '{bundle}' from Vault: {source}")]
    BundleResolution {
        /// Bundle name
        bundle: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// One or more bundles failed during a registration pass
    #[error("{count} SSL bundle(s) failed to load: {list}", count = .failures.len(), list = join_failures(.failures))]
    Registration {
        /// One [`Error::BundleResolution`] per failed bundle
        failures: Vec<Error>,
    },

    /// Bundle not registered
    #[error("SSL bundle not found: {0}")]
    BundleNotFound(String),

    /// TLS material could not be turned into a rustls config
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Wrap `self` as the failure of `bundle`.
    #[must_use]
    pub fn in_bundle(self, bundle: impl Into<String>) -> Self {
        Self::BundleResolution {
            bundle: bundle.into(),
            source: Box::new(self),
        }
    }

    /// Name of the bundle this error belongs to, if any.
    #[must_use]
    pub fn bundle(&self) -> Option<&str> {
        match self {
            Self::BundleResolution { bundle, .. } => Some(bundle),
            _ => None,
        }
    }
}

fn join_failures(failures: &[Error]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
