//! Error handling types

use thiserror::Error;

use crate::service_type::ServiceTypeId;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the weft wiring runtime
#[derive(Error, Debug)]
pub enum Error {
    /// A plain service type already has a provider
    #[error("service {service} is already registered")]
    AlreadyRegistered {
        /// Name of the occupied service type
        service: String,
    },

    /// A service type has no provider
    #[error("service {service} is not registered")]
    NotRegistered {
        /// Name of the absent service type
        service: String,
    },

    /// Unregistration named an instance that is not the current provider
    #[error("service {service} is not provided by this instance")]
    ProviderMismatch {
        /// Name of the service type
        service: String,
    },

    /// A contract declaration does not match the registered instance
    #[error("contract violation: {message}")]
    Contract {
        /// Description of the mismatch
        message: String,
    },

    /// A required service was absent at dependency-lookup time.
    ///
    /// If resolution bookkeeping is correct this cannot happen; seeing it
    /// means an engine invariant was violated.
    #[error("required service {service} missing while activating {dependent}")]
    MissingService {
        /// Name of the missing service type
        service: String,
        /// Name of the type whose activation needed it
        dependent: String,
    },

    /// Internal invariant violation
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },

    /// Generic string-based error (user callback failures)
    #[error("{0}")]
    String(String),
}

impl Error {
    /// Create an already-registered error for a service type
    pub fn already_registered(service: ServiceTypeId) -> Self {
        Self::AlreadyRegistered {
            service: service.name().to_string(),
        }
    }

    /// Create a not-registered error for a service type
    pub fn not_registered(service: ServiceTypeId) -> Self {
        Self::NotRegistered {
            service: service.name().to_string(),
        }
    }

    /// Create a provider-mismatch error for a service type
    pub fn provider_mismatch(service: ServiceTypeId) -> Self {
        Self::ProviderMismatch {
            service: service.name().to_string(),
        }
    }

    /// Create a contract violation error
    pub fn contract<S: Into<String>>(message: S) -> Self {
        Self::Contract {
            message: message.into(),
        }
    }

    /// Create a missing-service error
    pub fn missing_service(service: ServiceTypeId, dependent: &str) -> Self {
        Self::MissingService {
            service: service.name().to_string(),
            dependent: dependent.to_string(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
