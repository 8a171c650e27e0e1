//! Error types for the Limitador operator
//!
//! Errors are structured with fields so that the reconciler can decide how to
//! react (requeue, surface in status, back off) without string matching.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A referenced object does not exist
    #[error("{kind} \"{name}\" not found")]
    NotFound {
        /// Kind of the missing object (e.g. "Secret")
        kind: String,
        /// Namespaced name of the missing object
        name: String,
    },

    /// A write was rejected because the object changed since it was read
    #[error("conflict writing {kind} \"{name}\": the object has been modified")]
    Conflict {
        /// Kind of the object being written
        kind: String,
        /// Name of the object being written
        name: String,
    },

    /// The instance references something that is unusable as configured
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what is wrong
        message: String,
        /// The field at fault, if a single one can be named
        field: Option<String>,
    },

    /// The instance spec is internally inconsistent
    #[error("validation error for {instance}: {message}")]
    Validation {
        /// Name of the instance with invalid configuration
        instance: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.pdb")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "registry", "reconciler")
        context: String,
    },
}

impl Error {
    /// Create a not-found error for an object of the given kind
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a write-conflict error for an object of the given kind
    pub fn conflict(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a configuration error that names the offending field
    pub fn configuration_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a validation error with the given message
    ///
    /// For simple validation errors without instance context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            instance: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with instance context and field path
    pub fn validation_for_field(
        instance: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            instance: instance.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True when the error means the target object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube { source } => api_code(source) == Some(404),
            _ => false,
        }
    }

    /// True when the error is an optimistic-concurrency rejection
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict { .. } => true,
            Error::Kube { source } => api_code(source) == Some(409),
            _ => false,
        }
    }

    /// True when the error can only be fixed by editing the instance
    ///
    /// These are surfaced through the Ready condition and retried on the
    /// periodic resync rather than through error backoff.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration { .. } | Error::Validation { .. } | Error::NotFound { .. }
        )
    }

    /// Check if this error is retryable
    ///
    /// Configuration, validation and serialization errors need a spec change.
    /// Kubernetes errors are retryable unless they are 4xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(source, kube::Error::Api(ae) if (400..500).contains(&ae.code))
            }
            Error::NotFound { .. } => false,
            Error::Conflict { .. } => true,
            Error::Configuration { .. } => false,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the offending field path, if the error names one
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Configuration { field, .. } | Error::Validation { field, .. } => {
                field.as_deref()
            }
            _ => None,
        }
    }
}

fn api_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(ae) => Some(ae.code),
        _ => None,
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(err.to_string())
    }
}
